//! Configuration types for a CipherMatch engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{CiphermatchError, Result, TokenPair, TraderId, constants};

/// Configuration for one engine instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Account on the token ledger that holds all escrowed funds.
    pub custody_account: TraderId,
    /// The only identity allowed to pause and unpause the engine.
    pub risk_controller: TraderId,
    /// Scheduling parameters shared by every pair.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Pairs supported by this engine.
    pub pairs: Vec<PairConfig>,
    /// Number of settled batch ids remembered by the idempotency guard.
    #[serde(default = "default_idempotency_cache_size")]
    pub idempotency_cache_size: usize,
    /// Depth of the service command queue.
    #[serde(default = "default_command_queue_depth")]
    pub command_queue_depth: usize,
}

fn default_idempotency_cache_size() -> usize {
    constants::SETTLEMENT_IDEMPOTENCY_CACHE_SIZE
}

fn default_command_queue_depth() -> usize {
    constants::DEFAULT_COMMAND_QUEUE_DEPTH
}

/// Batch scheduling parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// How long a batch stays open before it becomes closable.
    pub window: Duration,
    /// Member count at which a batch becomes closable early.
    pub max_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_millis(constants::DEFAULT_BATCH_WINDOW_MS),
            max_batch_size: constants::DEFAULT_MAX_BATCH_SIZE,
        }
    }
}

impl BatchConfig {
    /// The window as a `chrono` duration for timestamp arithmetic.
    pub fn window_chrono(&self) -> Result<chrono::Duration> {
        chrono::Duration::from_std(self.window)
            .map_err(|e| CiphermatchError::Configuration(format!("batch window: {e}")))
    }
}

/// Per-pair configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairConfig {
    /// Token sold by traders in this pair.
    pub token_in: String,
    /// Token bought by traders in this pair.
    pub token_out: String,
    /// Counter-side of every fill: supplies `token_out`, receives `token_in`.
    pub liquidity_provider: TraderId,
}

impl PairConfig {
    #[must_use]
    pub fn pair(&self) -> TokenPair {
        TokenPair::new(self.token_in.clone(), self.token_out.clone())
    }
}

impl EngineConfig {
    /// Minimal config with default scheduling and the given pairs.
    #[must_use]
    pub fn new(custody_account: TraderId, risk_controller: TraderId, pairs: Vec<PairConfig>) -> Self {
        Self {
            custody_account,
            risk_controller,
            batch: BatchConfig::default(),
            pairs,
            idempotency_cache_size: default_idempotency_cache_size(),
            command_queue_depth: default_command_queue_depth(),
        }
    }

    /// Parse and validate a JSON config document.
    pub fn from_json(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configs the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.batch.window.is_zero() {
            return Err(CiphermatchError::Configuration(
                "batch window must be positive".into(),
            ));
        }
        self.batch.window_chrono()?;
        if self.batch.max_batch_size == 0 || self.batch.max_batch_size > constants::MAX_BATCH_SIZE_LIMIT {
            return Err(CiphermatchError::Configuration(format!(
                "max_batch_size must be in 1..={}",
                constants::MAX_BATCH_SIZE_LIMIT
            )));
        }
        if self.idempotency_cache_size == 0 {
            return Err(CiphermatchError::Configuration(
                "idempotency_cache_size must be positive".into(),
            ));
        }
        if self.command_queue_depth == 0 {
            return Err(CiphermatchError::Configuration(
                "command_queue_depth must be positive".into(),
            ));
        }
        if self.pairs.is_empty() {
            return Err(CiphermatchError::Configuration("no pairs configured".into()));
        }
        let mut seen = std::collections::HashSet::new();
        for pc in &self.pairs {
            if pc.token_in == pc.token_out {
                return Err(CiphermatchError::Configuration(format!(
                    "pair {} trades a token against itself",
                    pc.pair()
                )));
            }
            if pc.liquidity_provider == self.custody_account {
                return Err(CiphermatchError::Configuration(format!(
                    "pair {} uses the custody account as liquidity provider",
                    pc.pair()
                )));
            }
            if !seen.insert(pc.pair()) {
                return Err(CiphermatchError::Configuration(format!(
                    "pair {} configured twice",
                    pc.pair()
                )));
            }
        }
        Ok(())
    }

    /// Look up a configured pair.
    #[must_use]
    pub fn pair_config(&self, pair: &TokenPair) -> Option<&PairConfig> {
        self.pairs
            .iter()
            .find(|pc| pc.token_in == pair.token_in && pc.token_out == pair.token_out)
    }
}
