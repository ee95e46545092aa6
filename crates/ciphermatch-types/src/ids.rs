//! Identifiers used throughout CipherMatch.
//!
//! Orders and batches use monotonically assigned `u64` ids handed out by the
//! engine's registries. Traders use UUIDv7 so identities sort by creation time.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// OrderId
// ---------------------------------------------------------------------------

/// Monotonically assigned order identifier. Lower ids arrived earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl OrderId {
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// BatchId
// ---------------------------------------------------------------------------

/// Monotonically assigned batch identifier, unique across all pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct BatchId(pub u64);

impl BatchId {
    #[must_use]
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "batch:{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TraderId
// ---------------------------------------------------------------------------

/// Public identity of a trader, liquidity provider, or engine account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TraderId(pub Uuid);

impl TraderId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }
}

impl Default for TraderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// TokenPair
// ---------------------------------------------------------------------------

/// Type alias for token identifiers (e.g., "WETH", "USDC").
pub type Token = String;

/// A directional token pair: every order in the pair's queue sells
/// `token_in` for `token_out`, so implied prices share one unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct TokenPair {
    pub token_in: Token,
    pub token_out: Token,
}

impl TokenPair {
    #[must_use]
    pub fn new(token_in: impl Into<String>, token_out: impl Into<String>) -> Self {
        Self {
            token_in: token_in.into(),
            token_out: token_out.into(),
        }
    }

    #[must_use]
    pub fn symbol(&self) -> String {
        format!("{}->{}", self.token_in, self.token_out)
    }

    /// The same pair traded in the opposite direction.
    #[must_use]
    pub fn reversed(&self) -> Self {
        Self {
            token_in: self.token_out.clone(),
            token_out: self.token_in.clone(),
        }
    }
}

impl fmt::Display for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}->{}", self.token_in, self.token_out)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
