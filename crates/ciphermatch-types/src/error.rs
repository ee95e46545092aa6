//! Error types for the CipherMatch engine.
//!
//! All errors use the `CM_ERR_` prefix convention for easy grepping in logs.
//! Error codes are grouped by kind:
//! - 1xx: Validation errors (rejected before any state change)
//! - 2xx: Authorization errors
//! - 3xx: State errors (wrong order/batch status, paused engine)
//! - 4xx: Escrow errors
//! - 5xx: Computation errors (encrypted arithmetic)
//! - 9xx: General / internal errors

use rust_decimal::Decimal;
use thiserror::Error;

use crate::{BatchId, BatchStatus, OrderId, OrderStatus, TokenPair, TraderId};

/// Coarse classification of an error, stable across message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    Authorization,
    State,
    Escrow,
    Computation,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Validation => write!(f, "VALIDATION"),
            Self::Authorization => write!(f, "AUTHORIZATION"),
            Self::State => write!(f, "STATE"),
            Self::Escrow => write!(f, "ESCROW"),
            Self::Computation => write!(f, "COMPUTATION"),
            Self::Internal => write!(f, "INTERNAL"),
        }
    }
}

/// Central error enum for all CipherMatch operations.
#[derive(Debug, Clone, Error)]
pub enum CiphermatchError {
    // =================================================================
    // Validation Errors (1xx)
    // =================================================================
    /// The order parameters are malformed.
    #[error("CM_ERR_100: Invalid order: {reason}")]
    InvalidOrder { reason: String },

    /// `token_in` and `token_out` are the same asset.
    #[error("CM_ERR_101: token_in and token_out must differ (got {0})")]
    SameToken(String),

    /// The deadline is not strictly in the future.
    #[error("CM_ERR_102: Deadline must be in the future")]
    DeadlineNotInFuture,

    /// The token pair is not configured on this engine.
    #[error("CM_ERR_103: Unsupported pair: {0}")]
    UnsupportedPair(TokenPair),

    // =================================================================
    // Authorization Errors (2xx)
    // =================================================================
    /// The caller does not own the order.
    #[error("CM_ERR_200: Caller {caller} does not own {order_id}")]
    NotOrderOwner { caller: TraderId, order_id: OrderId },

    /// Only the configured risk controller may pause or unpause.
    #[error("CM_ERR_201: Caller {0} is not the risk controller")]
    NotRiskController(TraderId),

    /// Only the pair's configured liquidity provider may manage its reserve.
    #[error("CM_ERR_202: Caller {caller} is not the liquidity provider for {pair}")]
    NotLiquidityProvider { caller: TraderId, pair: TokenPair },

    // =================================================================
    // State Errors (3xx)
    // =================================================================
    /// The requested order does not exist.
    #[error("CM_ERR_300: Order not found: {0}")]
    OrderNotFound(OrderId),

    /// The requested batch does not exist.
    #[error("CM_ERR_301: Batch not found: {0}")]
    BatchNotFound(BatchId),

    /// No batch has ever been opened for this pair, or none is open.
    #[error("CM_ERR_302: No open batch for pair {0}")]
    NoOpenBatch(TokenPair),

    /// The order is not in the status the operation requires.
    #[error("CM_ERR_303: {order_id} is {actual}, expected {expected}")]
    WrongOrderStatus {
        order_id: OrderId,
        expected: OrderStatus,
        actual: OrderStatus,
    },

    /// The batch is not in the status the operation requires.
    #[error("CM_ERR_304: {batch_id} is {actual}, expected {expected}")]
    WrongBatchStatus {
        batch_id: BatchId,
        expected: BatchStatus,
        actual: BatchStatus,
    },

    /// `close_batch` was called before the window elapsed or the size threshold was hit.
    #[error("CM_ERR_305: {batch_id} is not ready to close: {members} members, window ends {window_end}")]
    BatchNotReady {
        batch_id: BatchId,
        members: usize,
        window_end: chrono::DateTime<chrono::Utc>,
    },

    /// The engine is paused by risk control.
    #[error("CM_ERR_306: Engine is paused")]
    EnginePaused,

    // =================================================================
    // Escrow Errors (4xx)
    // =================================================================
    /// The trader lacks balance or allowance on the token ledger.
    #[error("CM_ERR_400: Insufficient balance of {token}: need {needed}, have {available}")]
    InsufficientBalance {
        token: String,
        needed: Decimal,
        available: Decimal,
    },

    /// A release or transfer exceeds the locked balance.
    #[error("CM_ERR_401: Insufficient locked {token} for {owner}: need {needed}, locked {locked}")]
    InsufficientLocked {
        owner: TraderId,
        token: String,
        needed: Decimal,
        locked: Decimal,
    },

    /// Escrow conservation invariant violated. Critical safety alert.
    #[error("CM_ERR_402: Escrow invariant violation: {reason}")]
    EscrowInvariantViolation { reason: String },

    /// The external token ledger rejected a movement.
    #[error("CM_ERR_403: Token transfer failed: {reason}")]
    TokenTransferFailed { reason: String },

    // =================================================================
    // Computation Errors (5xx)
    // =================================================================
    /// The batch had zero total weight. Recovered locally by settlement.
    #[error("CM_ERR_500: Batch {0} has zero clearing weight")]
    ZeroWeightBatch(BatchId),

    /// The encrypted-arithmetic backend failed.
    #[error("CM_ERR_501: Encrypted computation failed: {reason}")]
    Cipher { reason: String },

    /// Plaintext arithmetic overflowed.
    #[error("CM_ERR_502: Arithmetic overflow in {context}")]
    Overflow { context: String },

    // =================================================================
    // General / Internal (9xx)
    // =================================================================
    /// Unrecoverable internal error.
    #[error("CM_ERR_900: Internal error: {0}")]
    Internal(String),

    /// Serialization / deserialization error.
    #[error("CM_ERR_901: Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config file, missing fields, etc.).
    #[error("CM_ERR_902: Configuration error: {0}")]
    Configuration(String),
}

impl CiphermatchError {
    /// Coarse classification used by callers to branch on failures.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidOrder { .. }
            | Self::SameToken(_)
            | Self::DeadlineNotInFuture
            | Self::UnsupportedPair(_) => ErrorKind::Validation,
            Self::NotOrderOwner { .. }
            | Self::NotRiskController(_)
            | Self::NotLiquidityProvider { .. } => ErrorKind::Authorization,
            Self::OrderNotFound(_)
            | Self::BatchNotFound(_)
            | Self::NoOpenBatch(_)
            | Self::WrongOrderStatus { .. }
            | Self::WrongBatchStatus { .. }
            | Self::BatchNotReady { .. }
            | Self::EnginePaused => ErrorKind::State,
            Self::InsufficientBalance { .. }
            | Self::InsufficientLocked { .. }
            | Self::EscrowInvariantViolation { .. }
            | Self::TokenTransferFailed { .. } => ErrorKind::Escrow,
            Self::ZeroWeightBatch(_) | Self::Cipher { .. } | Self::Overflow { .. } => {
                ErrorKind::Computation
            }
            Self::Internal(_) | Self::Serialization(_) | Self::Configuration(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// Machine-readable reason code (`CM_ERR_xxx`).
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidOrder { .. } => "CM_ERR_100",
            Self::SameToken(_) => "CM_ERR_101",
            Self::DeadlineNotInFuture => "CM_ERR_102",
            Self::UnsupportedPair(_) => "CM_ERR_103",
            Self::NotOrderOwner { .. } => "CM_ERR_200",
            Self::NotRiskController(_) => "CM_ERR_201",
            Self::NotLiquidityProvider { .. } => "CM_ERR_202",
            Self::OrderNotFound(_) => "CM_ERR_300",
            Self::BatchNotFound(_) => "CM_ERR_301",
            Self::NoOpenBatch(_) => "CM_ERR_302",
            Self::WrongOrderStatus { .. } => "CM_ERR_303",
            Self::WrongBatchStatus { .. } => "CM_ERR_304",
            Self::BatchNotReady { .. } => "CM_ERR_305",
            Self::EnginePaused => "CM_ERR_306",
            Self::InsufficientBalance { .. } => "CM_ERR_400",
            Self::InsufficientLocked { .. } => "CM_ERR_401",
            Self::EscrowInvariantViolation { .. } => "CM_ERR_402",
            Self::TokenTransferFailed { .. } => "CM_ERR_403",
            Self::ZeroWeightBatch(_) => "CM_ERR_500",
            Self::Cipher { .. } => "CM_ERR_501",
            Self::Overflow { .. } => "CM_ERR_502",
            Self::Internal(_) => "CM_ERR_900",
            Self::Serialization(_) => "CM_ERR_901",
            Self::Configuration(_) => "CM_ERR_902",
        }
    }
}

/// Crate-wide `Result` alias.
pub type Result<T> = std::result::Result<T, CiphermatchError>;

impl From<serde_json::Error> for CiphermatchError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
