//! Escrow balance types.
//!
//! The escrow ledger only tracks what it holds in custody, keyed by
//! (owner, token). Free balances live on the external token ledger.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::TraderId;

/// Why a custody movement happened. Carried on every movement for audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MovementReason {
    /// Funds entered custody (order intake or liquidity deposit).
    Lock,
    /// Funds returned to their owner (cancel, expiry, liquidity withdrawal).
    Release,
    /// Funds paid to a different recipient during settlement.
    Settlement,
}

impl MovementReason {
    /// Whether value flows into custody.
    #[must_use]
    pub fn is_inflow(self) -> bool {
        matches!(self, Self::Lock)
    }
}

impl std::fmt::Display for MovementReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Lock => write!(f, "LOCK"),
            Self::Release => write!(f, "RELEASE"),
            Self::Settlement => write!(f, "SETTLEMENT"),
        }
    }
}

/// A movement between custody and a trader account, applied to the token
/// ledger when the surrounding engine operation commits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyMovement {
    /// The payer for `Lock`, the recipient otherwise.
    pub account: TraderId,
    pub token: String,
    pub amount: Decimal,
    pub reason: MovementReason,
}
