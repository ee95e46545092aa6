//! Batch lifecycle types for the CipherMatch auction model.
//!
//! Each batch cycles through three phases, never backwards:
//! **OPEN → CLOSED → SETTLED**
//!
//! During OPEN, orders join the batch and may be cancelled.
//! On CLOSE, membership is snapshotted and the clearing value is computed
//! under encryption.
//! During SETTLE, the clearing value is revealed once and every member is
//! filled, carried into the next batch, or expired.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BatchId, OrderId, TokenPair};

/// The three phases of a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BatchStatus {
    /// Accepting new members; cancellations allowed.
    Open,
    /// Membership frozen; encrypted clearing value computed.
    Closed,
    /// Settlement executed; retained for audit.
    Settled,
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "OPEN"),
            Self::Closed => write!(f, "CLOSED"),
            Self::Settled => write!(f, "SETTLED"),
        }
    }
}

impl BatchStatus {
    /// Whether the batch still holds live (non-terminal) orders.
    #[must_use]
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Settled)
    }
}

/// Clearing value of a batch across its lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Clearing<C> {
    /// Batch still open; nothing computed.
    Pending,
    /// Computed at close. `has_volume` encrypts 1 when total weight was positive.
    Sealed { value: C, has_volume: C },
    /// Revealed at settlement and retained for audit.
    Revealed(Decimal),
    /// Zero total weight. The clearing value was never revealed.
    ZeroVolume,
}

impl<C> Clearing<C> {
    /// The plaintext clearing value, once revealed.
    #[must_use]
    pub fn revealed(&self) -> Option<Decimal> {
        match self {
            Self::Revealed(value) => Some(*value),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_sealed(&self) -> bool {
        matches!(self, Self::Sealed { .. })
    }
}

/// One clearing round over one pair's queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch<C> {
    pub id: BatchId,
    pub pair: TokenPair,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    /// Member order ids in arrival order.
    pub members: Vec<OrderId>,
    pub clearing: Clearing<C>,
    /// SHA-256 commitment to `members`, fixed at close.
    pub membership_root: Option<[u8; 32]>,
    pub status: BatchStatus,
    pub closed_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl<C> Batch<C> {
    /// Open a fresh, empty batch.
    #[must_use]
    pub fn open(id: BatchId, pair: TokenPair, window_start: DateTime<Utc>, window: chrono::Duration) -> Self {
        Self {
            id,
            pair,
            window_start,
            window_end: window_start + window,
            members: Vec::new(),
            clearing: Clearing::Pending,
            membership_root: None,
            status: BatchStatus::Open,
            closed_at: None,
            settled_at: None,
        }
    }

    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    #[must_use]
    pub fn contains(&self, order_id: OrderId) -> bool {
        self.members.contains(&order_id)
    }

    /// Remove a member. Returns `false` if it was not present.
    pub fn remove_member(&mut self, order_id: OrderId) -> bool {
        let before = self.members.len();
        self.members.retain(|id| *id != order_id);
        self.members.len() != before
    }

    #[must_use]
    pub fn view(&self) -> BatchView {
        BatchView {
            batch_id: self.id,
            member_count: self.members.len(),
            window_end: self.window_end,
            status: self.status,
        }
    }
}

/// Public batch status as returned by `batch_status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchView {
    pub batch_id: BatchId,
    pub member_count: usize,
    pub window_end: DateTime<Utc>,
    pub status: BatchStatus,
}
