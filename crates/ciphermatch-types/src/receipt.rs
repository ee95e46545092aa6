//! Settlement receipts for the CipherMatch audit trail.
//!
//! Every member processed by settlement produces one [`SettlementEvent`].
//! Events are appended in arrival order and retained with the batch.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{BatchId, BatchStatus, OrderId, TokenPair, TraderId};

/// What settlement did with one member order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SettlementOutcome {
    /// Filled at the clearing value.
    Filled {
        amount_in: Decimal,
        amount_out: Decimal,
    },
    /// Not fillable; re-admitted into a later batch of the same pair.
    CarriedOver { next_batch: BatchId },
    /// Deadline passed; escrow refunded.
    Expired { refunded: Decimal },
}

impl std::fmt::Display for SettlementOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Filled {
                amount_in,
                amount_out,
            } => write!(f, "FILLED {amount_in} -> {amount_out}"),
            Self::CarriedOver { next_batch } => write!(f, "CARRIED_OVER {next_batch}"),
            Self::Expired { refunded } => write!(f, "EXPIRED refunded {refunded}"),
        }
    }
}

/// One settlement record. Ordered by `submit_time` within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementEvent {
    pub batch_id: BatchId,
    pub order_id: OrderId,
    pub trader: TraderId,
    pub submit_time: DateTime<Utc>,
    pub outcome: SettlementOutcome,
    pub settled_at: DateTime<Utc>,
}

/// Result of a `settle` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementReport {
    pub batch_id: BatchId,
    /// `None` when the batch had zero volume and nothing was revealed.
    pub clearing_value: Option<Decimal>,
    pub events: Vec<SettlementEvent>,
    /// `true` when the batch was already settled and nothing was executed.
    pub already_settled: bool,
}

impl SettlementReport {
    #[must_use]
    pub fn filled(&self) -> usize {
        self.count(|o| matches!(o, SettlementOutcome::Filled { .. }))
    }

    #[must_use]
    pub fn carried_over(&self) -> usize {
        self.count(|o| matches!(o, SettlementOutcome::CarriedOver { .. }))
    }

    #[must_use]
    pub fn expired(&self) -> usize {
        self.count(|o| matches!(o, SettlementOutcome::Expired { .. }))
    }

    fn count(&self, pred: impl Fn(&SettlementOutcome) -> bool) -> usize {
        self.events.iter().filter(|e| pred(&e.outcome)).count()
    }
}

/// Audit view of a batch: public metadata plus whatever settlement revealed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAudit {
    pub batch_id: BatchId,
    pub pair: TokenPair,
    pub status: BatchStatus,
    pub member_count: usize,
    pub membership_root: Option<String>,
    pub clearing_value: Option<Decimal>,
    pub events: Vec<SettlementEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(order: u64, outcome: SettlementOutcome) -> SettlementEvent {
        SettlementEvent {
            batch_id: BatchId(1),
            order_id: OrderId(order),
            trader: TraderId::new(),
            submit_time: Utc::now(),
            outcome,
            settled_at: Utc::now(),
        }
    }

    #[test]
    fn report_counts_outcomes() {
        let report = SettlementReport {
            batch_id: BatchId(1),
            clearing_value: Some(Decimal::ONE),
            events: vec![
                event(
                    1,
                    SettlementOutcome::Filled {
                        amount_in: Decimal::ONE,
                        amount_out: Decimal::ONE,
                    },
                ),
                event(2, SettlementOutcome::CarriedOver { next_batch: BatchId(2) }),
                event(3, SettlementOutcome::Expired { refunded: Decimal::TEN }),
                event(4, SettlementOutcome::CarriedOver { next_batch: BatchId(2) }),
            ],
            already_settled: false,
        };
        assert_eq!(report.filled(), 1);
        assert_eq!(report.carried_over(), 2);
        assert_eq!(report.expired(), 1);
    }

    #[test]
    fn outcome_display() {
        let o = SettlementOutcome::Filled {
            amount_in: Decimal::new(100, 0),
            amount_out: Decimal::new(17075, 2),
        };
        assert_eq!(format!("{o}"), "FILLED 100 -> 170.75");
    }

    #[test]
    fn outcome_serde_roundtrip() {
        let o = SettlementOutcome::CarriedOver { next_batch: BatchId(7) };
        let json = serde_json::to_string(&o).unwrap();
        let back: SettlementOutcome = serde_json::from_str(&json).unwrap();
        assert_eq!(o, back);
    }
}
