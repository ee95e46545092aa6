//! # ciphermatch-settlement
//!
//! **Finality plane**: reveal, atomic fills at the uniform clearing value,
//! carry-over of unfilled orders, expiry refunds, and the escrow invariants.
//!
//! ## Architecture
//!
//! The finality plane receives a Closed batch with a sealed clearing value
//! and:
//! 1. Reveals the volume flag, then the clearing value
//! 2. Evaluates each member's fill predicate, revealing only the boolean
//! 3. Moves escrow: fills pay out, expiries refund, the rest carry over
//!
//! [`IdempotencyGuard`] remembers which batches already ran, and
//! [`EscrowConservation`] is checked by the caller before it commits.
//!
//! Only two plaintexts per batch ever leave the encrypted domain, plus one
//! boolean per live member.

pub mod escrow_conservation;
pub mod executor;
pub mod idempotency;

pub use escrow_conservation::EscrowConservation;
pub use executor::{SettlementExecutor, SettlementState, liquidity_provider, settle_amount};
pub use idempotency::IdempotencyGuard;
