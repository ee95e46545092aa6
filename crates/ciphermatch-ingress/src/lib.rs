//! # ciphermatch-ingress
//!
//! **Intake plane**: order validation, escrow custody, batch scheduling,
//! and the risk-control pause switch.
//!
//! ## Architecture
//!
//! 1. **OrderIntake**: fail-closed validation of the public order fields
//! 2. **EscrowLedger**: locked balances per (owner, token) plus the custody
//!    movement outbox
//! 3. **TokenLedger**: the external token ledger custody is pulled from and
//!    paid out to
//! 4. **LiquidityReserves**: `token_out` locked by each pair's liquidity
//!    provider, the counter-side of every fill
//! 5. **BatchScheduler**: one Open batch per pair; close seals membership
//! 6. **PauseSwitch**: refuses submit and settle while paused
//!
//! ## Order Flow
//!
//! ```text
//! submit → OrderIntake.validate() → EscrowLedger.lock() → BatchScheduler.admit()
//!        → BatchScheduler.close() → price discovery
//! ```

pub mod batch_scheduler;
pub mod escrow;
pub mod liquidity;
pub mod order_intake;
pub mod pause;
pub mod token_ledger;

pub use batch_scheduler::{ArrivalKey, BatchScheduler, membership_root, verify_membership_root};
pub use escrow::EscrowLedger;
pub use liquidity::LiquidityReserves;
pub use order_intake::OrderIntake;
pub use pause::PauseSwitch;
pub use token_ledger::{InMemoryTokenLedger, TokenLedger};
