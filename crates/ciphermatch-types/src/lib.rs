//! # ciphermatch-types
//!
//! Shared types, errors, and configuration for the **CipherMatch**
//! confidential batch-auction engine.
//!
//! This crate is the leaf dependency of the workspace; every other crate
//! depends on it. It defines:
//!
//! - **Identifiers**: [`OrderId`], [`BatchId`], [`TraderId`], [`TokenPair`]
//! - **Order model**: [`Order`], [`EncryptedIntent`], [`SubmitOrder`], [`OrderStatus`], [`OrderView`]
//! - **Batch model**: [`Batch`], [`BatchStatus`], [`Clearing`], [`BatchView`]
//! - **Escrow model**: [`CustodyMovement`], [`MovementReason`]
//! - **Receipts**: [`SettlementEvent`], [`SettlementOutcome`], [`SettlementReport`], [`BatchAudit`]
//! - **Configuration**: [`EngineConfig`], [`BatchConfig`], [`PairConfig`]
//! - **Time**: [`Clock`], [`SystemClock`], [`ManualClock`]
//! - **Errors**: [`CiphermatchError`] with `CM_ERR_` prefix codes
//! - **Constants**: system-wide limits and defaults
//!
//! Types that carry encrypted fields are generic over the ciphertext type
//! `C` of whichever backend the engine runs with.

pub mod balance;
pub mod batch;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod ids;
pub mod order;
pub mod receipt;

pub use balance::*;
pub use batch::*;
pub use clock::*;
pub use config::*;
pub use error::*;
pub use ids::*;
pub use order::*;
pub use receipt::*;

// Constants are accessed via `ciphermatch_types::constants::FOO`
// (not re-exported to avoid name collisions).
