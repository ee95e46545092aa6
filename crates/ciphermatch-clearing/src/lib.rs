//! # ciphermatch-clearing
//!
//! **Confidential price discovery for CipherMatch.**
//!
//! Takes the members of a closed batch and produces a single encrypted
//! uniform clearing value. It has:
//!
//! - **Zero side effects**: no escrow, no ledger, no status changes
//! - **Zero reveals**: the result and its volume guard stay encrypted
//! - **Backend agnostic**: generic over any [`FheBackend`](ciphermatch_fhe::FheBackend)

pub mod clearing;

pub use clearing::{ClearingResult, compute_clearing_value, implied_price};
