//! # ciphermatch-fhe
//!
//! **EncryptedValue runtime**: the abstract encrypted-arithmetic interface
//! that every financial quantity inside the engine flows through, plus two
//! backends.
//!
//! ## Backends
//!
//! - [`PlaintextBackend`]: pass-through for tests and simulation
//! - [`SealedBackend`]: coprocessor-style backend; callers only ever hold
//!   opaque handles and every decryption is counted. Handles stay in
//!   the vault until [`FheBackend::release`] drops them
//!
//! ## Usage
//!
//! ```
//! use ciphermatch_fhe::{FheBackend, PlaintextBackend};
//! use rust_decimal::Decimal;
//!
//! let fhe = PlaintextBackend::new();
//! let a = fhe.encrypt(Decimal::new(95, 0)).unwrap();
//! let b = fhe.encrypt(Decimal::new(100, 0)).unwrap();
//! let price = fhe.div(&a, &b).unwrap();
//! assert_eq!(fhe.reveal(&price).unwrap(), Decimal::new(95, 2));
//! assert_eq!(fhe.reveal_count(), 1);
//! ```

pub mod backend;
pub mod plaintext;
pub mod sealed;

pub use backend::FheBackend;
pub use plaintext::PlaintextBackend;
pub use sealed::{SealedBackend, SealedHandle};
