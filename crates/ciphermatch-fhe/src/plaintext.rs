//! Pass-through backend: "ciphertexts" are the plaintext values.
//!
//! Used by tests and simulations. Offers no confidentiality but keeps the
//! reveal accounting so tests can assert what settlement decrypted.

use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use ciphermatch_types::Result;
use rust_decimal::Decimal;

use crate::backend::{FheBackend, kernel};

/// Plaintext pass-through backend. Clones share the reveal counter.
#[derive(Debug, Clone, Default)]
pub struct PlaintextBackend {
    reveals: Arc<AtomicU64>,
}

impl PlaintextBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl FheBackend for PlaintextBackend {
    type Ciphertext = Decimal;

    fn encrypt(&self, value: Decimal) -> Result<Decimal> {
        Ok(value)
    }

    fn add(&self, a: &Decimal, b: &Decimal) -> Result<Decimal> {
        kernel::add(*a, *b)
    }

    fn sub(&self, a: &Decimal, b: &Decimal) -> Result<Decimal> {
        kernel::sub(*a, *b)
    }

    fn mul(&self, a: &Decimal, b: &Decimal) -> Result<Decimal> {
        kernel::mul(*a, *b)
    }

    fn div(&self, a: &Decimal, b: &Decimal) -> Result<Decimal> {
        kernel::div(*a, *b)
    }

    fn gt(&self, a: &Decimal, b: &Decimal) -> Result<Decimal> {
        Ok(kernel::flag(a > b))
    }

    fn ge(&self, a: &Decimal, b: &Decimal) -> Result<Decimal> {
        Ok(kernel::flag(a >= b))
    }

    fn equal(&self, a: &Decimal, b: &Decimal) -> Result<Decimal> {
        Ok(kernel::flag(a == b))
    }

    fn reveal(&self, ct: &Decimal) -> Result<Decimal> {
        self.reveals.fetch_add(1, Ordering::Relaxed);
        Ok(*ct)
    }

    fn reveal_count(&self) -> u64 {
        self.reveals.load(Ordering::Relaxed)
    }
}
