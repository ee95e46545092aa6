//! The encrypted-arithmetic interface every backend implements.
//!
//! Encrypted booleans are ordinary ciphertexts holding `0` or `1`, so a
//! comparison result can feed straight into arithmetic (`select`) without
//! ever being revealed.

use std::fmt;

use ciphermatch_types::{CiphermatchError, Result};
use rust_decimal::Decimal;

/// Homomorphic arithmetic over `Decimal` plaintexts.
///
/// Business logic is written against this trait only. `reveal` is the single
/// privileged operation; backends count every call so callers can audit how
/// much was decrypted.
pub trait FheBackend: Send + Sync {
    /// Opaque encrypted value.
    type Ciphertext: Clone + fmt::Debug + Send + Sync + 'static;

    /// Encrypt a plaintext under the backend's public key.
    fn encrypt(&self, value: Decimal) -> Result<Self::Ciphertext>;

    fn add(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    fn sub(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    fn mul(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// Encrypted division. Dividing by an encrypted zero yields an
    /// unspecified value; callers must guard the divisor with `select`.
    fn div(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// Encrypted `a > b` as 0/1.
    fn gt(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// Encrypted `a >= b` as 0/1.
    fn ge(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// Encrypted `a == b` as 0/1.
    fn equal(&self, a: &Self::Ciphertext, b: &Self::Ciphertext) -> Result<Self::Ciphertext>;

    /// Decrypt. Privileged and counted.
    fn reveal(&self, ct: &Self::Ciphertext) -> Result<Decimal>;

    /// Number of `reveal` calls served so far.
    fn reveal_count(&self) -> u64;

    /// Drop a ciphertext the caller will never use again. Releasing an
    /// unknown or already released ciphertext is a no-op.
    fn release(&self, _ct: &Self::Ciphertext) {}

    /// Encrypted `if cond { a } else { b }` where `cond` encrypts 0 or 1.
    fn select(
        &self,
        cond: &Self::Ciphertext,
        a: &Self::Ciphertext,
        b: &Self::Ciphertext,
    ) -> Result<Self::Ciphertext> {
        let diff = self.sub(a, b)?;
        let picked = self.mul(cond, &diff);
        self.release(&diff);
        let picked = picked?;
        let out = self.add(b, &picked);
        self.release(&picked);
        out
    }

    /// Decrypt an encrypted boolean.
    fn reveal_bool(&self, ct: &Self::Ciphertext) -> Result<bool> {
        let value = self.reveal(ct)?;
        if value == Decimal::ZERO {
            Ok(false)
        } else if value == Decimal::ONE {
            Ok(true)
        } else {
            Err(CiphermatchError::Cipher {
                reason: format!("expected an encrypted boolean, decrypted {value}"),
            })
        }
    }
}

/// Map a failed checked operation to a cipher error.
pub(crate) fn overflow(op: &str) -> CiphermatchError {
    CiphermatchError::Cipher {
        reason: format!("plaintext overflow in {op}"),
    }
}

/// Plaintext kernels shared by every backend that computes on `Decimal`.
pub(crate) mod kernel {
    use rust_decimal::Decimal;

    use super::overflow;
    use ciphermatch_types::Result;

    pub fn add(a: Decimal, b: Decimal) -> Result<Decimal> {
        a.checked_add(b).ok_or_else(|| overflow("add"))
    }

    pub fn sub(a: Decimal, b: Decimal) -> Result<Decimal> {
        a.checked_sub(b).ok_or_else(|| overflow("sub"))
    }

    pub fn mul(a: Decimal, b: Decimal) -> Result<Decimal> {
        a.checked_mul(b).ok_or_else(|| overflow("mul"))
    }

    /// Division by zero falls back to zero, mirroring FHE schemes that
    /// return a fixed garbage value instead of trapping.
    pub fn div(a: Decimal, b: Decimal) -> Result<Decimal> {
        if b.is_zero() {
            return Ok(Decimal::ZERO);
        }
        a.checked_div(b).ok_or_else(|| overflow("div"))
    }

    pub fn flag(value: bool) -> Decimal {
        if value { Decimal::ONE } else { Decimal::ZERO }
    }
}
