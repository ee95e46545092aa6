//! Handle-based coprocessor backend.
//!
//! Ciphertexts are opaque 32-byte handles. Plaintexts live only inside the
//! backend's vault, the way an FHE coprocessor keeps ciphertext blobs off
//! the caller's side and hands out handles to them. Every operation
//! derives a fresh handle, so equal plaintexts never share a handle and a
//! handle reveals nothing about the value or the operation that made it.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use ciphermatch_types::{CiphermatchError, Result};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::backend::{FheBackend, kernel};

/// Opaque reference to a value held in a [`SealedBackend`] vault.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SealedHandle([u8; 32]);

impl SealedHandle {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for SealedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SealedHandle({})", hex::encode(&self.0[..6]))
    }
}

impl fmt::Display for SealedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ct:{}", hex::encode(self.0))
    }
}

#[derive(Default)]
struct Vault {
    values: HashMap<SealedHandle, Decimal>,
}

/// Coprocessor-style backend. Clones share the same vault.
#[derive(Clone)]
pub struct SealedBackend {
    vault: Arc<Mutex<Vault>>,
    /// Distinguishes this vault's handles from any other instance's.
    instance_key: [u8; 32],
    counter: Arc<AtomicU64>,
    reveals: Arc<AtomicU64>,
}

impl fmt::Debug for SealedBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SealedBackend")
            .field("ciphertexts", &self.len())
            .field("reveals", &self.reveals.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SealedBackend {
    /// Create a backend whose handle space is keyed by `seed`.
    #[must_use]
    pub fn new(seed: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"ciphermatch:sealed:instance:v1:");
        hasher.update(seed);
        Self {
            vault: Arc::new(Mutex::new(Vault::default())),
            instance_key: hasher.finalize().into(),
            counter: Arc::new(AtomicU64::new(0)),
            reveals: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of ciphertexts currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.vault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn next_handle(&self) -> SealedHandle {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let mut hasher = Sha256::new();
        hasher.update(b"ciphermatch:sealed:handle:v1:");
        hasher.update(self.instance_key);
        hasher.update(n.to_le_bytes());
        SealedHandle(hasher.finalize().into())
    }

    fn seal(&self, value: Decimal) -> SealedHandle {
        let handle = self.next_handle();
        self.vault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values
            .insert(handle, value);
        handle
    }

    fn open(&self, handle: &SealedHandle) -> Result<Decimal> {
        self.vault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values
            .get(handle)
            .copied()
            .ok_or_else(|| CiphermatchError::Cipher {
                reason: format!("unknown ciphertext handle {handle:?}"),
            })
    }

    fn binary(
        &self,
        a: &SealedHandle,
        b: &SealedHandle,
        op: impl FnOnce(Decimal, Decimal) -> Result<Decimal>,
    ) -> Result<SealedHandle> {
        let (x, y) = (self.open(a)?, self.open(b)?);
        Ok(self.seal(op(x, y)?))
    }
}

impl FheBackend for SealedBackend {
    type Ciphertext = SealedHandle;

    fn encrypt(&self, value: Decimal) -> Result<SealedHandle> {
        Ok(self.seal(value))
    }

    fn add(&self, a: &SealedHandle, b: &SealedHandle) -> Result<SealedHandle> {
        self.binary(a, b, kernel::add)
    }

    fn sub(&self, a: &SealedHandle, b: &SealedHandle) -> Result<SealedHandle> {
        self.binary(a, b, kernel::sub)
    }

    fn mul(&self, a: &SealedHandle, b: &SealedHandle) -> Result<SealedHandle> {
        self.binary(a, b, kernel::mul)
    }

    fn div(&self, a: &SealedHandle, b: &SealedHandle) -> Result<SealedHandle> {
        self.binary(a, b, kernel::div)
    }

    fn gt(&self, a: &SealedHandle, b: &SealedHandle) -> Result<SealedHandle> {
        self.binary(a, b, |x, y| Ok(kernel::flag(x > y)))
    }

    fn ge(&self, a: &SealedHandle, b: &SealedHandle) -> Result<SealedHandle> {
        self.binary(a, b, |x, y| Ok(kernel::flag(x >= y)))
    }

    fn equal(&self, a: &SealedHandle, b: &SealedHandle) -> Result<SealedHandle> {
        self.binary(a, b, |x, y| Ok(kernel::flag(x == y)))
    }

    fn reveal(&self, ct: &SealedHandle) -> Result<Decimal> {
        let value = self.open(ct)?;
        self.reveals.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(handle = %ct, "ciphertext revealed");
        Ok(value)
    }

    fn reveal_count(&self) -> u64 {
        self.reveals.load(Ordering::Relaxed)
    }

    fn release(&self, ct: &SealedHandle) {
        self.vault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values
            .remove(ct);
    }
}
