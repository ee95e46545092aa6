//! Escrow ledger: custody balances locked against pending orders and
//! liquidity reserves.
//!
//! Every mutation is atomic: either the full step succeeds or the locked
//! balances are unchanged. The ledger itself never talks to the token
//! ledger. It records each custody movement in an outbox; the engine pulls
//! inflows before committing an operation and pays outflows after.

use std::collections::{BTreeMap, BTreeSet};

use ciphermatch_types::{CiphermatchError, CustodyMovement, MovementReason, Result, TraderId};
use rust_decimal::Decimal;

/// Locked balances keyed by (owner, token), plus the pending movement outbox.
#[derive(Debug, Clone, Default)]
pub struct EscrowLedger {
    locked: BTreeMap<(TraderId, String), Decimal>,
    outbox: Vec<CustodyMovement>,
}

impl EscrowLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take `amount` of `token` from `owner` into custody.
    ///
    /// # Errors
    /// Returns `InvalidOrder` if `amount` is not positive.
    pub fn lock(&mut self, owner: TraderId, token: &str, amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(CiphermatchError::InvalidOrder {
                reason: format!("escrow amount must be positive, got {amount}"),
            });
        }
        *self
            .locked
            .entry((owner, token.to_string()))
            .or_default() += amount;
        self.outbox.push(CustodyMovement {
            account: owner,
            token: token.to_string(),
            amount,
            reason: MovementReason::Lock,
        });
        Ok(())
    }

    /// Return `amount` of `owner`'s locked `token` to `owner`.
    ///
    /// # Errors
    /// Returns `InsufficientLocked` if `amount` exceeds the locked balance.
    pub fn release(&mut self, owner: TraderId, token: &str, amount: Decimal) -> Result<()> {
        self.debit(owner, token, amount)?;
        self.emit(owner, token, amount, MovementReason::Release);
        Ok(())
    }

    /// Pay `amount` of `owner`'s locked `token` to `recipient`.
    ///
    /// # Errors
    /// Returns `InsufficientLocked` if `amount` exceeds the locked balance.
    pub fn transfer_out(
        &mut self,
        owner: TraderId,
        token: &str,
        amount: Decimal,
        recipient: TraderId,
    ) -> Result<()> {
        self.debit(owner, token, amount)?;
        self.emit(recipient, token, amount, MovementReason::Settlement);
        Ok(())
    }

    /// Locked balance of `owner` in `token`.
    #[must_use]
    pub fn locked(&self, owner: TraderId, token: &str) -> Decimal {
        self.locked
            .get(&(owner, token.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// Total locked across all owners for `token`.
    #[must_use]
    pub fn total_locked(&self, token: &str) -> Decimal {
        self.locked
            .iter()
            .filter(|((_, t), _)| t == token)
            .map(|(_, amount)| *amount)
            .sum()
    }

    /// Every token that has ever been locked.
    #[must_use]
    pub fn tokens(&self) -> BTreeSet<String> {
        self.locked.keys().map(|(_, t)| t.clone()).collect()
    }

    /// Movements recorded since the last [`take_outbox`](Self::take_outbox).
    #[must_use]
    pub fn pending_movements(&self) -> &[CustodyMovement] {
        &self.outbox
    }

    /// Drain the outbox.
    pub fn take_outbox(&mut self) -> Vec<CustodyMovement> {
        std::mem::take(&mut self.outbox)
    }

    fn debit(&mut self, owner: TraderId, token: &str, amount: Decimal) -> Result<()> {
        if amount.is_sign_negative() {
            return Err(CiphermatchError::EscrowInvariantViolation {
                reason: format!("negative escrow movement {amount} {token}"),
            });
        }
        let locked = self.locked(owner, token);
        if locked < amount {
            return Err(CiphermatchError::InsufficientLocked {
                owner,
                token: token.to_string(),
                needed: amount,
                locked,
            });
        }
        if let Some(entry) = self.locked.get_mut(&(owner, token.to_string())) {
            *entry -= amount;
        }
        Ok(())
    }

    /// Zero-amount movements are not recorded.
    fn emit(&mut self, account: TraderId, token: &str, amount: Decimal, reason: MovementReason) {
        if amount.is_zero() {
            return;
        }
        self.outbox.push(CustodyMovement {
            account,
            token: token.to_string(),
            amount,
            reason,
        });
    }
}
