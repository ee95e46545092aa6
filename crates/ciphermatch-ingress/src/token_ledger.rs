//! Token ledger seam.
//!
//! The engine never holds free balances itself. Traders keep their tokens
//! on an external fungible-token ledger and grant the engine's custody
//! account an allowance; intake pulls the escrow with `transfer_from` and
//! settlement pays out with `transfer`.

use std::collections::HashMap;

use ciphermatch_types::{CiphermatchError, Result, TraderId};
use rust_decimal::Decimal;

/// External fungible-token ledger used for custody.
pub trait TokenLedger: Send + Sync {
    /// Free balance of `owner` in `token`.
    fn balance_of(&self, owner: TraderId, token: &str) -> Decimal;

    /// Move `amount` of `token` from `from` to `to`.
    fn transfer(&mut self, from: TraderId, to: TraderId, token: &str, amount: Decimal)
    -> Result<()>;

    /// Move `amount` of `token` from `from` to `to`, spending the allowance
    /// `from` granted to `spender`.
    fn transfer_from(
        &mut self,
        spender: TraderId,
        from: TraderId,
        to: TraderId,
        token: &str,
        amount: Decimal,
    ) -> Result<()>;
}

/// In-memory token ledger with ERC-20 style allowances.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTokenLedger {
    balances: HashMap<(TraderId, String), Decimal>,
    /// (owner, spender, token) → remaining allowance.
    allowances: HashMap<(TraderId, TraderId, String), Decimal>,
}

impl InMemoryTokenLedger {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create new supply out of thin air.
    pub fn mint(&mut self, owner: TraderId, token: &str, amount: Decimal) {
        *self
            .balances
            .entry((owner, token.to_string()))
            .or_default() += amount;
    }

    /// Set the allowance `owner` grants to `spender`. Replaces any previous value.
    pub fn approve(&mut self, owner: TraderId, spender: TraderId, token: &str, amount: Decimal) {
        self.allowances
            .insert((owner, spender, token.to_string()), amount);
    }

    #[must_use]
    pub fn allowance(&self, owner: TraderId, spender: TraderId, token: &str) -> Decimal {
        self.allowances
            .get(&(owner, spender, token.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// Sum of all balances of `token`.
    #[must_use]
    pub fn total_supply(&self, token: &str) -> Decimal {
        self.balances
            .iter()
            .filter(|((_, t), _)| t == token)
            .map(|(_, amount)| *amount)
            .sum()
    }

    fn debit(&mut self, owner: TraderId, token: &str, amount: Decimal) -> Result<()> {
        let available = self.balance_of(owner, token);
        if available < amount {
            return Err(CiphermatchError::InsufficientBalance {
                token: token.to_string(),
                needed: amount,
                available,
            });
        }
        self.balances
            .insert((owner, token.to_string()), available - amount);
        Ok(())
    }
}

impl TokenLedger for InMemoryTokenLedger {
    fn balance_of(&self, owner: TraderId, token: &str) -> Decimal {
        self.balances
            .get(&(owner, token.to_string()))
            .copied()
            .unwrap_or_default()
    }

    fn transfer(
        &mut self,
        from: TraderId,
        to: TraderId,
        token: &str,
        amount: Decimal,
    ) -> Result<()> {
        if amount.is_sign_negative() {
            return Err(CiphermatchError::TokenTransferFailed {
                reason: format!("negative amount {amount}"),
            });
        }
        self.debit(from, token, amount)?;
        self.mint(to, token, amount);
        Ok(())
    }

    fn transfer_from(
        &mut self,
        spender: TraderId,
        from: TraderId,
        to: TraderId,
        token: &str,
        amount: Decimal,
    ) -> Result<()> {
        let allowed = self.allowance(from, spender, token);
        if allowed < amount {
            return Err(CiphermatchError::InsufficientBalance {
                token: format!("{token} allowance"),
                needed: amount,
                available: allowed,
            });
        }
        self.transfer(from, to, token, amount)?;
        self.allowances
            .insert((from, spender, token.to_string()), allowed - amount);
        Ok(())
    }
}
