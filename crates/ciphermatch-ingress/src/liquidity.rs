//! Liquidity reserves, the counter-side of every fill.
//!
//! A pair's liquidity provider locks `token_out` through the escrow ledger.
//! Reserves are tracked separately from order escrow so the conservation
//! check can tell the two apart even when a provider also trades.

use std::collections::BTreeMap;

use ciphermatch_types::{CiphermatchError, Result, TraderId};
use rust_decimal::Decimal;

use crate::escrow::EscrowLedger;

#[derive(Debug, Clone, Default)]
pub struct LiquidityReserves {
    reserves: BTreeMap<(TraderId, String), Decimal>,
}

impl LiquidityReserves {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock `amount` of `token` from `provider` as reserve.
    ///
    /// # Errors
    /// Returns `InvalidOrder` if `amount` is not positive.
    pub fn provide(
        &mut self,
        escrow: &mut EscrowLedger,
        provider: TraderId,
        token: &str,
        amount: Decimal,
    ) -> Result<()> {
        escrow.lock(provider, token, amount)?;
        *self
            .reserves
            .entry((provider, token.to_string()))
            .or_default() += amount;
        Ok(())
    }

    /// Release `amount` of reserve back to `provider`.
    ///
    /// # Errors
    /// Returns `InsufficientLocked` if the reserve is smaller than `amount`.
    pub fn withdraw(
        &mut self,
        escrow: &mut EscrowLedger,
        provider: TraderId,
        token: &str,
        amount: Decimal,
    ) -> Result<()> {
        self.debit(provider, token, amount)?;
        escrow.release(provider, token, amount)
    }

    /// Pay `amount` of `provider`'s reserve to `recipient`.
    ///
    /// # Errors
    /// Returns `InsufficientLocked` if the reserve is smaller than `amount`.
    pub fn pay_out(
        &mut self,
        escrow: &mut EscrowLedger,
        provider: TraderId,
        token: &str,
        amount: Decimal,
        recipient: TraderId,
    ) -> Result<()> {
        self.debit(provider, token, amount)?;
        escrow.transfer_out(provider, token, amount, recipient)
    }

    #[must_use]
    pub fn reserve(&self, provider: TraderId, token: &str) -> Decimal {
        self.reserves
            .get(&(provider, token.to_string()))
            .copied()
            .unwrap_or_default()
    }

    /// Total reserve of `token` across providers.
    #[must_use]
    pub fn total(&self, token: &str) -> Decimal {
        self.reserves
            .iter()
            .filter(|((_, t), _)| t == token)
            .map(|(_, amount)| *amount)
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(TraderId, String), &Decimal)> {
        self.reserves.iter()
    }

    fn debit(&mut self, provider: TraderId, token: &str, amount: Decimal) -> Result<()> {
        let reserve = self.reserve(provider, token);
        if amount.is_sign_negative() || reserve < amount {
            return Err(CiphermatchError::InsufficientLocked {
                owner: provider,
                token: token.to_string(),
                needed: amount,
                locked: reserve,
            });
        }
        self.reserves
            .insert((provider, token.to_string()), reserve - amount);
        Ok(())
    }
}
