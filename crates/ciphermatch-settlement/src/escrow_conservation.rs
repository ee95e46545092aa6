//! Escrow conservation invariant checker.
//!
//! Invariants enforced after every engine mutation:
//! ```text
//! ∀ (owner, token): locked(owner, token)
//!     == Σ escrowed of owner's Pending orders selling token
//!      + owner's liquidity reserve of token
//! ∀ token: custody balance on the token ledger == Σ locked(·, token)
//! ```
//!
//! If either breaks, custody no longer backs the orders it holds. The
//! engine refuses to commit the operation that broke it.

use std::collections::{BTreeMap, BTreeSet};

use ciphermatch_ingress::{EscrowLedger, LiquidityReserves, TokenLedger};
use ciphermatch_types::{CiphermatchError, Order, Result, TraderId};
use rust_decimal::Decimal;

/// Stateless checker for the escrow invariants.
pub struct EscrowConservation;

impl EscrowConservation {
    /// Expected locked balance per (owner, token) from orders and reserves.
    #[must_use]
    pub fn expected_locked<'a, C: 'a>(
        orders: impl IntoIterator<Item = &'a Order<C>>,
        reserves: &LiquidityReserves,
    ) -> BTreeMap<(TraderId, String), Decimal> {
        let mut expected: BTreeMap<(TraderId, String), Decimal> = BTreeMap::new();
        for order in orders.into_iter().filter(|o| o.is_pending()) {
            *expected
                .entry((order.trader, order.pair.token_in.clone()))
                .or_default() += order.escrowed;
        }
        for (key, amount) in reserves.iter() {
            *expected.entry(key.clone()).or_default() += *amount;
        }
        expected
    }

    /// Check that escrow holds exactly what pending orders and reserves need.
    ///
    /// # Errors
    /// Returns `EscrowInvariantViolation` naming the first mismatch.
    pub fn verify_locked<'a, C: 'a>(
        escrow: &EscrowLedger,
        orders: impl IntoIterator<Item = &'a Order<C>>,
        reserves: &LiquidityReserves,
    ) -> Result<()> {
        let expected = Self::expected_locked(orders, reserves);

        let mut tokens: BTreeSet<String> = escrow.tokens();
        tokens.extend(expected.keys().map(|(_, t)| t.clone()));

        for ((owner, token), want) in &expected {
            let have = escrow.locked(*owner, token);
            if have != *want {
                return Err(Self::violation(format!(
                    "{owner} has {have} {token} locked, pending orders and reserves need {want}"
                )));
            }
        }
        for token in &tokens {
            let want: Decimal = expected
                .iter()
                .filter(|((_, t), _)| t == token)
                .map(|(_, v)| *v)
                .sum();
            let have = escrow.total_locked(token);
            if have != want {
                return Err(Self::violation(format!(
                    "{have} {token} locked in total, pending orders and reserves need {want}"
                )));
            }
        }
        Ok(())
    }

    /// Check that the custody account's ledger balance equals total locked.
    ///
    /// # Errors
    /// Returns `EscrowInvariantViolation` naming the first mismatched token.
    pub fn verify_custody<L: TokenLedger + ?Sized>(
        ledger: &L,
        custody: TraderId,
        escrow: &EscrowLedger,
    ) -> Result<()> {
        for token in escrow.tokens() {
            let held = ledger.balance_of(custody, &token);
            let locked = escrow.total_locked(&token);
            if held != locked {
                return Err(Self::violation(format!(
                    "custody holds {held} {token}, escrow has {locked} locked"
                )));
            }
        }
        Ok(())
    }

    fn violation(reason: String) -> CiphermatchError {
        tracing::error!(%reason, "escrow conservation violated");
        CiphermatchError::EscrowInvariantViolation { reason }
    }
}

#[cfg(test)]
mod tests {
    use ciphermatch_ingress::InMemoryTokenLedger;
    use ciphermatch_types::OrderStatus;

    use super::*;

    fn d(n: i64) -> Decimal {
        Decimal::new(n, 0)
    }

    #[test]
    fn balanced_escrow_passes() {
        let mut escrow = EscrowLedger::new();
        let mut reserves = LiquidityReserves::new();
        let order = Order::dummy(1, d(100), d(95));
        escrow.lock(order.trader, "USDC", d(100)).unwrap();
        reserves
            .provide(&mut escrow, TraderId::new(), "WETH", d(500))
            .unwrap();
        assert!(EscrowConservation::verify_locked(&escrow, [&order], &reserves).is_ok());
    }

    #[test]
    fn terminal_orders_need_no_escrow() {
        let escrow = EscrowLedger::new();
        let mut order = Order::dummy(1, d(100), d(95));
        order.status = OrderStatus::Filled;
        assert!(
            EscrowConservation::verify_locked(&escrow, [&order], &LiquidityReserves::new())
                .is_ok()
        );
    }

    #[test]
    fn missing_escrow_detected() {
        let escrow = EscrowLedger::new();
        let order = Order::dummy(1, d(100), d(95));
        let err = EscrowConservation::verify_locked(&escrow, [&order], &LiquidityReserves::new())
            .unwrap_err();
        assert!(matches!(err, CiphermatchError::EscrowInvariantViolation { .. }));
    }

    #[test]
    fn orphaned_escrow_detected() {
        let mut escrow = EscrowLedger::new();
        escrow.lock(TraderId::new(), "USDC", d(1)).unwrap();
        let orders: Vec<Order<Decimal>> = Vec::new();
        let err = EscrowConservation::verify_locked(&escrow, &orders, &LiquidityReserves::new())
            .unwrap_err();
        assert!(matches!(err, CiphermatchError::EscrowInvariantViolation { .. }));
    }

    #[test]
    fn custody_balance_must_match() {
        let mut escrow = EscrowLedger::new();
        let mut ledger = InMemoryTokenLedger::new();
        let custody = TraderId::new();
        escrow.lock(TraderId::new(), "USDC", d(100)).unwrap();
        assert!(EscrowConservation::verify_custody(&ledger, custody, &escrow).is_err());
        ledger.mint(custody, "USDC", d(100));
        assert!(EscrowConservation::verify_custody(&ledger, custody, &escrow).is_ok());
    }
}
