//! Order intake: the validation gate every new order passes.
//!
//! Intake is fail-closed: a request that fails any check is rejected
//! before anything is locked or assigned. Public fields are checked in
//! plaintext. The encrypted intent is checked under encryption and only a
//! single well-formed bit is revealed: `amount_in` must equal the public
//! escrow amount and `min_amount_out` must lie in `[0, MAX_AMOUNT_UNITS]`.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use ciphermatch_fhe::FheBackend;
use ciphermatch_types::{
    CiphermatchError, EngineConfig, Order, OrderId, OrderStatus, Result, SubmitOrder, TokenPair,
    constants,
};
use rust_decimal::Decimal;

/// Validates new-order requests and builds the order records.
#[derive(Debug, Clone)]
pub struct OrderIntake {
    /// Directional pairs accepted by this engine.
    pairs: BTreeSet<TokenPair>,
}

impl OrderIntake {
    #[must_use]
    pub fn new(pairs: impl IntoIterator<Item = TokenPair>) -> Self {
        Self {
            pairs: pairs.into_iter().collect(),
        }
    }

    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.pairs.iter().map(|pc| pc.pair()))
    }

    #[must_use]
    pub fn supports(&self, pair: &TokenPair) -> bool {
        self.pairs.contains(pair)
    }

    /// Check a request against the public intake rules.
    ///
    /// Checks run in a fixed order so the reported error is deterministic:
    /// 1. token identifiers are non-empty and distinct
    /// 2. the deadline is strictly in the future
    /// 3. the directional pair is configured
    /// 4. the escrow amount is positive, at most `MAX_AMOUNT_UNITS`, and
    ///    representable
    ///
    /// # Errors
    /// Returns the validation error of the first failed check.
    pub fn validate<C>(&self, req: &SubmitOrder<C>, now: DateTime<Utc>) -> Result<TokenPair> {
        if req.token_in.is_empty() || req.token_out.is_empty() {
            return Err(CiphermatchError::InvalidOrder {
                reason: "token identifiers must not be empty".to_string(),
            });
        }
        if req.token_in == req.token_out {
            return Err(CiphermatchError::SameToken(req.token_in.clone()));
        }

        if req.deadline <= now {
            return Err(CiphermatchError::DeadlineNotInFuture);
        }

        let pair = req.pair();
        if !self.supports(&pair) {
            return Err(CiphermatchError::UnsupportedPair(pair));
        }

        if req.escrow_amount <= Decimal::ZERO {
            return Err(CiphermatchError::InvalidOrder {
                reason: format!("escrow amount must be positive, got {}", req.escrow_amount),
            });
        }
        if req.escrow_amount > Decimal::from(constants::MAX_AMOUNT_UNITS) {
            return Err(CiphermatchError::InvalidOrder {
                reason: format!(
                    "escrow amount {} exceeds {}",
                    req.escrow_amount,
                    constants::MAX_AMOUNT_UNITS
                ),
            });
        }
        if req.escrow_amount.scale() > constants::AMOUNT_PRECISION {
            return Err(CiphermatchError::InvalidOrder {
                reason: format!(
                    "escrow amount {} has more than {} decimal places",
                    req.escrow_amount,
                    constants::AMOUNT_PRECISION
                ),
            });
        }

        Ok(pair)
    }

    /// Check the encrypted intent against the public escrow amount.
    ///
    /// Reveals one boolean, the conjunction of every check, so a rejection
    /// says nothing about which bound the intent missed. Costs one reveal
    /// per call.
    ///
    /// # Errors
    /// - `InvalidOrder` if `amount_in` differs from `escrow_amount` or
    ///   `min_amount_out` is negative or above `MAX_AMOUNT_UNITS`
    /// - backend errors
    pub fn verify_intent<B: FheBackend>(
        &self,
        fhe: &B,
        req: &SubmitOrder<B::Ciphertext>,
    ) -> Result<()> {
        let mut temps = Vec::with_capacity(8);
        let outcome = well_formed(fhe, req, &mut temps);
        for ct in &temps {
            fhe.release(ct);
        }
        if outcome? {
            Ok(())
        } else {
            tracing::debug!(trader = %req.trader, "intent does not match its escrow");
            Err(CiphermatchError::InvalidOrder {
                reason: "encrypted intent does not match the escrow amount or is out of range"
                    .to_string(),
            })
        }
    }

    /// Build the pending order record for a validated request.
    #[must_use]
    pub fn admit<C>(
        &self,
        id: OrderId,
        pair: TokenPair,
        req: SubmitOrder<C>,
        now: DateTime<Utc>,
    ) -> Order<C> {
        Order {
            id,
            trader: req.trader,
            pair,
            intent: req.intent,
            escrowed: req.escrow_amount,
            deadline: req.deadline,
            submit_time: now,
            status: OrderStatus::Pending,
            batch_id: None,
            carry_count: 0,
            updated_at: now,
        }
    }
}

fn well_formed<B: FheBackend>(
    fhe: &B,
    req: &SubmitOrder<B::Ciphertext>,
    temps: &mut Vec<B::Ciphertext>,
) -> Result<bool> {
    let mut hold = |ct: B::Ciphertext| {
        temps.push(ct.clone());
        ct
    };
    let escrow = hold(fhe.encrypt(req.escrow_amount)?);
    let zero = hold(fhe.encrypt(Decimal::ZERO)?);
    let cap = hold(fhe.encrypt(Decimal::from(constants::MAX_AMOUNT_UNITS))?);
    let min_out = &req.intent.min_amount_out;

    let bound = hold(fhe.equal(&escrow, &req.intent.amount_in)?);
    let floor = hold(fhe.ge(min_out, &zero)?);
    let ceiling = hold(fhe.ge(&cap, min_out)?);
    let in_range = hold(fhe.mul(&floor, &ceiling)?);
    let ok = hold(fhe.mul(&bound, &in_range)?);
    fhe.reveal_bool(&ok)
}

#[cfg(test)]
mod tests {
    use ciphermatch_fhe::{PlaintextBackend, SealedBackend};
    use ciphermatch_types::{EncryptedIntent, TraderId};

    use super::*;

    fn intake() -> OrderIntake {
        OrderIntake::new([TokenPair::new("USDC", "WETH")])
    }

    fn request(token_in: &str, token_out: &str, amount: Decimal) -> SubmitOrder<Decimal> {
        SubmitOrder {
            trader: TraderId::new(),
            token_in: token_in.to_string(),
            token_out: token_out.to_string(),
            intent: EncryptedIntent {
                amount_in: amount,
                min_amount_out: Decimal::new(95, 0),
                max_slippage: Decimal::new(1, 2),
            },
            escrow_amount: amount,
            deadline: Utc::now() + chrono::Duration::minutes(5),
        }
    }

    #[test]
    fn valid_request_passes() {
        let pair = intake()
            .validate(&request("USDC", "WETH", Decimal::new(100, 0)), Utc::now())
            .unwrap();
        assert_eq!(pair, TokenPair::new("USDC", "WETH"));
    }

    #[test]
    fn same_token_rejected() {
        let err = intake()
            .validate(&request("USDC", "USDC", Decimal::new(100, 0)), Utc::now())
            .unwrap_err();
        assert!(matches!(err, CiphermatchError::SameToken(_)));
    }

    #[test]
    fn past_or_present_deadline_rejected() {
        let now = Utc::now();
        let mut req = request("USDC", "WETH", Decimal::new(100, 0));
        req.deadline = now;
        let err = intake().validate(&req, now).unwrap_err();
        assert!(matches!(err, CiphermatchError::DeadlineNotInFuture));
    }

    #[test]
    fn reverse_direction_is_unsupported() {
        let err = intake()
            .validate(&request("WETH", "USDC", Decimal::new(1, 0)), Utc::now())
            .unwrap_err();
        assert!(matches!(err, CiphermatchError::UnsupportedPair(_)));
        assert_eq!(err.code(), "CM_ERR_103");
    }

    #[test]
    fn non_positive_escrow_rejected() {
        let err = intake()
            .validate(&request("USDC", "WETH", Decimal::ZERO), Utc::now())
            .unwrap_err();
        assert!(matches!(err, CiphermatchError::InvalidOrder { .. }));
        assert!(
            intake()
                .validate(&request("USDC", "WETH", Decimal::new(-5, 0)), Utc::now())
                .is_err()
        );
    }

    #[test]
    fn excess_precision_rejected() {
        let err = intake()
            .validate(&request("USDC", "WETH", Decimal::new(1, 9)), Utc::now())
            .unwrap_err();
        assert!(matches!(err, CiphermatchError::InvalidOrder { .. }));
    }

    #[test]
    fn same_token_reported_before_deadline() {
        let now = Utc::now();
        let mut req = request("USDC", "USDC", Decimal::new(100, 0));
        req.deadline = now - chrono::Duration::seconds(1);
        let err = intake().validate(&req, now).unwrap_err();
        assert!(matches!(err, CiphermatchError::SameToken(_)));
    }

    #[test]
    fn oversized_escrow_rejected() {
        let cap = Decimal::from(constants::MAX_AMOUNT_UNITS);
        assert!(
            intake()
                .validate(&request("USDC", "WETH", cap), Utc::now())
                .is_ok()
        );
        let err = intake()
            .validate(&request("USDC", "WETH", cap + Decimal::ONE), Utc::now())
            .unwrap_err();
        assert!(matches!(err, CiphermatchError::InvalidOrder { .. }));
    }

    #[test]
    fn matching_intent_passes_with_one_reveal() {
        let fhe = PlaintextBackend::new();
        let req = request("USDC", "WETH", Decimal::new(100, 0));
        intake().verify_intent(&fhe, &req).unwrap();
        assert_eq!(fhe.reveal_count(), 1);
    }

    #[test]
    fn amount_in_must_equal_escrow() {
        let fhe = PlaintextBackend::new();
        let mut req = request("USDC", "WETH", Decimal::ONE);
        req.intent.amount_in = Decimal::new(1_000_000, 0);
        let err = intake().verify_intent(&fhe, &req).unwrap_err();
        assert!(matches!(err, CiphermatchError::InvalidOrder { .. }));
        assert_eq!(err.kind(), ciphermatch_types::ErrorKind::Validation);
    }

    #[test]
    fn min_amount_out_must_be_in_range() {
        let fhe = PlaintextBackend::new();
        let cap = Decimal::from(constants::MAX_AMOUNT_UNITS);
        for bad in [Decimal::new(-1, 0), cap + Decimal::ONE, Decimal::MAX] {
            let mut req = request("USDC", "WETH", Decimal::new(100, 0));
            req.intent.min_amount_out = bad;
            assert!(
                intake().verify_intent(&fhe, &req).is_err(),
                "min_amount_out {bad} accepted"
            );
        }
        for good in [Decimal::ZERO, cap] {
            let mut req = request("USDC", "WETH", Decimal::new(100, 0));
            req.intent.min_amount_out = good;
            intake().verify_intent(&fhe, &req).unwrap();
        }
    }

    #[test]
    fn verification_scratch_is_released() {
        let fhe = SealedBackend::new(b"intake");
        let req = SubmitOrder {
            trader: TraderId::new(),
            token_in: "USDC".to_string(),
            token_out: "WETH".to_string(),
            intent: EncryptedIntent {
                amount_in: fhe.encrypt(Decimal::new(100, 0)).unwrap(),
                min_amount_out: fhe.encrypt(Decimal::new(95, 0)).unwrap(),
                max_slippage: fhe.encrypt(Decimal::new(1, 2)).unwrap(),
            },
            escrow_amount: Decimal::new(100, 0),
            deadline: Utc::now() + chrono::Duration::minutes(5),
        };
        intake().verify_intent(&fhe, &req).unwrap();
        assert_eq!(fhe.len(), 3);
    }

    #[test]
    fn admit_builds_pending_order() {
        let i = intake();
        let req = request("USDC", "WETH", Decimal::new(250, 0));
        let now = Utc::now();
        let pair = i.validate(&req, now).unwrap();
        let order = i.admit(OrderId(7), pair, req, now);
        assert_eq!(order.id, OrderId(7));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.escrowed, Decimal::new(250, 0));
        assert_eq!(order.submit_time, now);
        assert!(order.batch_id.is_none());
        assert_eq!(order.carry_count, 0);
    }
}
