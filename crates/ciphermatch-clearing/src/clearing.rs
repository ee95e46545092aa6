//! Confidential clearing value computation for batch auctions.
//!
//! The clearing value is the amount-weighted mean of the members' implied
//! prices, computed entirely under encryption:
//!
//! ```text
//! implied_i  = min_amount_out_i / amount_in_i
//! weight_i   = amount_in_i
//! clearing   = Σ(implied_i × weight_i) / Σ(weight_i)
//! ```
//!
//! Nothing is revealed here. Whether the batch carried any volume at all is
//! itself an encrypted flag (`has_volume`), and every division runs on a
//! divisor that has been swapped for an encrypted one when it would be
//! zero, so the computation never branches on a secret.

use chrono::{DateTime, Utc};
use ciphermatch_fhe::FheBackend;
use ciphermatch_types::{Clearing, Order, Result};
use rust_decimal::Decimal;

/// Result of clearing value computation.
#[derive(Debug, Clone)]
pub struct ClearingResult<C> {
    /// Encrypted clearing value. Meaningless when `has_volume` is 0.
    pub value: C,
    /// Encrypted 0/1: whether the total weight was positive.
    pub has_volume: C,
    /// Members that carried weight (deadline not yet passed). Public, since
    /// deadlines are public.
    pub weighted_members: usize,
}

impl<C> From<ClearingResult<C>> for Clearing<C> {
    fn from(result: ClearingResult<C>) -> Self {
        Clearing::Sealed {
            value: result.value,
            has_volume: result.has_volume,
        }
    }
}

/// Compute the sealed clearing value for a closed batch's members.
///
/// Members whose deadline has passed at `now` carry zero weight.
///
/// # Errors
/// Propagates backend failures.
pub fn compute_clearing_value<'a, B, I>(
    fhe: &B,
    members: I,
    now: DateTime<Utc>,
) -> Result<ClearingResult<B::Ciphertext>>
where
    B: FheBackend,
    I: IntoIterator<Item = &'a Order<B::Ciphertext>>,
{
    let zero = fhe.encrypt(Decimal::ZERO)?;
    let one = fhe.encrypt(Decimal::ONE)?;
    let mut scratch = Scratch::new(fhe);
    scratch.keep(zero.clone());
    scratch.keep(one.clone());

    let mut weighted_sum = scratch.keep(fhe.encrypt(Decimal::ZERO)?);
    let mut total_weight = scratch.keep(fhe.encrypt(Decimal::ZERO)?);
    let mut weighted_members = 0usize;

    for order in members {
        if order.is_expired_at(now) {
            continue;
        }
        let weight = &order.intent.amount_in;
        let implied = scratch.keep(implied_price(fhe, order, &zero, &one)?);
        let contribution = scratch.keep(fhe.mul(&implied, weight)?);
        weighted_sum = scratch.keep(fhe.add(&weighted_sum, &contribution)?);
        total_weight = scratch.keep(fhe.add(&total_weight, weight)?);
        weighted_members += 1;
    }

    let has_volume = fhe.gt(&total_weight, &zero)?;
    let divisor = scratch.keep(fhe.select(&has_volume, &total_weight, &one)?);
    let value = fhe.div(&weighted_sum, &divisor)?;

    tracing::debug!(weighted_members, "clearing value sealed");

    Ok(ClearingResult {
        value,
        has_volume,
        weighted_members,
    })
}

/// Encrypted `min_amount_out / amount_in`, with a zero `amount_in` replaced
/// by one so the division is always defined.
///
/// # Errors
/// Propagates backend failures.
pub fn implied_price<B: FheBackend>(
    fhe: &B,
    order: &Order<B::Ciphertext>,
    zero: &B::Ciphertext,
    one: &B::Ciphertext,
) -> Result<B::Ciphertext> {
    let amount_in = &order.intent.amount_in;
    let mut scratch = Scratch::new(fhe);
    let nonzero = scratch.keep(fhe.gt(amount_in, zero)?);
    let divisor = scratch.keep(fhe.select(&nonzero, amount_in, one)?);
    fhe.div(&order.intent.min_amount_out, &divisor)
}

/// Intermediate ciphertexts, released when the computation that made them
/// returns, whether it succeeded or not.
struct Scratch<'a, B: FheBackend> {
    fhe: &'a B,
    held: Vec<B::Ciphertext>,
}

impl<'a, B: FheBackend> Scratch<'a, B> {
    fn new(fhe: &'a B) -> Self {
        Self {
            fhe,
            held: Vec::new(),
        }
    }

    fn keep(&mut self, ct: B::Ciphertext) -> B::Ciphertext {
        self.held.push(ct.clone());
        ct
    }
}

impl<B: FheBackend> Drop for Scratch<'_, B> {
    fn drop(&mut self) {
        for ct in self.held.drain(..) {
            self.fhe.release(&ct);
        }
    }
}
