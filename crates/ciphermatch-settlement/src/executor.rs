//! Settlement executor: reveal, then fill, carry or expire each member.
//!
//! For a closed batch whose clearing value has been sealed:
//! 1. Reveal the encrypted volume flag
//! 2. If there was volume, reveal the clearing value once
//! 3. Walk members in arrival order:
//!    - deadline passed → Expired, escrow released to the trader
//!    - fill predicate true → pay `token_out` from the pair's reserve,
//!      pay the escrowed `token_in` to the provider, Filled
//!    - otherwise → carried into the pair's next Open batch
//! 4. Mark the batch Settled
//!
//! The executor mutates the state it is handed in place. Callers run it on
//! a working copy and discard the copy on error, which is what makes a
//! failed settlement leave nothing behind.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ciphermatch_fhe::FheBackend;
use ciphermatch_ingress::{BatchScheduler, EscrowLedger, LiquidityReserves};
use ciphermatch_types::{
    BatchId, BatchStatus, CiphermatchError, Clearing, EngineConfig, Order, OrderId, OrderStatus,
    Result, SettlementEvent, SettlementOutcome, SettlementReport, TokenPair, TraderId, constants,
};
use rust_decimal::{Decimal, RoundingStrategy};

/// Mutable engine state settlement operates on.
pub struct SettlementState<'a, C> {
    pub orders: &'a mut BTreeMap<OrderId, Order<C>>,
    pub scheduler: &'a mut BatchScheduler<C>,
    pub escrow: &'a mut EscrowLedger,
    pub reserves: &'a mut LiquidityReserves,
}

/// Executes settlement of one batch against an encrypted-arithmetic backend.
pub struct SettlementExecutor<'a, B> {
    fhe: &'a B,
    config: &'a EngineConfig,
}

impl<'a, B: FheBackend> SettlementExecutor<'a, B> {
    #[must_use]
    pub fn new(fhe: &'a B, config: &'a EngineConfig) -> Self {
        Self { fhe, config }
    }

    /// Settle a Closed batch.
    ///
    /// # Errors
    /// - `BatchNotFound`, `WrongBatchStatus` if the batch is unknown or not Closed
    /// - `UnsupportedPair` if the pair has no liquidity provider configured
    /// - `InsufficientLocked` if the reserve cannot cover a fill
    /// - backend errors from reveal or comparison
    pub fn execute(
        &self,
        state: SettlementState<'_, B::Ciphertext>,
        batch_id: BatchId,
        now: DateTime<Utc>,
    ) -> Result<SettlementReport> {
        let SettlementState {
            orders,
            scheduler,
            escrow,
            reserves,
        } = state;

        let batch = scheduler.batch(batch_id)?;
        if batch.status != BatchStatus::Closed {
            return Err(CiphermatchError::WrongBatchStatus {
                batch_id,
                expected: BatchStatus::Closed,
                actual: batch.status,
            });
        }
        let (sealed_value, has_volume) = match &batch.clearing {
            Clearing::Sealed { value, has_volume } => (value.clone(), has_volume.clone()),
            _ => {
                return Err(CiphermatchError::Internal(format!(
                    "{batch_id} is closed without a sealed clearing value"
                )));
            }
        };
        let pair = batch.pair.clone();
        let mut members = batch.members.clone();
        let provider = liquidity_provider(self.config, &pair)
            .ok_or_else(|| CiphermatchError::UnsupportedPair(pair.clone()))?;

        // Arrival order: submit time, then id.
        members.sort_by_key(|id| orders.get(id).map(Order::arrival_key));

        let clearing = if self.fhe.reveal_bool(&has_volume)? {
            Some(self.fhe.reveal(&sealed_value)?)
        } else {
            let recovered = CiphermatchError::ZeroWeightBatch(batch_id);
            tracing::info!(
                batch = %batch_id,
                code = recovered.code(),
                "zero-volume batch: settling without fills"
            );
            None
        };
        let enc_clearing = clearing.map(|c| self.fhe.encrypt(c)).transpose()?;

        let mut events = Vec::with_capacity(members.len());
        for order_id in members {
            let order = orders
                .get(&order_id)
                .ok_or(CiphermatchError::OrderNotFound(order_id))?;
            if !order.is_pending() {
                return Err(CiphermatchError::Internal(format!(
                    "{order_id} in {batch_id} is {}, expected PENDING",
                    order.status
                )));
            }
            let trader = order.trader;
            let submit_time = order.submit_time;
            let escrowed = order.escrowed;

            let outcome = if order.is_expired_at(now) {
                escrow.release(trader, &pair.token_in, escrowed)?;
                tracing::warn!(order = %order_id, batch = %batch_id, "order expired at settlement");
                finish(orders, order_id, OrderStatus::Expired, now);
                SettlementOutcome::Expired { refunded: escrowed }
            } else if let (Some(c), Some(enc_c)) = (clearing, enc_clearing.as_ref()) {
                let output = settle_amount(escrowed, c)?;
                let fillable = self.fill_predicate(order, enc_c)?;
                tracing::debug!(order = %order_id, fillable, "fill predicate evaluated");
                if fillable {
                    reserves.pay_out(escrow, provider, &pair.token_out, output, trader)?;
                    escrow.transfer_out(trader, &pair.token_in, escrowed, provider)?;
                    finish(orders, order_id, OrderStatus::Filled, now);
                    SettlementOutcome::Filled {
                        amount_in: escrowed,
                        amount_out: output,
                    }
                } else {
                    carry(orders, scheduler, &pair, order_id, now)
                }
            } else {
                carry(orders, scheduler, &pair, order_id, now)
            };

            events.push(SettlementEvent {
                batch_id,
                order_id,
                trader,
                submit_time,
                outcome,
                settled_at: now,
            });
        }

        if let Some(enc_c) = &enc_clearing {
            self.fhe.release(enc_c);
        }

        let batch = scheduler.batch_mut(batch_id)?;
        batch.status = BatchStatus::Settled;
        batch.settled_at = Some(now);
        batch.clearing = clearing.map_or(Clearing::ZeroVolume, Clearing::Revealed);

        let report = SettlementReport {
            batch_id,
            clearing_value: clearing,
            events,
            already_settled: false,
        };
        tracing::info!(
            batch = %batch_id,
            pair = %pair,
            filled = report.filled(),
            carried_over = report.carried_over(),
            expired = report.expired(),
            "batch settled"
        );
        Ok(report)
    }

    /// Reveal only whether `amount_in × clearing ≥ min_amount_out`. The
    /// intermediate ciphertexts are released before returning.
    fn fill_predicate(
        &self,
        order: &Order<B::Ciphertext>,
        clearing: &B::Ciphertext,
    ) -> Result<bool> {
        let reaches = self.fhe.mul(&order.intent.amount_in, clearing)?;
        let predicate = self.fhe.ge(&reaches, &order.intent.min_amount_out);
        self.fhe.release(&reaches);
        let predicate = predicate?;
        let fillable = self.fhe.reveal_bool(&predicate);
        self.fhe.release(&predicate);
        fillable
    }
}

/// `escrowed × clearing`, rounded toward zero to the amount precision.
///
/// # Errors
/// Returns `Overflow` if the product does not fit.
pub fn settle_amount(escrowed: Decimal, clearing: Decimal) -> Result<Decimal> {
    escrowed
        .checked_mul(clearing)
        .map(|v| v.round_dp_with_strategy(constants::AMOUNT_PRECISION, RoundingStrategy::ToZero))
        .ok_or_else(|| CiphermatchError::Overflow {
            context: format!("settlement amount {escrowed} x {clearing}"),
        })
}

fn finish<C>(
    orders: &mut BTreeMap<OrderId, Order<C>>,
    order_id: OrderId,
    status: OrderStatus,
    now: DateTime<Utc>,
) {
    if let Some(order) = orders.get_mut(&order_id) {
        order.status = status;
        order.batch_id = None;
        order.updated_at = now;
    }
}

/// Re-admit a still-pending order into the pair's next Open batch at its
/// original arrival position.
fn carry<C>(
    orders: &mut BTreeMap<OrderId, Order<C>>,
    scheduler: &mut BatchScheduler<C>,
    pair: &TokenPair,
    order_id: OrderId,
    now: DateTime<Utc>,
) -> SettlementOutcome {
    let key = orders
        .get(&order_id)
        .map_or((now, order_id), Order::arrival_key);
    let next_batch = {
        let table = &*orders;
        scheduler.admit(pair, order_id, key, now, |m| {
            table.get(&m).map(Order::arrival_key)
        })
    };
    if let Some(order) = orders.get_mut(&order_id) {
        order.batch_id = Some(next_batch);
        order.carry_count += 1;
        order.updated_at = now;
    }
    tracing::debug!(order = %order_id, next = %next_batch, "order carried over");
    SettlementOutcome::CarriedOver { next_batch }
}

/// Provider of the pair's reserve, for callers that need it outside a settle.
#[must_use]
pub fn liquidity_provider(config: &EngineConfig, pair: &TokenPair) -> Option<TraderId> {
    config.pair_config(pair).map(|pc| pc.liquidity_provider)
}
