//! The CipherMatch engine: a sequential, transactional state machine.
//!
//! Every mutating entry point runs against a clone of the engine state. The
//! clone is swapped in only after the operation succeeded, escrow balances
//! reconcile with pending orders and reserves, and every inbound custody
//! movement was pulled from the token ledger. Any failure drops the clone,
//! so a rejected call leaves nothing behind.
//!
//! ```text
//! clone state ─▶ operate ─▶ verify escrow ─▶ pull inflows ─▶ commit ─▶ flush outflows
//!                    │             │               │
//!                    └─────────────┴───── error ───┴──▶ discard clone
//! ```
//!
//! Outbound movements (refunds, fills) are paid from custody after commit.
//! Custody is checked against the ledger once they are flushed. Ciphertexts
//! the committed state no longer needs are released to the backend last; a
//! discarded clone still points at them, so they must outlive a rollback.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ciphermatch_clearing::compute_clearing_value;
use ciphermatch_fhe::FheBackend;
use ciphermatch_ingress::{
    BatchScheduler, EscrowLedger, LiquidityReserves, OrderIntake, PauseSwitch, TokenLedger,
};
use ciphermatch_settlement::{
    EscrowConservation, IdempotencyGuard, SettlementExecutor, SettlementState,
};
use ciphermatch_types::{
    Batch, BatchAudit, BatchId, BatchStatus, BatchView, CiphermatchError, Clearing, Clock,
    CustodyMovement, EngineConfig, Order, OrderId, OrderView, PairConfig, Result,
    SettlementEvent, SettlementOutcome, SettlementReport, SubmitOrder, SystemClock, TokenPair,
    TraderId, constants,
};
use rust_decimal::Decimal;

use crate::cancellation;

/// Everything a transaction may change. Cloned per call.
#[derive(Debug, Clone)]
struct EngineState<C> {
    orders: BTreeMap<OrderId, Order<C>>,
    scheduler: BatchScheduler<C>,
    escrow: EscrowLedger,
    reserves: LiquidityReserves,
    pause: PauseSwitch,
    idempotency: IdempotencyGuard,
    /// Settlement receipts, retained per batch for audit and idempotent replies.
    settlement_events: BTreeMap<BatchId, Vec<SettlementEvent>>,
    last_order_id: OrderId,
    /// Ciphertexts to release once this state commits.
    retired: Vec<C>,
}

impl<C: Clone> EngineState<C> {
    fn retire_intent(&mut self, order_id: OrderId) {
        if let Some(order) = self.orders.get(&order_id) {
            let intent = &order.intent;
            self.retired.extend([
                intent.amount_in.clone(),
                intent.min_amount_out.clone(),
                intent.max_slippage.clone(),
            ]);
        }
    }
}

/// Read-only context handed to a transaction body.
struct Env<'a, B> {
    fhe: &'a B,
    config: &'a EngineConfig,
    intake: &'a OrderIntake,
    now: DateTime<Utc>,
}

/// Confidential batch-auction engine.
///
/// Generic over the encrypted-arithmetic backend `B`, the external token
/// ledger `L` custody is held on, and the clock `K`.
pub struct Engine<B: FheBackend, L: TokenLedger, K: Clock = SystemClock> {
    config: EngineConfig,
    fhe: B,
    ledger: L,
    clock: K,
    intake: OrderIntake,
    state: EngineState<B::Ciphertext>,
}

impl<B: FheBackend, L: TokenLedger, K: Clock> Engine<B, L, K> {
    /// Build an engine from a validated config.
    ///
    /// # Errors
    /// Returns `Configuration` if the config does not validate.
    pub fn new(config: EngineConfig, fhe: B, ledger: L, clock: K) -> Result<Self> {
        config.validate()?;
        let state = EngineState {
            orders: BTreeMap::new(),
            scheduler: BatchScheduler::new(&config.batch)?,
            escrow: EscrowLedger::new(),
            reserves: LiquidityReserves::new(),
            pause: PauseSwitch::new(config.risk_controller),
            idempotency: IdempotencyGuard::new(config.idempotency_cache_size),
            settlement_events: BTreeMap::new(),
            last_order_id: OrderId(0),
            retired: Vec::new(),
        };
        tracing::info!(
            engine = constants::ENGINE_NAME,
            version = constants::VERSION,
            pairs = config.pairs.len(),
            window_ms = u64::try_from(config.batch.window.as_millis()).unwrap_or(u64::MAX),
            max_batch_size = config.batch.max_batch_size,
            "engine started"
        );
        Ok(Self {
            intake: OrderIntake::from_config(&config),
            config,
            fhe,
            ledger,
            clock,
            state,
        })
    }

    // =====================================================================
    // Trader operations
    // =====================================================================

    /// Accept an encrypted order, lock its escrow, and admit it to the
    /// pair's Open batch.
    ///
    /// # Errors
    /// - `EnginePaused` while paused
    /// - validation errors from intake
    /// - `InsufficientBalance` if the trader's balance or allowance cannot
    ///   cover the escrow
    pub fn submit_order(&mut self, req: SubmitOrder<B::Ciphertext>) -> Result<OrderId> {
        self.state.pause.ensure_running()?;
        self.transact("submit_order", move |state, env| {
            let pair = env.intake.validate(&req, env.now)?;
            env.intake.verify_intent(env.fhe, &req)?;
            let id = state.last_order_id.next();
            let mut order = env.intake.admit(id, pair, req, env.now);
            state
                .escrow
                .lock(order.trader, &order.pair.token_in, order.escrowed)?;

            let table = &state.orders;
            let batch = state.scheduler.admit(
                &order.pair,
                id,
                order.arrival_key(),
                env.now,
                |m| table.get(&m).map(Order::arrival_key),
            );
            order.batch_id = Some(batch);
            tracing::debug!(order = %id, batch = %batch, pair = %order.pair, "order admitted");
            state.orders.insert(id, order);
            state.last_order_id = id;
            Ok(id)
        })
    }

    /// Cancel a Pending order whose batch is still Open and refund its escrow.
    ///
    /// # Errors
    /// See [`cancellation::cancel_order`].
    pub fn cancel_order(&mut self, caller: TraderId, order_id: OrderId) -> Result<Decimal> {
        self.transact("cancel_order", move |state, env| {
            let refunded = cancellation::cancel_order(
                &mut state.orders,
                &mut state.scheduler,
                &mut state.escrow,
                caller,
                order_id,
                env.now,
            )?;
            state.retire_intent(order_id);
            Ok(refunded)
        })
    }

    // =====================================================================
    // Batch lifecycle
    // =====================================================================

    /// Close the pair's Open batch and seal its encrypted clearing value.
    ///
    /// Nothing is revealed here.
    ///
    /// # Errors
    /// - `UnsupportedPair`, `NoOpenBatch`, `BatchNotReady`
    /// - backend errors from price discovery
    pub fn close_batch(&mut self, pair: &TokenPair) -> Result<BatchId> {
        if !self.intake.supports(pair) {
            return Err(CiphermatchError::UnsupportedPair(pair.clone()));
        }
        self.transact("close_batch", |state, env| {
            let id = state.scheduler.close(pair, env.now)?;
            let batch = state.scheduler.batch(id)?;
            let members = batch
                .members
                .iter()
                .map(|m| state.orders.get(m).ok_or(CiphermatchError::OrderNotFound(*m)))
                .collect::<Result<Vec<_>>>()?;
            let member_count = members.len();
            let sealed = compute_clearing_value(env.fhe, members, env.now)?;
            state.scheduler.batch_mut(id)?.clearing = sealed.into();
            tracing::info!(batch = %id, pair = %pair, members = member_count, "batch closed");
            Ok(id)
        })
    }

    /// Settle a Closed batch. Settling an already-settled batch is a
    /// successful no-op that returns the recorded events.
    ///
    /// The pause check runs first, so while paused even a replay of an
    /// already-settled batch fails with `EnginePaused`. The recorded
    /// outcome stays readable through [`Engine::batch_audit`].
    ///
    /// # Errors
    /// - `EnginePaused` while paused, replays included
    /// - `BatchNotFound`, `WrongBatchStatus` for unknown or still-Open batches
    /// - `InsufficientLocked` if the pair's reserve cannot cover the fills;
    ///   the whole settlement is rolled back
    pub fn settle(&mut self, batch_id: BatchId) -> Result<SettlementReport> {
        self.state.pause.ensure_running()?;
        let batch = self.state.scheduler.batch(batch_id)?;
        if batch.status == BatchStatus::Settled || self.state.idempotency.is_settled(batch_id) {
            tracing::debug!(batch = %batch_id, "batch already settled");
            return Ok(SettlementReport {
                batch_id,
                clearing_value: batch.clearing.revealed(),
                events: self
                    .state
                    .settlement_events
                    .get(&batch_id)
                    .cloned()
                    .unwrap_or_default(),
                already_settled: true,
            });
        }

        self.transact("settle", |state, env| {
            let sealed = match &state.scheduler.batch(batch_id)?.clearing {
                Clearing::Sealed { value, has_volume } => vec![value.clone(), has_volume.clone()],
                _ => Vec::new(),
            };
            let settlement = SettlementState {
                orders: &mut state.orders,
                scheduler: &mut state.scheduler,
                escrow: &mut state.escrow,
                reserves: &mut state.reserves,
            };
            let report =
                SettlementExecutor::new(env.fhe, env.config).execute(settlement, batch_id, env.now)?;
            state.retired.extend(sealed);
            for event in &report.events {
                if !matches!(event.outcome, SettlementOutcome::CarriedOver { .. }) {
                    state.retire_intent(event.order_id);
                }
            }
            state.idempotency.mark_settled(batch_id);
            state
                .settlement_events
                .insert(batch_id, report.events.clone());
            Ok(report)
        })
    }

    /// Close and settle every pair whose Open batch has members and is ready.
    ///
    /// Each close and settle is its own transaction. A pair that fails is
    /// logged and left as it was, and the sweep moves on to the next pair.
    /// Does nothing while paused.
    pub fn tick(&mut self) -> Vec<SettlementReport> {
        if self.state.pause.is_paused() {
            return Vec::new();
        }
        let now = self.clock.now();
        let ready: Vec<TokenPair> = self
            .config
            .pairs
            .iter()
            .map(PairConfig::pair)
            .filter(|pair| {
                self.state.scheduler.open_batch(pair).is_some_and(|b| {
                    !b.members.is_empty() && self.state.scheduler.should_close(b, now)
                })
            })
            .collect();

        let mut reports = Vec::with_capacity(ready.len());
        for pair in ready {
            match self.close_batch(&pair).and_then(|id| self.settle(id)) {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!(pair = %pair, code = e.code(), error = %e, "tick skipped pair");
                }
            }
        }
        reports
    }

    // =====================================================================
    // Queries
    // =====================================================================

    /// Public status of an order. Never exposes encrypted fields.
    ///
    /// # Errors
    /// Returns `OrderNotFound` for an unknown id.
    pub fn order_status(&self, order_id: OrderId) -> Result<OrderView> {
        self.state
            .orders
            .get(&order_id)
            .map(Order::view)
            .ok_or(CiphermatchError::OrderNotFound(order_id))
    }

    /// The pair's Open batch, or its most recent batch if none is open.
    ///
    /// # Errors
    /// `UnsupportedPair` for an unconfigured pair, `NoOpenBatch` if the pair
    /// never had a batch.
    pub fn batch_status(&self, pair: &TokenPair) -> Result<BatchView> {
        if !self.intake.supports(pair) {
            return Err(CiphermatchError::UnsupportedPair(pair.clone()));
        }
        self.state
            .scheduler
            .open_batch(pair)
            .or_else(|| self.state.scheduler.latest_batch(pair))
            .map(Batch::view)
            .ok_or_else(|| CiphermatchError::NoOpenBatch(pair.clone()))
    }

    /// Audit view of a batch: membership commitment, revealed clearing
    /// value, and settlement receipts.
    ///
    /// # Errors
    /// Returns `BatchNotFound` for an unknown id.
    pub fn batch_audit(&self, batch_id: BatchId) -> Result<BatchAudit> {
        let batch = self.state.scheduler.batch(batch_id)?;
        Ok(BatchAudit {
            batch_id,
            pair: batch.pair.clone(),
            status: batch.status,
            member_count: batch.members.len(),
            membership_root: batch.membership_root.map(hex::encode),
            clearing_value: batch.clearing.revealed(),
            events: self
                .state
                .settlement_events
                .get(&batch_id)
                .cloned()
                .unwrap_or_default(),
        })
    }

    #[must_use]
    pub fn locked(&self, owner: TraderId, token: &str) -> Decimal {
        self.state.escrow.locked(owner, token)
    }

    #[must_use]
    pub fn reserve(&self, provider: TraderId, token: &str) -> Decimal {
        self.state.reserves.reserve(provider, token)
    }

    // =====================================================================
    // Liquidity
    // =====================================================================

    /// Lock `amount` of the pair's `token_out` as reserve. Only the pair's
    /// configured liquidity provider may call this.
    ///
    /// # Errors
    /// - `UnsupportedPair`, `NotLiquidityProvider`
    /// - `InsufficientBalance` if the ledger pull fails
    pub fn provide_liquidity(
        &mut self,
        caller: TraderId,
        pair: &TokenPair,
        amount: Decimal,
    ) -> Result<()> {
        self.ensure_provider(caller, pair)?;
        self.transact("provide_liquidity", |state, _| {
            state
                .reserves
                .provide(&mut state.escrow, caller, &pair.token_out, amount)
        })?;
        tracing::info!(pair = %pair, %amount, "liquidity provided");
        Ok(())
    }

    /// Return `amount` of reserve to the provider.
    ///
    /// # Errors
    /// - `UnsupportedPair`, `NotLiquidityProvider`
    /// - `InsufficientLocked` if the reserve is smaller than `amount`
    pub fn withdraw_liquidity(
        &mut self,
        caller: TraderId,
        pair: &TokenPair,
        amount: Decimal,
    ) -> Result<()> {
        self.ensure_provider(caller, pair)?;
        self.transact("withdraw_liquidity", |state, _| {
            state
                .reserves
                .withdraw(&mut state.escrow, caller, &pair.token_out, amount)
        })?;
        tracing::info!(pair = %pair, %amount, "liquidity withdrawn");
        Ok(())
    }

    fn ensure_provider(&self, caller: TraderId, pair: &TokenPair) -> Result<()> {
        let pc = self
            .config
            .pair_config(pair)
            .ok_or_else(|| CiphermatchError::UnsupportedPair(pair.clone()))?;
        if pc.liquidity_provider != caller {
            return Err(CiphermatchError::NotLiquidityProvider {
                caller,
                pair: pair.clone(),
            });
        }
        Ok(())
    }

    // =====================================================================
    // Risk control
    // =====================================================================

    /// # Errors
    /// Returns `NotRiskController` for any caller but the configured one.
    pub fn pause(&mut self, caller: TraderId) -> Result<()> {
        let now = self.clock.now();
        self.state.pause.pause(caller, now)?;
        tracing::warn!(%caller, "engine paused");
        Ok(())
    }

    /// # Errors
    /// Returns `NotRiskController` for any caller but the configured one.
    pub fn unpause(&mut self, caller: TraderId) -> Result<()> {
        let now = self.clock.now();
        self.state.pause.unpause(caller, now)?;
        tracing::info!(%caller, "engine unpaused");
        Ok(())
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.pause.is_paused()
    }

    // =====================================================================
    // Accessors
    // =====================================================================

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn backend(&self) -> &B {
        &self.fhe
    }

    #[must_use]
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Direct ledger access, for minting and approvals outside the engine.
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    #[must_use]
    pub fn clock(&self) -> &K {
        &self.clock
    }

    /// Check both escrow invariants against the committed state.
    ///
    /// # Errors
    /// Returns `EscrowInvariantViolation` naming the first mismatch.
    pub fn verify_conservation(&self) -> Result<()> {
        EscrowConservation::verify_locked(
            &self.state.escrow,
            self.state.orders.values(),
            &self.state.reserves,
        )?;
        EscrowConservation::verify_custody(
            &self.ledger,
            self.config.custody_account,
            &self.state.escrow,
        )
    }

    // =====================================================================
    // Transactions
    // =====================================================================

    fn transact<T>(
        &mut self,
        op: &'static str,
        body: impl FnOnce(&mut EngineState<B::Ciphertext>, &Env<'_, B>) -> Result<T>,
    ) -> Result<T> {
        let env = Env {
            fhe: &self.fhe,
            config: &self.config,
            intake: &self.intake,
            now: self.clock.now(),
        };
        let mut work = self.state.clone();

        let value = body(&mut work, &env)
            .and_then(|value| {
                EscrowConservation::verify_locked(&work.escrow, work.orders.values(), &work.reserves)
                    .map(|()| value)
            })
            .inspect_err(|e| tracing::debug!(op, code = e.code(), error = %e, "rolled back"))?;

        let (inflows, outflows): (Vec<CustodyMovement>, Vec<CustodyMovement>) = work
            .escrow
            .take_outbox()
            .into_iter()
            .partition(|m| m.reason.is_inflow());
        self.pull_inflows(op, &inflows)?;

        self.state = work;
        self.flush_outflows(op, outflows);
        for ct in std::mem::take(&mut self.state.retired) {
            self.fhe.release(&ct);
        }
        if EscrowConservation::verify_custody(
            &self.ledger,
            self.config.custody_account,
            &self.state.escrow,
        )
        .is_err()
        {
            tracing::error!(op, "custody diverged from escrow after commit");
        }
        Ok(value)
    }

    /// Pull every inbound movement into custody, or none of them.
    fn pull_inflows(&mut self, op: &'static str, inflows: &[CustodyMovement]) -> Result<()> {
        let custody = self.config.custody_account;
        for (i, m) in inflows.iter().enumerate() {
            if let Err(e) = self
                .ledger
                .transfer_from(custody, m.account, custody, &m.token, m.amount)
            {
                tracing::debug!(op, account = %m.account, token = %m.token, error = %e, "ledger pull failed");
                for pulled in &inflows[..i] {
                    if let Err(refund) =
                        self.ledger
                            .transfer(custody, pulled.account, &pulled.token, pulled.amount)
                    {
                        tracing::error!(
                            op,
                            account = %pulled.account,
                            token = %pulled.token,
                            amount = %pulled.amount,
                            error = %refund,
                            "could not return a pulled inflow"
                        );
                    }
                }
                return Err(e);
            }
        }
        Ok(())
    }

    /// Pay committed outbound movements from custody.
    fn flush_outflows(&mut self, op: &'static str, outflows: Vec<CustodyMovement>) {
        let custody = self.config.custody_account;
        for m in outflows {
            if let Err(e) = self.ledger.transfer(custody, m.account, &m.token, m.amount) {
                tracing::error!(
                    op,
                    account = %m.account,
                    token = %m.token,
                    amount = %m.amount,
                    reason = %m.reason,
                    error = %e,
                    "custody payout failed"
                );
            }
        }
    }
}
