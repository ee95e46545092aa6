//! Async command service for the engine.
//!
//! The engine is a sequential state machine. `EngineService` owns it inside
//! a single tokio task and feeds it commands from a bounded `mpsc` queue;
//! each command carries a `oneshot` sender for its reply. `EngineHandle` is
//! the cloneable client side. Commands are applied strictly in queue order.

use ciphermatch_fhe::FheBackend;
use ciphermatch_ingress::TokenLedger;
use ciphermatch_types::{
    BatchAudit, BatchId, BatchView, CiphermatchError, Clock, OrderId, OrderView, Result,
    SettlementReport, SubmitOrder, TokenPair, TraderId,
};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::Engine;

/// Commands accepted by the engine service.
#[derive(Debug)]
pub enum EngineCommand<C> {
    SubmitOrder {
        order: SubmitOrder<C>,
        reply: oneshot::Sender<Result<OrderId>>,
    },
    CancelOrder {
        caller: TraderId,
        order_id: OrderId,
        reply: oneshot::Sender<Result<Decimal>>,
    },
    CloseBatch {
        pair: TokenPair,
        reply: oneshot::Sender<Result<BatchId>>,
    },
    Settle {
        batch_id: BatchId,
        reply: oneshot::Sender<Result<SettlementReport>>,
    },
    /// Close and settle every ready batch.
    Tick {
        reply: oneshot::Sender<Result<Vec<SettlementReport>>>,
    },
    OrderStatus {
        order_id: OrderId,
        reply: oneshot::Sender<Result<OrderView>>,
    },
    BatchStatus {
        pair: TokenPair,
        reply: oneshot::Sender<Result<BatchView>>,
    },
    BatchAudit {
        batch_id: BatchId,
        reply: oneshot::Sender<Result<BatchAudit>>,
    },
    ProvideLiquidity {
        caller: TraderId,
        pair: TokenPair,
        amount: Decimal,
        reply: oneshot::Sender<Result<()>>,
    },
    WithdrawLiquidity {
        caller: TraderId,
        pair: TokenPair,
        amount: Decimal,
        reply: oneshot::Sender<Result<()>>,
    },
    Pause {
        caller: TraderId,
        reply: oneshot::Sender<Result<()>>,
    },
    Unpause {
        caller: TraderId,
        reply: oneshot::Sender<Result<()>>,
    },
    IsPaused {
        reply: oneshot::Sender<bool>,
    },
    /// Stop the service after the commands already queued.
    Shutdown,
}

/// Owns an [`Engine`] and applies queued commands to it.
pub struct EngineService<B: FheBackend, L: TokenLedger, K: Clock> {
    engine: Engine<B, L, K>,
    commands: mpsc::Receiver<EngineCommand<B::Ciphertext>>,
}

impl<B, L, K> EngineService<B, L, K>
where
    B: FheBackend + 'static,
    L: TokenLedger + 'static,
    K: Clock + 'static,
{
    /// Start the service task. The queue depth comes from the engine config.
    ///
    /// The join handle yields the engine back once the service stops.
    pub fn spawn(
        engine: Engine<B, L, K>,
    ) -> (EngineHandle<B::Ciphertext>, JoinHandle<Engine<B, L, K>>) {
        let (tx, rx) = mpsc::channel(engine.config().command_queue_depth);
        let service = Self {
            engine,
            commands: rx,
        };
        let task = tokio::spawn(service.run());
        (EngineHandle { commands: tx }, task)
    }

    async fn run(mut self) -> Engine<B, L, K> {
        info!("engine service started");
        while let Some(command) = self.commands.recv().await {
            if !self.apply(command) {
                break;
            }
        }
        info!("engine service stopped");
        self.engine
    }

    /// Apply one command. Returns `false` on shutdown.
    fn apply(&mut self, command: EngineCommand<B::Ciphertext>) -> bool {
        let engine = &mut self.engine;
        // A dropped reply receiver only means the caller stopped waiting.
        match command {
            EngineCommand::SubmitOrder { order, reply } => {
                let _ = reply.send(engine.submit_order(order));
            }
            EngineCommand::CancelOrder {
                caller,
                order_id,
                reply,
            } => {
                let _ = reply.send(engine.cancel_order(caller, order_id));
            }
            EngineCommand::CloseBatch { pair, reply } => {
                let _ = reply.send(engine.close_batch(&pair));
            }
            EngineCommand::Settle { batch_id, reply } => {
                let _ = reply.send(engine.settle(batch_id));
            }
            EngineCommand::Tick { reply } => {
                let _ = reply.send(Ok(engine.tick()));
            }
            EngineCommand::OrderStatus { order_id, reply } => {
                let _ = reply.send(engine.order_status(order_id));
            }
            EngineCommand::BatchStatus { pair, reply } => {
                let _ = reply.send(engine.batch_status(&pair));
            }
            EngineCommand::BatchAudit { batch_id, reply } => {
                let _ = reply.send(engine.batch_audit(batch_id));
            }
            EngineCommand::ProvideLiquidity {
                caller,
                pair,
                amount,
                reply,
            } => {
                let _ = reply.send(engine.provide_liquidity(caller, &pair, amount));
            }
            EngineCommand::WithdrawLiquidity {
                caller,
                pair,
                amount,
                reply,
            } => {
                let _ = reply.send(engine.withdraw_liquidity(caller, &pair, amount));
            }
            EngineCommand::Pause { caller, reply } => {
                let _ = reply.send(engine.pause(caller));
            }
            EngineCommand::Unpause { caller, reply } => {
                let _ = reply.send(engine.unpause(caller));
            }
            EngineCommand::IsPaused { reply } => {
                let _ = reply.send(engine.is_paused());
            }
            EngineCommand::Shutdown => {
                debug!("shutdown requested");
                return false;
            }
        }
        true
    }
}

/// Cloneable async client for a running [`EngineService`].
#[derive(Debug)]
pub struct EngineHandle<C> {
    commands: mpsc::Sender<EngineCommand<C>>,
}

impl<C> Clone for EngineHandle<C> {
    fn clone(&self) -> Self {
        Self {
            commands: self.commands.clone(),
        }
    }
}

impl<C> EngineHandle<C> {
    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> EngineCommand<C>,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(command(tx))
            .await
            .map_err(|_| CiphermatchError::Internal("engine service is not running".into()))?;
        rx.await
            .map_err(|_| CiphermatchError::Internal("engine service dropped the request".into()))
    }

    pub async fn submit_order(&self, order: SubmitOrder<C>) -> Result<OrderId> {
        self.request(|reply| EngineCommand::SubmitOrder { order, reply })
            .await?
    }

    pub async fn cancel_order(&self, caller: TraderId, order_id: OrderId) -> Result<Decimal> {
        self.request(|reply| EngineCommand::CancelOrder {
            caller,
            order_id,
            reply,
        })
        .await?
    }

    pub async fn close_batch(&self, pair: TokenPair) -> Result<BatchId> {
        self.request(|reply| EngineCommand::CloseBatch { pair, reply })
            .await?
    }

    pub async fn settle(&self, batch_id: BatchId) -> Result<SettlementReport> {
        self.request(|reply| EngineCommand::Settle { batch_id, reply })
            .await?
    }

    pub async fn tick(&self) -> Result<Vec<SettlementReport>> {
        self.request(|reply| EngineCommand::Tick { reply }).await?
    }

    pub async fn order_status(&self, order_id: OrderId) -> Result<OrderView> {
        self.request(|reply| EngineCommand::OrderStatus { order_id, reply })
            .await?
    }

    pub async fn batch_status(&self, pair: TokenPair) -> Result<BatchView> {
        self.request(|reply| EngineCommand::BatchStatus { pair, reply })
            .await?
    }

    pub async fn batch_audit(&self, batch_id: BatchId) -> Result<BatchAudit> {
        self.request(|reply| EngineCommand::BatchAudit { batch_id, reply })
            .await?
    }

    pub async fn provide_liquidity(
        &self,
        caller: TraderId,
        pair: TokenPair,
        amount: Decimal,
    ) -> Result<()> {
        self.request(|reply| EngineCommand::ProvideLiquidity {
            caller,
            pair,
            amount,
            reply,
        })
        .await?
    }

    pub async fn withdraw_liquidity(
        &self,
        caller: TraderId,
        pair: TokenPair,
        amount: Decimal,
    ) -> Result<()> {
        self.request(|reply| EngineCommand::WithdrawLiquidity {
            caller,
            pair,
            amount,
            reply,
        })
        .await?
    }

    pub async fn pause(&self, caller: TraderId) -> Result<()> {
        self.request(|reply| EngineCommand::Pause { caller, reply })
            .await?
    }

    pub async fn unpause(&self, caller: TraderId) -> Result<()> {
        self.request(|reply| EngineCommand::Unpause { caller, reply })
            .await?
    }

    pub async fn is_paused(&self) -> Result<bool> {
        self.request(|reply| EngineCommand::IsPaused { reply }).await
    }

    /// Ask the service to stop once the commands ahead of this one ran.
    pub async fn shutdown(&self) -> Result<()> {
        self.commands
            .send(EngineCommand::Shutdown)
            .await
            .map_err(|_| CiphermatchError::Internal("engine service is not running".into()))
    }
}
