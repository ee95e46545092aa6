//! # ciphermatch-engine
//!
//! The CipherMatch engine binds the three planes into one transactional
//! state machine:
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌──────────────┐
//! │  Ingress   │──▶│  Clearing   │──▶│  Settlement  │
//! │ submit     │   │ encrypted   │   │ reveal once  │
//! │ escrow     │   │ uniform     │   │ fill / carry │
//! │ schedule   │   │ price       │   │ / expire     │
//! └────────────┘   └─────────────┘   └──────────────┘
//!        ▲                                   │
//!        └──────── carried-over orders ──────┘
//! ```
//!
//! - [`Engine`]: sequential entry points, each run on a working copy and
//!   committed only on success
//! - [`cancellation`]: trader-initiated withdrawal before close
//! - [`EngineService`] / [`EngineHandle`]: a tokio actor around the engine
//! - [`logging`]: `tracing-subscriber` setup
//!
//! Escrowed funds live on an external [`TokenLedger`](ciphermatch_ingress::TokenLedger)
//! in the configured custody account. The engine pulls inflows before it
//! commits and pays outflows right after.

pub mod cancellation;
pub mod engine;
pub mod logging;
pub mod service;

pub use engine::Engine;
pub use service::{EngineCommand, EngineHandle, EngineService};
