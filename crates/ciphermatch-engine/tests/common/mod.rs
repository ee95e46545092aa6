//! Shared harness for the engine integration suites.

#![allow(dead_code)]

use std::time::Duration;

use chrono::{DateTime, Utc};
use ciphermatch_engine::Engine;
use ciphermatch_fhe::{FheBackend, SealedBackend, SealedHandle};
use ciphermatch_ingress::{InMemoryTokenLedger, TokenLedger};
use ciphermatch_types::*;
use rust_decimal::Decimal;

pub type TestEngine = Engine<SealedBackend, InMemoryTokenLedger, ManualClock>;

pub fn dec(n: i64) -> Decimal {
    Decimal::new(n, 0)
}

pub fn pair() -> TokenPair {
    TokenPair::new("USDC", "WETH")
}

pub fn start_time() -> DateTime<Utc> {
    "2026-06-01T09:00:00Z".parse().unwrap()
}

pub struct Harness {
    pub engine: TestEngine,
    pub fhe: SealedBackend,
    pub clock: ManualClock,
    pub custody: TraderId,
    pub controller: TraderId,
    pub provider: TraderId,
}

impl Harness {
    /// One USDC→WETH pair, 30 s window, provider holding `reserve` WETH in
    /// the pool and 10 000 WETH more on the ledger.
    pub fn new(reserve: i64) -> Self {
        let custody = TraderId::new();
        let controller = TraderId::new();
        let provider = TraderId::new();
        let mut config = EngineConfig::new(
            custody,
            controller,
            vec![PairConfig {
                token_in: "USDC".into(),
                token_out: "WETH".into(),
                liquidity_provider: provider,
            }],
        );
        config.batch = BatchConfig {
            window: Duration::from_secs(30),
            max_batch_size: 64,
        };

        let fhe = SealedBackend::new(b"engine-tests");
        let clock = ManualClock::new(start_time());
        let mut ledger = InMemoryTokenLedger::new();
        ledger.mint(provider, "WETH", dec(reserve + 10_000));
        ledger.approve(provider, custody, "WETH", dec(reserve + 10_000));

        let mut engine = Engine::new(config, fhe.clone(), ledger, clock.clone()).unwrap();
        if reserve > 0 {
            engine
                .provide_liquidity(provider, &pair(), dec(reserve))
                .unwrap();
        }
        Self {
            engine,
            fhe,
            clock,
            custody,
            controller,
            provider,
        }
    }

    /// A trader with `amount` USDC on the ledger, approved for custody.
    pub fn trader(&mut self, amount: i64) -> TraderId {
        let trader = TraderId::new();
        let custody = self.custody;
        let ledger = self.engine.ledger_mut();
        ledger.mint(trader, "USDC", dec(amount));
        ledger.approve(trader, custody, "USDC", dec(amount));
        trader
    }

    pub fn request(
        &self,
        trader: TraderId,
        amount_in: i64,
        min_out: i64,
        ttl_secs: i64,
    ) -> SubmitOrder<SealedHandle> {
        let deadline = self.clock.now() + chrono::Duration::seconds(ttl_secs);
        encrypted_request(&self.fhe, trader, amount_in, min_out, deadline)
    }

    /// Fund a fresh trader and submit an order from them.
    pub fn submit(&mut self, amount_in: i64, min_out: i64, ttl_secs: i64) -> (TraderId, OrderId) {
        let trader = self.trader(amount_in);
        let req = self.request(trader, amount_in, min_out, ttl_secs);
        let id = self.engine.submit_order(req).unwrap();
        self.tick(1);
        (trader, id)
    }

    pub fn tick(&self, secs: i64) {
        self.clock.advance(chrono::Duration::seconds(secs));
    }

    pub fn balance(&self, owner: TraderId, token: &str) -> Decimal {
        self.engine.ledger().balance_of(owner, token)
    }

    pub fn status(&self, id: OrderId) -> OrderStatus {
        self.engine.order_status(id).unwrap().status
    }
}

pub fn encrypted_request(
    fhe: &SealedBackend,
    trader: TraderId,
    amount_in: i64,
    min_out: i64,
    deadline: DateTime<Utc>,
) -> SubmitOrder<SealedHandle> {
    SubmitOrder {
        trader,
        token_in: "USDC".into(),
        token_out: "WETH".into(),
        intent: EncryptedIntent {
            amount_in: fhe.encrypt(dec(amount_in)).unwrap(),
            min_amount_out: fhe.encrypt(dec(min_out)).unwrap(),
            max_slippage: fhe.encrypt(Decimal::new(5, 3)).unwrap(),
        },
        escrow_amount: dec(amount_in),
        deadline,
    }
}
