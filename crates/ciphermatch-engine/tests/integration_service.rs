//! # Service Integration Tests
//!
//! The engine behind its tokio command queue: many client handles, one
//! sequential state machine.

mod common;

use ciphermatch_engine::EngineService;
use ciphermatch_fhe::FheBackend;
use ciphermatch_ingress::TokenLedger;
use ciphermatch_types::*;
use common::{Harness, dec, encrypted_request, pair};
use rust_decimal::Decimal;

#[tokio::test]
async fn concurrent_clients_share_one_engine() {
    let mut h = Harness::new(5_000);
    let custody = h.custody;
    let traders: Vec<TraderId> = (0..8).map(|_| h.trader(100)).collect();
    let Harness {
        engine,
        fhe,
        clock,
        controller,
        provider,
        ..
    } = h;
    let (handle, task) = EngineService::spawn(engine);

    let deadline = clock.now() + chrono::Duration::hours(1);
    let mut submits = Vec::new();
    for trader in &traders {
        let client = handle.clone();
        let req = encrypted_request(&fhe, *trader, 100, 95, deadline);
        submits.push(tokio::spawn(async move { client.submit_order(req).await }));
    }
    let mut ids = Vec::new();
    for submit in submits {
        ids.push(submit.await.unwrap().unwrap());
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), traders.len(), "every order gets its own id");

    let open = handle.batch_status(pair()).await.unwrap();
    assert_eq!(open.member_count, traders.len());

    // Too early: the window is still open.
    assert!(matches!(
        handle.close_batch(pair()).await,
        Err(CiphermatchError::BatchNotReady { .. })
    ));
    assert!(handle.tick().await.unwrap().is_empty());

    clock.advance(chrono::Duration::seconds(30));
    let reports = handle.tick().await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].filled(), traders.len());
    assert_eq!(reports[0].clearing_value, Some(Decimal::new(95, 2)));

    let audit = handle.batch_audit(reports[0].batch_id).await.unwrap();
    assert_eq!(audit.status, BatchStatus::Settled);
    for id in &ids {
        let view = handle.order_status(*id).await.unwrap();
        assert_eq!(view.status, OrderStatus::Filled);
    }

    handle.pause(controller).await.unwrap();
    assert!(handle.is_paused().await.unwrap());
    handle.unpause(controller).await.unwrap();
    handle
        .withdraw_liquidity(provider, pair(), dec(1_000))
        .await
        .unwrap();

    handle.shutdown().await.unwrap();
    let engine = task.await.unwrap();
    assert!(handle.is_paused().await.is_err(), "service is gone");

    engine.verify_conservation().unwrap();
    for trader in &traders {
        assert_eq!(engine.ledger().balance_of(*trader, "WETH"), dec(95));
    }
    assert_eq!(engine.ledger().balance_of(provider, "USDC"), dec(800));
    assert!(engine.ledger().balance_of(custody, "USDC").is_zero());
    // One intake check per order, volume flag, clearing value, predicates.
    assert_eq!(fhe.reveal_count(), 8 + 2 + 8);
}

#[tokio::test]
async fn errors_travel_back_to_the_caller() {
    let h = Harness::new(5_000);
    let (handle, task) = EngineService::spawn(h.engine);

    assert!(matches!(
        handle.order_status(OrderId(42)).await,
        Err(CiphermatchError::OrderNotFound(OrderId(42)))
    ));
    assert!(matches!(
        handle.cancel_order(TraderId::new(), OrderId(42)).await,
        Err(CiphermatchError::OrderNotFound(_))
    ));
    assert!(matches!(
        handle.settle(BatchId(1)).await,
        Err(CiphermatchError::BatchNotFound(_))
    ));
    assert!(matches!(
        handle.pause(TraderId::new()).await,
        Err(CiphermatchError::NotRiskController(_))
    ));
    assert!(matches!(
        handle
            .provide_liquidity(TraderId::new(), pair(), dec(1))
            .await,
        Err(CiphermatchError::NotLiquidityProvider { .. })
    ));

    // Dropping every handle stops the service as well.
    drop(handle);
    let engine = task.await.unwrap();
    assert!(!engine.is_paused());
}
