//! # Batch Cycle Integration Tests
//!
//! Full submit → close → settle cycles through the public engine API, on
//! the sealed-handle backend with custody held on an in-memory token ledger.
//!
//! | Property                | Checked by                                   |
//! |-------------------------|----------------------------------------------|
//! | Uniform clearing        | `scenario_a_fill_no_fill_split`              |
//! | Expiry at settlement    | `scenario_b_expiry_overrides_fillability`    |
//! | Zero-volume batches     | `scenario_c_zero_volume_never_reveals`       |
//! | Idempotent settlement   | `settle_twice_pays_once`                     |
//! | Single membership       | `carried_order_lives_in_one_batch`           |
//! | Escrow conservation     | `verify_conservation` after every step       |

mod common;

use ciphermatch_fhe::FheBackend;
use ciphermatch_types::*;
use common::{Harness, dec, pair};
use rust_decimal::Decimal;

// ═══════════════════════════════════════════════════════════════════
// Scenario A: one price, one fill, one carry
// ═══════════════════════════════════════════════════════════════════

#[test]
fn scenario_a_fill_no_fill_split() {
    let mut h = Harness::new(5_000);
    let (t1, o1) = h.submit(100, 95, 3600);
    let (t2, o2) = h.submit(300, 588, 3600);
    h.engine.verify_conservation().unwrap();
    // One well-formed bit per submitted intent.
    let admitted = h.fhe.reveal_count();
    assert_eq!(admitted, 2);

    h.tick(30);
    let batch = h.engine.close_batch(&pair()).unwrap();
    assert_eq!(h.fhe.reveal_count(), admitted, "closing reveals nothing");

    let report = h.engine.settle(batch).unwrap();
    assert!(!report.already_settled);
    assert_eq!(report.clearing_value, Some(Decimal::new(17075, 4)));
    // Volume flag, clearing value, one predicate per member.
    assert_eq!(h.fhe.reveal_count() - admitted, 4);

    assert_eq!(h.status(o1), OrderStatus::Filled);
    assert_eq!(h.status(o2), OrderStatus::Pending);
    assert_eq!(h.balance(t1, "WETH"), Decimal::new(17075, 2));
    assert!(h.balance(t1, "USDC").is_zero());
    assert!(h.balance(t2, "WETH").is_zero());
    assert_eq!(h.engine.locked(t2, "USDC"), dec(300));

    assert_eq!(h.balance(h.provider, "USDC"), dec(100));
    assert_eq!(
        h.engine.reserve(h.provider, "WETH"),
        dec(5_000) - Decimal::new(17075, 2)
    );
    h.engine.verify_conservation().unwrap();

    let audit = h.engine.batch_audit(batch).unwrap();
    assert_eq!(audit.status, BatchStatus::Settled);
    assert_eq!(audit.clearing_value, Some(Decimal::new(17075, 4)));
    assert_eq!(audit.events.len(), 2);
    assert_eq!(audit.membership_root.as_deref().map(str::len), Some(64));
}

// ═══════════════════════════════════════════════════════════════════
// Scenario B: a deadline passed before settlement wins over the price
// ═══════════════════════════════════════════════════════════════════

#[test]
fn scenario_b_expiry_overrides_fillability() {
    let mut h = Harness::new(5_000);
    let (trader, order) = h.submit(100, 95, 40);

    h.tick(30);
    let batch = h.engine.close_batch(&pair()).unwrap();
    // The deadline passes between close and settle.
    h.tick(15);
    let report = h.engine.settle(batch).unwrap();

    assert_eq!(report.expired(), 1);
    assert_eq!(report.filled(), 0);
    assert_eq!(
        report.events[0].outcome,
        SettlementOutcome::Expired { refunded: dec(100) }
    );
    assert_eq!(h.status(order), OrderStatus::Expired);
    assert_eq!(h.balance(trader, "USDC"), dec(100));
    assert!(h.balance(trader, "WETH").is_zero());
    assert_eq!(h.engine.reserve(h.provider, "WETH"), dec(5_000));
    h.engine.verify_conservation().unwrap();
}

// ═══════════════════════════════════════════════════════════════════
// Scenario C: the only member cancelled before close
// ═══════════════════════════════════════════════════════════════════

#[test]
fn scenario_c_zero_volume_never_reveals() {
    let mut h = Harness::new(5_000);
    let (trader, order) = h.submit(100, 95, 3600);
    h.engine.cancel_order(trader, order).unwrap();
    assert_eq!(h.balance(trader, "USDC"), dec(100));

    h.tick(30);
    let batch = h.engine.close_batch(&pair()).unwrap();
    let before = h.fhe.reveal_count();
    let report = h.engine.settle(batch).unwrap();

    assert!(report.clearing_value.is_none());
    assert!(report.events.is_empty());
    assert_eq!(h.fhe.reveal_count() - before, 1, "only the volume flag");
    let audit = h.engine.batch_audit(batch).unwrap();
    assert_eq!(audit.status, BatchStatus::Settled);
    assert!(audit.clearing_value.is_none());
    assert_eq!(audit.member_count, 0);
    h.engine.verify_conservation().unwrap();
}

// ═══════════════════════════════════════════════════════════════════
// Idempotency and membership
// ═══════════════════════════════════════════════════════════════════

#[test]
fn settle_twice_pays_once() {
    let mut h = Harness::new(5_000);
    let (trader, _) = h.submit(100, 95, 3600);
    h.tick(30);
    let batch = h.engine.close_batch(&pair()).unwrap();

    let first = h.engine.settle(batch).unwrap();
    let paid = h.balance(trader, "WETH");
    let reveals = h.fhe.reveal_count();

    let second = h.engine.settle(batch).unwrap();
    assert!(second.already_settled);
    assert_eq!(second.events, first.events);
    assert_eq!(second.clearing_value, first.clearing_value);
    assert_eq!(h.balance(trader, "WETH"), paid);
    assert_eq!(h.fhe.reveal_count(), reveals, "a replay decrypts nothing");
    h.engine.verify_conservation().unwrap();
}

#[test]
fn carried_order_lives_in_one_batch() {
    let mut h = Harness::new(5_000);
    h.submit(100, 95, 3600);
    let (_, stubborn) = h.submit(300, 588, 3600);
    h.tick(30);
    let first = h.engine.close_batch(&pair()).unwrap();
    h.engine.settle(first).unwrap();

    let open = h.engine.batch_status(&pair()).unwrap();
    assert_ne!(open.batch_id, first);
    assert_eq!(open.status, BatchStatus::Open);
    assert_eq!(open.member_count, 1);
    assert_eq!(h.status(stubborn), OrderStatus::Pending);

    // A newcomer lines up behind the carried order.
    let (_, newcomer) = h.submit(100, 95, 3600);
    h.tick(30);
    let second = h.engine.close_batch(&pair()).unwrap();
    assert_eq!(second, open.batch_id);
    let report = h.engine.settle(second).unwrap();
    let settled: Vec<OrderId> = report.events.iter().map(|e| e.order_id).collect();
    assert_eq!(settled, vec![stubborn, newcomer]);
    h.engine.verify_conservation().unwrap();
}

#[test]
fn carried_order_expires_at_its_deadline() {
    let mut h = Harness::new(5_000);
    h.submit(100, 95, 3600);
    let (trader, stubborn) = h.submit(300, 588, 90);
    h.tick(30);
    let first = h.engine.close_batch(&pair()).unwrap();
    h.engine.settle(first).unwrap();

    h.tick(60);
    let second = h.engine.close_batch(&pair()).unwrap();
    let report = h.engine.settle(second).unwrap();
    assert_eq!(report.expired(), 1);
    assert_eq!(h.status(stubborn), OrderStatus::Expired);
    assert_eq!(h.balance(trader, "USDC"), dec(300));
    h.engine.verify_conservation().unwrap();
}

#[test]
fn finished_orders_leave_nothing_in_the_vault() {
    let mut h = Harness::new(5_000);
    assert!(h.fhe.is_empty());
    let (trader, cancelled) = h.submit(40, 38, 3600);
    h.engine.cancel_order(trader, cancelled).unwrap();
    h.submit(100, 95, 3600);
    let (_, carried) = h.submit(300, 588, 3600);

    h.tick(30);
    let batch = h.engine.close_batch(&pair()).unwrap();
    h.engine.settle(batch).unwrap();
    // Only the carried order's intent is still live.
    assert_eq!(h.status(carried), OrderStatus::Pending);
    assert_eq!(h.fhe.len(), 3);

    h.tick(3600);
    let batch = h.engine.close_batch(&pair()).unwrap();
    h.engine.settle(batch).unwrap();
    assert_eq!(h.status(carried), OrderStatus::Expired);
    assert!(h.fhe.is_empty());
}

// ═══════════════════════════════════════════════════════════════════
// Queries
// ═══════════════════════════════════════════════════════════════════

#[test]
fn order_view_carries_public_fields_only() {
    let mut h = Harness::new(5_000);
    let trader = h.trader(100);
    let req = h.request(trader, 100, 95, 3600);
    let deadline = req.deadline;
    let id = h.engine.submit_order(req).unwrap();

    let view = h.engine.order_status(id).unwrap();
    assert_eq!(view.order_id, id);
    assert_eq!(view.trader, trader);
    assert_eq!(view.token_in, "USDC");
    assert_eq!(view.token_out, "WETH");
    assert_eq!(view.deadline, deadline);
    assert_eq!(view.status, OrderStatus::Pending);
}

#[test]
fn batch_status_before_any_order() {
    let h = Harness::new(5_000);
    assert!(matches!(
        h.engine.batch_status(&pair()),
        Err(CiphermatchError::NoOpenBatch(_))
    ));
    assert!(matches!(
        h.engine.batch_status(&TokenPair::new("WETH", "USDC")),
        Err(CiphermatchError::UnsupportedPair(_))
    ));
}

#[test]
fn full_batch_closes_before_window() {
    let mut h = Harness::new(50_000);
    for _ in 0..64 {
        let trader = h.trader(10);
        let req = h.request(trader, 10, 5, 3600);
        h.engine.submit_order(req).unwrap();
    }
    let batch = h.engine.close_batch(&pair()).unwrap();
    let report = h.engine.settle(batch).unwrap();
    assert_eq!(report.filled(), 64);
    h.engine.verify_conservation().unwrap();
}
