//! Cancellation handler.
//!
//! A trader may withdraw a Pending order while its batch is still Open. The
//! full escrow is released and the order leaves the batch. Once the batch
//! closes, membership is sealed and cancellation fails with a state error.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ciphermatch_ingress::{BatchScheduler, EscrowLedger};
use ciphermatch_types::{
    CiphermatchError, Order, OrderId, OrderStatus, Result, TraderId,
};
use rust_decimal::Decimal;

/// Cancel `order_id` on behalf of `caller`. Returns the refunded amount.
///
/// # Errors
/// - `OrderNotFound` for an unknown order
/// - `NotOrderOwner` if `caller` is not the order's trader
/// - `WrongOrderStatus` if the order is no longer Pending
/// - `WrongBatchStatus` if its batch has already closed
pub fn cancel_order<C>(
    orders: &mut BTreeMap<OrderId, Order<C>>,
    scheduler: &mut BatchScheduler<C>,
    escrow: &mut EscrowLedger,
    caller: TraderId,
    order_id: OrderId,
    now: DateTime<Utc>,
) -> Result<Decimal> {
    let order = orders
        .get_mut(&order_id)
        .ok_or(CiphermatchError::OrderNotFound(order_id))?;
    if order.trader != caller {
        return Err(CiphermatchError::NotOrderOwner { caller, order_id });
    }
    if !order.is_pending() {
        return Err(CiphermatchError::WrongOrderStatus {
            order_id,
            expected: OrderStatus::Pending,
            actual: order.status,
        });
    }
    let batch_id = order.batch_id.ok_or_else(|| {
        CiphermatchError::Internal(format!("pending {order_id} has no batch"))
    })?;

    scheduler.withdraw(batch_id, order_id)?;
    escrow.release(order.trader, &order.pair.token_in, order.escrowed)?;

    order.status = OrderStatus::Cancelled;
    order.batch_id = None;
    order.updated_at = now;
    tracing::debug!(order = %order_id, batch = %batch_id, "order cancelled");
    Ok(order.escrowed)
}
