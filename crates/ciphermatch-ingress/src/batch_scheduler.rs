//! Batch scheduler: one Open batch per pair, closed on explicit trigger.
//!
//! The scheduler owns the batch table. It assigns orders to the Open batch
//! of their pair, decides when a batch may close, and seals the membership
//! at close with a SHA-256 commitment over the member ids. Closing is the
//! only path from intake into price discovery.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use ciphermatch_types::{
    Batch, BatchConfig, BatchId, BatchStatus, CiphermatchError, OrderId, Result, TokenPair,
    constants,
};
use sha2::{Digest, Sha256};

/// Arrival-order key of an order: submit time, then id.
pub type ArrivalKey = (DateTime<Utc>, OrderId);

/// Owns every batch ever created and tracks the Open one per pair.
#[derive(Debug, Clone)]
pub struct BatchScheduler<C> {
    batches: BTreeMap<BatchId, Batch<C>>,
    open: BTreeMap<TokenPair, BatchId>,
    last_batch_id: BatchId,
    window: chrono::Duration,
    max_batch_size: usize,
}

impl<C> BatchScheduler<C> {
    /// # Errors
    /// Returns `Configuration` if the window does not fit a chrono duration.
    pub fn new(config: &BatchConfig) -> Result<Self> {
        Ok(Self {
            batches: BTreeMap::new(),
            open: BTreeMap::new(),
            last_batch_id: BatchId(0),
            window: config.window_chrono()?,
            max_batch_size: config.max_batch_size,
        })
    }

    #[must_use]
    pub fn max_batch_size(&self) -> usize {
        self.max_batch_size
    }

    #[must_use]
    pub fn get(&self, id: BatchId) -> Option<&Batch<C>> {
        self.batches.get(&id)
    }

    /// # Errors
    /// Returns `BatchNotFound` for an unknown id.
    pub fn batch(&self, id: BatchId) -> Result<&Batch<C>> {
        self.batches
            .get(&id)
            .ok_or(CiphermatchError::BatchNotFound(id))
    }

    /// # Errors
    /// Returns `BatchNotFound` for an unknown id.
    pub fn batch_mut(&mut self, id: BatchId) -> Result<&mut Batch<C>> {
        self.batches
            .get_mut(&id)
            .ok_or(CiphermatchError::BatchNotFound(id))
    }

    /// The Open batch for `pair`, if any.
    #[must_use]
    pub fn open_batch(&self, pair: &TokenPair) -> Option<&Batch<C>> {
        self.open.get(pair).and_then(|id| self.batches.get(id))
    }

    /// The most recent batch for `pair`, in any status.
    #[must_use]
    pub fn latest_batch(&self, pair: &TokenPair) -> Option<&Batch<C>> {
        self.batches.values().rev().find(|b| &b.pair == pair)
    }

    pub fn batches(&self) -> impl Iterator<Item = &Batch<C>> {
        self.batches.values()
    }

    /// Id of the Open batch for `pair`, opening a fresh one at `now` if none.
    pub fn ensure_open(&mut self, pair: &TokenPair, now: DateTime<Utc>) -> BatchId {
        if let Some(id) = self.open.get(pair) {
            return *id;
        }
        let id = self.last_batch_id.next();
        self.last_batch_id = id;
        self.batches
            .insert(id, Batch::open(id, pair.clone(), now, self.window));
        self.open.insert(pair.clone(), id);
        tracing::debug!(batch = %id, pair = %pair, "batch opened");
        id
    }

    /// Add `order_id` to the Open batch of `pair`, keeping members sorted by
    /// arrival. `key_of` yields the arrival key of existing members.
    pub fn admit(
        &mut self,
        pair: &TokenPair,
        order_id: OrderId,
        key: ArrivalKey,
        now: DateTime<Utc>,
        key_of: impl Fn(OrderId) -> Option<ArrivalKey>,
    ) -> BatchId {
        let id = self.ensure_open(pair, now);
        if let Some(batch) = self.batches.get_mut(&id) {
            let pos = batch
                .members
                .partition_point(|m| key_of(*m).is_some_and(|k| k < key));
            batch.members.insert(pos, order_id);
            if batch.members.len() >= self.max_batch_size {
                tracing::debug!(batch = %id, members = batch.members.len(), "batch reached max size");
            }
        }
        id
    }

    /// Remove an order from an Open batch.
    ///
    /// # Errors
    /// - `BatchNotFound` for an unknown batch
    /// - `WrongBatchStatus` if the batch is no longer Open
    /// - `Internal` if the order is not a member
    pub fn withdraw(&mut self, batch_id: BatchId, order_id: OrderId) -> Result<()> {
        let batch = self.batch_mut(batch_id)?;
        if batch.status != BatchStatus::Open {
            return Err(CiphermatchError::WrongBatchStatus {
                batch_id,
                expected: BatchStatus::Open,
                actual: batch.status,
            });
        }
        if !batch.remove_member(order_id) {
            return Err(CiphermatchError::Internal(format!(
                "{order_id} is not a member of {batch_id}"
            )));
        }
        Ok(())
    }

    /// `now ≥ window_end` or the batch is full.
    #[must_use]
    pub fn should_close(&self, batch: &Batch<C>, now: DateTime<Utc>) -> bool {
        now >= batch.window_end || batch.members.len() >= self.max_batch_size
    }

    /// Close the Open batch of `pair` and seal its membership.
    ///
    /// # Errors
    /// - `NoOpenBatch` if the pair has no Open batch
    /// - `BatchNotReady` if neither the window nor the size trigger fired
    pub fn close(&mut self, pair: &TokenPair, now: DateTime<Utc>) -> Result<BatchId> {
        let id = *self
            .open
            .get(pair)
            .ok_or_else(|| CiphermatchError::NoOpenBatch(pair.clone()))?;
        let ready = self.should_close(self.batch(id)?, now);
        let batch = self.batch_mut(id)?;
        if !ready {
            tracing::warn!(
                batch = %id,
                members = batch.members.len(),
                window_end = %batch.window_end,
                "close rejected: batch not ready"
            );
            return Err(CiphermatchError::BatchNotReady {
                batch_id: id,
                members: batch.members.len(),
                window_end: batch.window_end,
            });
        }

        batch.status = BatchStatus::Closed;
        batch.closed_at = Some(now);
        batch.membership_root = Some(membership_root(id, &batch.pair, &batch.members));
        self.open.remove(pair);
        Ok(id)
    }
}

/// SHA-256 commitment over a batch's membership, in member order.
#[must_use]
pub fn membership_root(batch_id: BatchId, pair: &TokenPair, members: &[OrderId]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(constants::MEMBERSHIP_ROOT_DOMAIN);
    hasher.update(batch_id.0.to_le_bytes());
    hasher.update(pair.token_in.as_bytes());
    hasher.update([0u8]);
    hasher.update(pair.token_out.as_bytes());
    hasher.update([0u8]);
    hasher.update((members.len() as u64).to_le_bytes());
    for id in members {
        hasher.update(id.0.to_le_bytes());
    }
    hasher.finalize().into()
}

/// Recompute a closed batch's membership root and compare.
#[must_use]
pub fn verify_membership_root<C>(batch: &Batch<C>) -> bool {
    batch
        .membership_root
        .is_some_and(|root| root == membership_root(batch.id, &batch.pair, &batch.members))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use rust_decimal::Decimal;

    use super::*;

    fn pair() -> TokenPair {
        TokenPair::new("USDC", "WETH")
    }

    fn scheduler(max: usize) -> BatchScheduler<Decimal> {
        BatchScheduler::new(&BatchConfig {
            window: Duration::from_secs(30),
            max_batch_size: max,
        })
        .unwrap()
    }

    fn admit_in_order(s: &mut BatchScheduler<Decimal>, now: DateTime<Utc>, ids: &[u64]) -> BatchId {
        let mut id = BatchId(0);
        for n in ids {
            let oid = OrderId(*n);
            id = s.admit(&pair(), oid, (now, oid), now, |m| Some((now, m)));
        }
        id
    }

    #[test]
    fn first_admit_opens_batch() {
        let mut s = scheduler(10);
        let now = Utc::now();
        let id = admit_in_order(&mut s, now, &[1, 2]);
        assert_eq!(id, BatchId(1));
        let b = s.open_batch(&pair()).unwrap();
        assert_eq!(b.members, vec![OrderId(1), OrderId(2)]);
        assert_eq!(b.window_end, now + chrono::Duration::seconds(30));
    }

    #[test]
    fn admit_inserts_by_arrival_key() {
        let mut s = scheduler(10);
        let t0 = Utc::now();
        let t1 = t0 + chrono::Duration::seconds(1);
        let t2 = t0 + chrono::Duration::seconds(2);
        let times: BTreeMap<OrderId, DateTime<Utc>> =
            [(OrderId(5), t0), (OrderId(6), t2), (OrderId(2), t1)].into();
        let key_of = |m: OrderId| times.get(&m).map(|t| (*t, m));

        s.admit(&pair(), OrderId(5), (t0, OrderId(5)), t2, key_of);
        s.admit(&pair(), OrderId(6), (t2, OrderId(6)), t2, key_of);
        // Carried order with an older submit time lands in the middle.
        s.admit(&pair(), OrderId(2), (t1, OrderId(2)), t2, key_of);

        let b = s.open_batch(&pair()).unwrap();
        assert_eq!(b.members, vec![OrderId(5), OrderId(2), OrderId(6)]);
    }

    #[test]
    fn close_before_trigger_fails() {
        let mut s = scheduler(10);
        let now = Utc::now();
        admit_in_order(&mut s, now, &[1]);
        let err = s.close(&pair(), now).unwrap_err();
        assert!(matches!(err, CiphermatchError::BatchNotReady { .. }));
        assert_eq!(s.open_batch(&pair()).unwrap().status, BatchStatus::Open);
    }

    #[test]
    fn close_after_window() {
        let mut s = scheduler(10);
        let now = Utc::now();
        admit_in_order(&mut s, now, &[1, 2]);
        let id = s
            .close(&pair(), now + chrono::Duration::seconds(30))
            .unwrap();
        let b = s.batch(id).unwrap();
        assert_eq!(b.status, BatchStatus::Closed);
        assert!(verify_membership_root(b));
        assert!(s.open_batch(&pair()).is_none());
    }

    #[test]
    fn close_when_full() {
        let mut s = scheduler(2);
        let now = Utc::now();
        admit_in_order(&mut s, now, &[1, 2]);
        assert!(s.close(&pair(), now).is_ok());
    }

    #[test]
    fn close_without_open_batch() {
        let mut s = scheduler(2);
        let err = s.close(&pair(), Utc::now()).unwrap_err();
        assert!(matches!(err, CiphermatchError::NoOpenBatch(_)));
    }

    #[test]
    fn next_admit_after_close_opens_new_batch() {
        let mut s = scheduler(1);
        let now = Utc::now();
        admit_in_order(&mut s, now, &[1]);
        let first = s.close(&pair(), now).unwrap();
        let second = admit_in_order(&mut s, now, &[2]);
        assert_ne!(first, second);
        assert_eq!(s.latest_batch(&pair()).unwrap().id, second);
    }

    #[test]
    fn withdraw_only_from_open() {
        let mut s = scheduler(1);
        let now = Utc::now();
        let id = admit_in_order(&mut s, now, &[1]);
        s.close(&pair(), now).unwrap();
        let err = s.withdraw(id, OrderId(1)).unwrap_err();
        assert!(matches!(err, CiphermatchError::WrongBatchStatus { .. }));
    }

    #[test]
    fn withdraw_removes_member() {
        let mut s = scheduler(10);
        let now = Utc::now();
        let id = admit_in_order(&mut s, now, &[1, 2]);
        s.withdraw(id, OrderId(1)).unwrap();
        assert_eq!(s.batch(id).unwrap().members, vec![OrderId(2)]);
        assert!(s.withdraw(id, OrderId(1)).is_err());
    }

    #[test]
    fn membership_root_commits_to_order() {
        let a = membership_root(BatchId(1), &pair(), &[OrderId(1), OrderId(2)]);
        let b = membership_root(BatchId(1), &pair(), &[OrderId(2), OrderId(1)]);
        let c = membership_root(BatchId(2), &pair(), &[OrderId(1), OrderId(2)]);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, membership_root(BatchId(1), &pair(), &[OrderId(1), OrderId(2)]));
    }
}
