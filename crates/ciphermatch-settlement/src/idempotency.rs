//! Settlement idempotency guard: each batch settles at most once.
//!
//! Batch status already records settlement; the guard is the executor's own
//! memory of what it has run, so a second `settle` for the same batch is
//! answered as a no-op even if a caller hands it a stale batch record.
//!
//! The guard is a bounded FIFO set so memory stays predictable in
//! long-running engines.

use std::collections::{HashSet, VecDeque};

use ciphermatch_types::BatchId;

/// Remembers the most recently settled batch ids.
#[derive(Debug, Clone)]
pub struct IdempotencyGuard {
    settled: HashSet<BatchId>,
    /// Insertion order for eviction (front = oldest).
    order: VecDeque<BatchId>,
    max_size: usize,
}

impl IdempotencyGuard {
    /// A zero `max_size` is treated as one.
    #[must_use]
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            settled: HashSet::with_capacity(max_size.min(1024)),
            order: VecDeque::with_capacity(max_size.min(1024)),
            max_size,
        }
    }

    /// Record `batch_id` as settled. Returns `false` if it already was.
    pub fn mark_settled(&mut self, batch_id: BatchId) -> bool {
        if self.settled.contains(&batch_id) {
            return false;
        }
        if self.settled.len() >= self.max_size {
            if let Some(oldest) = self.order.pop_front() {
                self.settled.remove(&oldest);
            }
        }
        self.settled.insert(batch_id);
        self.order.push_back(batch_id);
        true
    }

    #[must_use]
    pub fn is_settled(&self, batch_id: BatchId) -> bool {
        self.settled.contains(&batch_id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.settled.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.settled.is_empty()
    }
}
