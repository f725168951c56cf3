use alloy::primitives::TxHash;
use dashmap::DashSet;
use std::{
    collections::VecDeque,
    sync::{Mutex, PoisonError},
};

/// A bounded set of transaction hashes that have already been handed to
/// classification.
///
/// Once full, the oldest hash is evicted to make room for a new one.
#[derive(Debug)]
pub struct SeenSet {
    seen: DashSet<TxHash>,
    order: Mutex<VecDeque<TxHash>>,
    capacity: usize,
}

impl SeenSet {
    /// Creates an empty set holding at most `capacity` hashes.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            seen: DashSet::with_capacity(capacity),
            order: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Records `id`. Returns `true` only the first time an id is seen.
    pub fn should_process(&self, id: TxHash) -> bool {
        if !self.seen.insert(id) {
            return false;
        }

        let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        order.push_back(id);
        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    /// Removes `id`, so that a later sighting is processed again.
    ///
    /// Used when a pending lookup fails and the transaction may still show up
    /// in a block.
    pub fn forget(&self, id: TxHash) {
        if self.seen.remove(&id).is_some() {
            let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
            order.retain(|seen| seen != &id);
        }
    }

    /// Whether `id` is currently remembered.
    pub fn contains(&self, id: &TxHash) -> bool {
        self.seen.contains(id)
    }

    /// Number of remembered hashes.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
