use super::seen::SeenSet;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::time::{Duration, Instant};

/// Counters reported while monitoring and when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonitorStats {
    /// Pending transaction notifications received.
    pub pending_count: u64,
    /// Transactions addressed to the watched contract.
    pub target_contract_matches: u64,
    /// Trigger calls acted upon. Never more than one.
    pub trigger_matches: u64,
    /// Time since monitoring started, in milliseconds.
    pub elapsed_ms: u64,
}

/// State shared by the monitor loops.
///
/// `active` flips from `true` to `false` exactly once, either when a trigger
/// is claimed or when monitoring is stopped.
#[derive(Debug)]
pub struct MonitoringState {
    active: AtomicBool,
    seen: SeenSet,
    pending_count: AtomicU64,
    target_contract_matches: AtomicU64,
    trigger_matches: AtomicU64,
    started_at: Instant,
}

impl MonitoringState {
    /// Creates an active state with a seen set of `seen_capacity`.
    pub fn new(seen_capacity: usize) -> Self {
        Self {
            active: AtomicBool::new(true),
            seen: SeenSet::new(seen_capacity),
            pending_count: AtomicU64::new(0),
            target_contract_matches: AtomicU64::new(0),
            trigger_matches: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    /// Whether monitoring is still active.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Claims the single trigger match. Only the first caller while active
    /// gets `true`.
    pub fn try_claim(&self) -> bool {
        self.active.compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire).is_ok()
    }

    /// Stops monitoring. Returns whether it was active.
    pub fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::AcqRel)
    }

    /// The seen transaction set.
    pub const fn seen(&self) -> &SeenSet {
        &self.seen
    }

    /// Counts a pending notification, returning the new total.
    pub fn record_pending(&self) -> u64 {
        self.pending_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Counts a transaction to the watched contract, returning the new total.
    pub fn record_target_contract(&self) -> u64 {
        self.target_contract_matches.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Counts a claimed trigger.
    pub fn record_trigger(&self) -> u64 {
        self.trigger_matches.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Time since monitoring started.
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            pending_count: self.pending_count.load(Ordering::Relaxed),
            target_contract_matches: self.target_contract_matches.load(Ordering::Relaxed),
            trigger_matches: self.trigger_matches.load(Ordering::Relaxed),
            elapsed_ms: self.elapsed().as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_succeeds_once() {
        let state = MonitoringState::new(16);
        assert!(state.is_active());
        assert!(state.try_claim());
        assert!(!state.try_claim());
        assert!(!state.is_active());
        assert!(!state.deactivate());
    }

    #[test]
    fn no_claim_after_deactivation() {
        let state = MonitoringState::new(16);
        assert!(state.deactivate());
        assert!(!state.try_claim());
    }
}
