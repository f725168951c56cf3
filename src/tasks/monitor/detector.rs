use super::{Classifier, MonitoringState};
use crate::{chain::TransactionCandidate, metrics};
use serde::Serialize;
use std::{sync::Arc, time::Duration};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Where a detected trigger was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionSource {
    /// A pending transaction notification. The trigger is not mined yet.
    Pending,
    /// A transaction in the given mined block.
    Block(u64),
}

/// A trigger transaction observed by the monitor.
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    /// The trigger transaction.
    pub candidate: TransactionCandidate,
    /// Where it was observed.
    pub source: DetectionSource,
    /// Time from monitor start to detection.
    pub elapsed: Duration,
}

/// Classifies candidates from both monitor loops and emits at most one
/// [`Detection`] per monitoring run.
#[derive(Debug, Clone)]
pub struct Detector {
    state: Arc<MonitoringState>,
    classifier: Classifier,
    token: CancellationToken,
    outbound: mpsc::UnboundedSender<Detection>,
}

impl Detector {
    /// Creates a detector reporting to `outbound`. `token` is cancelled when
    /// the trigger is claimed.
    pub const fn new(
        state: Arc<MonitoringState>,
        classifier: Classifier,
        token: CancellationToken,
        outbound: mpsc::UnboundedSender<Detection>,
    ) -> Self {
        Self { state, classifier, token, outbound }
    }

    /// Shared monitoring state.
    pub const fn state(&self) -> &Arc<MonitoringState> {
        &self.state
    }

    /// Token cancelled when monitoring ends.
    pub const fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether monitoring is still active.
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Whether `candidate` is a trigger call, without recording anything.
    pub fn is_trigger(&self, candidate: &TransactionCandidate) -> bool {
        self.classifier.classify(candidate).is_trigger
    }

    /// Inspects `candidate`. Returns `true` if this call claimed the trigger.
    ///
    /// Claiming stops monitoring before the detection is sent, so concurrent
    /// callers never produce a second detection.
    pub fn inspect(&self, candidate: TransactionCandidate, source: DetectionSource) -> bool {
        if !self.state.is_active() {
            return false;
        }

        let class = self.classifier.classify(&candidate);
        if !class.is_target_contract {
            return false;
        }

        let count = self.state.record_target_contract();
        metrics::target_contract_txs().increment(1);
        debug!(
            tx_hash = %candidate.id,
            ?source,
            from = ?candidate.from,
            selector = ?candidate.selector(),
            count,
            "transaction to watched contract"
        );

        if !class.is_trigger {
            return false;
        }

        if !self.state.try_claim() {
            trace!(tx_hash = %candidate.id, "trigger already claimed");
            return false;
        }
        self.token.cancel();
        self.state.record_trigger();

        let elapsed = self.state.elapsed();
        metrics::trigger_detections().increment(1);
        metrics::detection_latency_ms().record(elapsed.as_millis() as f64);
        info!(
            tx_hash = %candidate.id,
            ?source,
            from = ?candidate.from,
            gas_price = ?candidate.gas_price,
            elapsed_ms = elapsed.as_millis() as u64,
            "trigger transaction detected"
        );

        if self.outbound.send(Detection { candidate, source, elapsed }).is_err() {
            warn!("detection receiver dropped");
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, B256, address, bytes, fixed_bytes};

    const CONTRACT: Address = address!("0x1111111111111111111111111111111111111111");

    fn detector() -> (Detector, mpsc::UnboundedReceiver<Detection>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let detector = Detector::new(
            Arc::new(MonitoringState::new(64)),
            Classifier::new(CONTRACT, fixed_bytes!("0xa8eac492")),
            CancellationToken::new(),
            tx,
        );
        (detector, rx)
    }

    fn trigger(n: u8) -> TransactionCandidate {
        TransactionCandidate {
            id: B256::with_last_byte(n),
            to: Some(CONTRACT),
            data: Some(bytes!("a8eac492")),
            gas_price: Some(1_000),
            from: None,
        }
    }

    #[tokio::test]
    async fn second_trigger_is_ignored() {
        let (detector, mut rx) = detector();

        assert!(detector.inspect(trigger(1), DetectionSource::Pending));
        assert!(!detector.inspect(trigger(2), DetectionSource::Block(5)));

        assert!(detector.token().is_cancelled());
        assert_eq!(rx.recv().await.unwrap().candidate.id, B256::with_last_byte(1));
        assert!(rx.try_recv().is_err());

        let stats = detector.state().stats();
        assert_eq!(stats.trigger_matches, 1);
        assert_eq!(stats.target_contract_matches, 1);
    }

    #[test]
    fn non_trigger_calls_are_counted_but_not_claimed() {
        let (detector, _rx) = detector();
        let mut tx = trigger(3);
        tx.data = Some(bytes!("e6ab1434"));

        assert!(!detector.inspect(tx, DetectionSource::Pending));
        assert!(detector.is_active());
        assert_eq!(detector.state().stats().target_contract_matches, 1);
    }
}
