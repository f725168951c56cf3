use super::{Classifier, Detection, DetectionSource, Detector, MonitorStats, MonitoringState};
use crate::{
    chain::{ChainClient, PendingFeed},
    constants::PENDING_LOG_EVERY,
    metrics,
};
use alloy::primitives::TxHash;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::mpsc,
    task::{JoinHandle, JoinSet},
    time::{self, Instant, MissedTickBehavior},
};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug_span, info, trace, warn};

/// Timing and capacity settings for a [`MonitorTask`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorSettings {
    /// Interval between block polls.
    pub poll_interval: Duration,
    /// Interval between status reports.
    pub status_interval: Duration,
    /// Capacity of the seen transaction set.
    pub seen_capacity: usize,
}

/// Watches the pending feed and new blocks for the trigger call.
///
/// The pending feed gives the earliest sighting. Block polling catches
/// triggers that were mined without ever being seen as pending, and keeps
/// detection working when the subscription is unavailable.
#[derive(Debug)]
pub struct MonitorTask<C, F> {
    chain: Arc<C>,
    feed: Arc<F>,
    classifier: Classifier,
    settings: MonitorSettings,
}

impl<C, F> MonitorTask<C, F>
where
    C: ChainClient,
    F: PendingFeed,
{
    /// Creates a new monitor.
    pub const fn new(
        chain: Arc<C>,
        feed: Arc<F>,
        classifier: Classifier,
        settings: MonitorSettings,
    ) -> Self {
        Self { chain, feed, classifier, settings }
    }

    /// Fetches a pending transaction and inspects it. Lookup misses release
    /// the hash so the block poller can still classify the mined copy.
    async fn inspect_pending(chain: Arc<C>, detector: Detector, hash: TxHash) {
        match chain.transaction_by_hash(hash).await {
            Ok(Some(candidate)) => {
                detector.inspect(candidate, DetectionSource::Pending);
            }
            Ok(None) => {
                trace!(%hash, "pending transaction not found");
                detector.state().seen().forget(hash);
            }
            Err(err) => {
                trace!(%hash, %err, "failed to fetch pending transaction");
                detector.state().seen().forget(hash);
            }
        }
    }

    async fn pending_future(chain: Arc<C>, feed: Arc<F>, detector: Detector) {
        let span = debug_span!("MonitorTask::pending");

        let subscribed = tokio::select! {
            biased;
            _ = detector.token().cancelled() => return,
            res = feed.subscribe_pending().instrument(span.clone()) => res,
        };
        let mut stream = match subscribed {
            Ok(stream) => stream,
            Err(err) => {
                span_warn!(span, %err, "pending subscription unavailable, relying on block polling");
                return;
            }
        };
        span_info!(span, "subscribed to pending transactions");

        let mut lookups = JoinSet::new();
        loop {
            tokio::select! {
                biased;
                _ = detector.token().cancelled() => break,
                Some(_) = lookups.join_next(), if !lookups.is_empty() => {}
                next = stream.next() => {
                    let Some(hash) = next else {
                        span_warn!(span, "pending subscription ended, relying on block polling");
                        // Let in-flight lookups finish unless monitoring stops first.
                        tokio::select! {
                            _ = detector.token().cancelled() => {}
                            _ = async { while lookups.join_next().await.is_some() {} } => {}
                        }
                        break;
                    };
                    if !detector.is_active() {
                        break;
                    }

                    let count = detector.state().record_pending();
                    metrics::pending_received().increment(1);
                    if count % PENDING_LOG_EVERY == 0 {
                        span_debug!(span, count, "pending transactions received");
                    }

                    if !detector.state().seen().should_process(hash) {
                        continue;
                    }
                    let fut = Self::inspect_pending(chain.clone(), detector.clone(), hash);
                    lookups.spawn(fut.instrument(span.clone()));
                }
            }
        }

        // Inspection never yields, so once shutdown returns no lookup is
        // left touching the state.
        lookups.shutdown().await;
    }

    async fn poll_future(chain: Arc<C>, detector: Detector, interval: Duration) {
        let span = debug_span!("MonitorTask::poll");

        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_checked: Option<u64> = None;

        loop {
            tokio::select! {
                biased;
                _ = detector.token().cancelled() => return,
                _ = ticker.tick() => {}
            }

            let head = res_unwrap_or_continue!(
                chain.block_number().instrument(span.clone()).await,
                span,
                debug!("failed to fetch chain head")
            );

            let Some(from) = last_checked else {
                span_info!(span, head, "block polling started");
                last_checked = Some(head);
                continue;
            };

            let mut checked = from;
            for number in (from + 1)..=head {
                let txs = match chain.block_transactions(number).instrument(span.clone()).await {
                    Ok(Some(txs)) => txs,
                    Ok(None) => {
                        span_debug!(span, number, "block not available yet");
                        break;
                    }
                    Err(err) => {
                        span_debug!(span, %err, number, "failed to fetch block");
                        break;
                    }
                };

                let claimed = span.in_scope(|| {
                    trace!(number, count = txs.len(), "checking block");
                    txs.into_iter().any(|candidate| {
                        // A trigger seen as pending may still have its lookup in
                        // flight, so it is inspected regardless of the seen set.
                        let fresh = detector.state().seen().should_process(candidate.id);
                        (fresh || detector.is_trigger(&candidate))
                            && detector.inspect(candidate, DetectionSource::Block(number))
                    })
                });
                if claimed {
                    return;
                }

                checked = number;
                if !detector.is_active() {
                    return;
                }
            }
            last_checked = Some(checked);
        }
    }

    async fn status_future(state: Arc<MonitoringState>, token: CancellationToken, interval: Duration) {
        let mut ticker = time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => return,
                _ = ticker.tick() => {
                    let stats = state.stats();
                    info!(
                        elapsed_ms = stats.elapsed_ms,
                        pending = stats.pending_count,
                        target_contract = stats.target_contract_matches,
                        "monitoring for trigger"
                    );
                }
            }
        }
    }

    /// Starts the pending, polling and status loops.
    pub fn spawn(self) -> MonitorHandle {
        let state = Arc::new(MonitoringState::new(self.settings.seen_capacity));
        let token = CancellationToken::new();
        let (outbound, inbound) = mpsc::unbounded_channel();
        let detector = Detector::new(state.clone(), self.classifier, token.clone(), outbound);

        info!(
            contract = %self.classifier.contract(),
            selector = %self.classifier.selector(),
            poll_interval_ms = self.settings.poll_interval.as_millis() as u64,
            "starting trigger monitor"
        );

        let pending =
            tokio::spawn(Self::pending_future(self.chain.clone(), self.feed, detector.clone()));

        let mut tasks = JoinSet::new();
        tasks.spawn(Self::poll_future(self.chain, detector, self.settings.poll_interval));
        tasks.spawn(Self::status_future(state.clone(), token.clone(), self.settings.status_interval));

        MonitorHandle {
            state,
            token,
            detections: inbound,
            pending: Some(pending),
            tasks,
            stopped: false,
        }
    }
}

/// Handle to a running monitor.
///
/// Dropping the handle stops every loop.
#[derive(Debug)]
pub struct MonitorHandle {
    state: Arc<MonitoringState>,
    token: CancellationToken,
    detections: mpsc::UnboundedReceiver<Detection>,
    /// The pending loop winds down its own lookups, so it is awaited rather
    /// than aborted.
    pending: Option<JoinHandle<()>>,
    tasks: JoinSet<()>,
    stopped: bool,
}

impl MonitorHandle {
    /// Shared monitoring state.
    pub const fn state(&self) -> &Arc<MonitoringState> {
        &self.state
    }

    /// Waits for the trigger detection. Resolves to `None` once every loop
    /// has exited without a detection.
    pub async fn next_detection(&mut self) -> Option<Detection> {
        self.detections.recv().await
    }

    /// Returns a detection that was already sent, without waiting.
    ///
    /// After [`Self::cancel`] no loop can claim anymore, so this reports
    /// whether a trigger was claimed before monitoring stopped.
    pub fn try_next_detection(&mut self) -> Option<Detection> {
        self.detections.try_recv().ok()
    }

    /// Stops monitoring and waits for every loop to exit. Safe to call more
    /// than once.
    pub async fn cancel(&mut self) -> MonitorStats {
        self.state.deactivate();
        self.token.cancel();
        if let Some(pending) = self.pending.take() {
            if let Err(err) = pending.await {
                warn!(%err, "pending loop failed");
            }
        }
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}

        let stats = self.state.stats();
        if !std::mem::replace(&mut self.stopped, true) {
            info!(
                elapsed_ms = stats.elapsed_ms,
                pending = stats.pending_count,
                target_contract = stats.target_contract_matches,
                triggers = stats.trigger_matches,
                "trigger monitor stopped"
            );
        }
        stats
    }

    /// Whether [`Self::cancel`] has completed.
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.state.deactivate();
        self.token.cancel();
    }
}
