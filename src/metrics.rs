//! Executor metrics definitions
//!
//! This module centralizes all metric definitions for the executor.
//!
//! ## Counters
//! - Pending notifications and target contract transactions
//! - Trigger detections and monitoring timeouts
//! - Bundle submissions (success/failure)
//! - Bundle inclusion outcomes
//!
//! ## Histograms
//! - Detection latency
//! - Inclusion wait

use init4_bin_base::deps::metrics::{
    Counter, Histogram, counter, describe_counter, describe_histogram, histogram,
};
use std::sync::LazyLock;

// -- Monitoring --
const PENDING_RECEIVED: &str = "bundle_executor.monitor.pending_received";
const PENDING_RECEIVED_HELP: &str = "Number of pending transaction notifications received";

const TARGET_CONTRACT_TXS: &str = "bundle_executor.monitor.target_contract_txs";
const TARGET_CONTRACT_TXS_HELP: &str = "Number of transactions sent to the watched contract";

const TRIGGER_DETECTIONS: &str = "bundle_executor.monitor.trigger_detections";
const TRIGGER_DETECTIONS_HELP: &str = "Number of trigger transactions acted upon";

const MONITOR_TIMEOUTS: &str = "bundle_executor.monitor.timeouts";
const MONITOR_TIMEOUTS_HELP: &str = "Number of monitoring runs that fell back to direct execution";

const DETECTION_LATENCY_MS: &str = "bundle_executor.monitor.detection_latency_ms";
const DETECTION_LATENCY_MS_HELP: &str = "Time from monitor start to trigger detection in milliseconds";

// -- Relay --
const BUNDLES_SUBMITTED: &str = "bundle_executor.relay.bundles_submitted";
const BUNDLES_SUBMITTED_HELP: &str = "Number of bundles accepted by the relay";

const SUBMISSION_FAILURES: &str = "bundle_executor.relay.submission_failures";
const SUBMISSION_FAILURES_HELP: &str = "Number of bundles rejected by the relay";

// -- Inclusion --
const BUNDLES_INCLUDED: &str = "bundle_executor.bundles_included";
const BUNDLES_INCLUDED_HELP: &str = "Number of bundles found on chain";

const BUNDLES_NOT_INCLUDED: &str = "bundle_executor.bundles_not_included";
const BUNDLES_NOT_INCLUDED_HELP: &str = "Number of bundles not found within the confirmation window";

const INCLUSION_WAIT_MS: &str = "bundle_executor.inclusion_wait_ms";
const INCLUSION_WAIT_MS_HELP: &str = "Time from submission to observed inclusion in milliseconds";

static DESCRIBE: LazyLock<()> = LazyLock::new(|| {
    describe_counter!(PENDING_RECEIVED, PENDING_RECEIVED_HELP);
    describe_counter!(TARGET_CONTRACT_TXS, TARGET_CONTRACT_TXS_HELP);
    describe_counter!(TRIGGER_DETECTIONS, TRIGGER_DETECTIONS_HELP);
    describe_counter!(MONITOR_TIMEOUTS, MONITOR_TIMEOUTS_HELP);
    describe_histogram!(DETECTION_LATENCY_MS, DETECTION_LATENCY_MS_HELP);

    describe_counter!(BUNDLES_SUBMITTED, BUNDLES_SUBMITTED_HELP);
    describe_counter!(SUBMISSION_FAILURES, SUBMISSION_FAILURES_HELP);

    describe_counter!(BUNDLES_INCLUDED, BUNDLES_INCLUDED_HELP);
    describe_counter!(BUNDLES_NOT_INCLUDED, BUNDLES_NOT_INCLUDED_HELP);
    describe_histogram!(INCLUSION_WAIT_MS, INCLUSION_WAIT_MS_HELP);
});

// -- Monitoring --

/// Counter for pending transaction notifications.
pub fn pending_received() -> Counter {
    LazyLock::force(&DESCRIBE);
    counter!(PENDING_RECEIVED)
}

/// Counter for transactions sent to the watched contract.
pub fn target_contract_txs() -> Counter {
    LazyLock::force(&DESCRIBE);
    counter!(TARGET_CONTRACT_TXS)
}

/// Counter for trigger detections.
pub fn trigger_detections() -> Counter {
    LazyLock::force(&DESCRIBE);
    counter!(TRIGGER_DETECTIONS)
}

/// Counter for monitoring timeouts.
pub fn monitor_timeouts() -> Counter {
    LazyLock::force(&DESCRIBE);
    counter!(MONITOR_TIMEOUTS)
}

/// Histogram for detection latency in milliseconds.
pub fn detection_latency_ms() -> Histogram {
    LazyLock::force(&DESCRIBE);
    histogram!(DETECTION_LATENCY_MS)
}

// -- Relay --

/// Counter for bundles accepted by the relay.
pub fn bundles_submitted() -> Counter {
    LazyLock::force(&DESCRIBE);
    counter!(BUNDLES_SUBMITTED)
}

/// Counter for bundles rejected by the relay.
pub fn submission_failures() -> Counter {
    LazyLock::force(&DESCRIBE);
    counter!(SUBMISSION_FAILURES)
}

// -- Inclusion --

/// Counter for bundles found on chain.
pub fn bundles_included() -> Counter {
    LazyLock::force(&DESCRIBE);
    counter!(BUNDLES_INCLUDED)
}

/// Counter for bundles missing after the confirmation window.
pub fn bundles_not_included() -> Counter {
    LazyLock::force(&DESCRIBE);
    counter!(BUNDLES_NOT_INCLUDED)
}

/// Histogram for inclusion wait in milliseconds.
pub fn inclusion_wait_ms() -> Histogram {
    LazyLock::force(&DESCRIBE);
    histogram!(INCLUSION_WAIT_MS)
}
