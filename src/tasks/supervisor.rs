//! Bounds the monitoring window and picks the execution path.
//!
//! In monitor mode the supervisor races the trigger monitor against the
//! timeout. A detection leads to the triggered bundle priced off the
//! observed transaction. A timeout leads to the fallback bundle, in which
//! the executor sends the trigger itself. In both cases monitoring is fully
//! stopped before any bundle is built.
use crate::{
    abi::IPresaleNft,
    chain::{ChainClient, ChainError, PendingFeed},
    config::ConfigError,
    metrics,
    tasks::{
        bundle::{BundleBuilder, BundleError, BundleMode, BundleRequest},
        monitor::{Classifier, Detection, MonitorSettings, MonitorStats, MonitorTask},
        submit::{BundleSubmission, BundleSubmitter, InclusionResult, RelayClient, SubmitError},
    },
    signer::BundleSigner,
};
use alloy::{
    primitives::{Address, TxHash},
    sol_types::SolCall,
};
use init4_bin_base::utils::from_env::{FromEnvErr, FromEnvVar, parse_env_if_present};
use serde::Serialize;
use serde_json::Value;
use std::{str::FromStr, sync::Arc, time::Duration};
use tokio::time;
use tracing::{info, instrument, warn};

/// How the executor runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Submit the fallback bundle right away.
    #[default]
    Direct,
    /// Watch for the trigger first, falling back on timeout.
    Monitor,
}

impl FromStr for ExecutionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "monitor" => Ok(Self::Monitor),
            _ => Err(ConfigError::InvalidMode(s.to_owned())),
        }
    }
}

impl FromEnvVar for ExecutionMode {
    type Error = <Self as FromStr>::Err;

    fn from_env_var(env_var: &str) -> Result<Self, FromEnvErr<Self::Error>> {
        parse_env_if_present(env_var)
    }
}

/// The path a run took.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExecutionPath {
    /// Direct mode. No monitoring took place.
    Direct,
    /// The trigger was detected.
    Triggered {
        /// The detected trigger.
        detection: Detection,
    },
    /// Monitoring timed out.
    Fallback,
}

/// Everything a finished run produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunOutcome {
    /// How the run proceeded.
    pub path: ExecutionPath,
    /// The bundle requests that were signed and sent.
    pub requests: Vec<BundleRequest>,
    /// The relay submission.
    pub submission: BundleSubmission,
    /// Inclusion outcome.
    pub inclusion: InclusionResult,
    /// Relay diagnostics, if available.
    pub bundle_stats: Option<Value>,
    /// Hashes broadcast publicly after a missed fallback bundle.
    pub broadcast: Vec<TxHash>,
    /// Monitoring counters, for monitor mode runs.
    pub monitor: Option<MonitorStats>,
}

/// Owner and presale status read from the watched contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContractStatus {
    /// Contract owner.
    pub owner: Address,
    /// Whether the presale is already open.
    pub presale_active: bool,
}

/// Errors that end a run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    /// The fallback needs to send the owner-only trigger, but the signer is
    /// not the owner.
    #[error("signer {signer} is not the contract owner {owner}")]
    NotOwner {
        /// Executor address.
        signer: Address,
        /// Contract owner.
        owner: Address,
    },
    /// A contract read failed.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// A contract response could not be decoded.
    #[error("failed to decode contract response: {0}")]
    Decode(#[from] alloy::sol_types::Error),
    /// The bundle could not be built.
    #[error(transparent)]
    Bundle(#[from] BundleError),
    /// The bundle could not be submitted.
    #[error(transparent)]
    Submit(#[from] SubmitError),
}

/// Settings for a [`Supervisor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Execution mode.
    pub mode: ExecutionMode,
    /// Monitoring window.
    pub monitor_timeout: Duration,
    /// Blocks checked for inclusion.
    pub confirmation_blocks: u64,
    /// Broadcast a missed fallback bundle publicly.
    pub broadcast_fallback: bool,
    /// Monitor loop settings.
    pub monitor: MonitorSettings,
}

/// Runs the executor end to end.
#[derive(Debug)]
pub struct Supervisor<C, F, S, R> {
    chain: Arc<C>,
    feed: Arc<F>,
    classifier: Classifier,
    builder: BundleBuilder,
    submitter: BundleSubmitter<C, S, R>,
    settings: SupervisorSettings,
}

impl<C, F, S, R> Supervisor<C, F, S, R>
where
    C: ChainClient,
    F: PendingFeed,
    S: BundleSigner,
    R: RelayClient,
{
    /// Creates a supervisor from its collaborators.
    pub const fn new(
        chain: Arc<C>,
        feed: Arc<F>,
        classifier: Classifier,
        builder: BundleBuilder,
        submitter: BundleSubmitter<C, S, R>,
        settings: SupervisorSettings,
    ) -> Self {
        Self { chain, feed, classifier, builder, submitter, settings }
    }

    /// The supervisor settings.
    pub const fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    /// The bundle submitter.
    pub const fn submitter(&self) -> &BundleSubmitter<C, S, R> {
        &self.submitter
    }

    /// Runs in the configured mode.
    pub async fn run(&self) -> Result<RunOutcome, RunError> {
        match self.settings.mode {
            ExecutionMode::Direct => {
                info!(contract = %self.classifier.contract(), "direct execution");
                self.execute_fallback(ExecutionPath::Direct, None).await
            }
            ExecutionMode::Monitor => self.run_with_timeout(self.settings.monitor_timeout).await,
        }
    }

    /// Monitors for the trigger for at most `timeout`, then executes the
    /// triggered or the fallback bundle.
    #[instrument(skip(self), fields(timeout_ms = timeout.as_millis() as u64))]
    pub async fn run_with_timeout(&self, timeout: Duration) -> Result<RunOutcome, RunError> {
        let mut monitor = MonitorTask::new(
            self.chain.clone(),
            self.feed.clone(),
            self.classifier,
            self.settings.monitor,
        )
        .spawn();

        let detection = tokio::select! {
            biased;
            Some(detection) = monitor.next_detection() => Some(detection),
            _ = time::sleep(timeout) => None,
        };
        let stats = monitor.cancel().await;
        // A loop may have claimed the trigger while the timer fired.
        let detection = detection.or_else(|| monitor.try_next_detection());

        match detection {
            Some(detection) => self.execute_triggered(detection, stats).await,
            None => {
                metrics::monitor_timeouts().increment(1);
                warn!(
                    pending = stats.pending_count,
                    target_contract = stats.target_contract_matches,
                    "no trigger observed, falling back to direct execution"
                );
                self.execute_fallback(ExecutionPath::Fallback, Some(stats)).await
            }
        }
    }

    /// Reads the owner and presale status of the watched contract.
    pub async fn contract_status(&self) -> Result<ContractStatus, RunError> {
        let contract = self.classifier.contract();

        let owner = self.chain.call(contract, IPresaleNft::ownerCall {}.abi_encode().into()).await?;
        let owner = IPresaleNft::ownerCall::abi_decode_returns(&owner)?;

        let active =
            self.chain.call(contract, IPresaleNft::isPresaleActiveCall {}.abi_encode().into()).await?;
        let presale_active = IPresaleNft::isPresaleActiveCall::abi_decode_returns(&active)?;

        Ok(ContractStatus { owner, presale_active })
    }

    async fn execute_triggered(
        &self,
        detection: Detection,
        stats: MonitorStats,
    ) -> Result<RunOutcome, RunError> {
        info!(tx_hash = %detection.candidate.id, source = ?detection.source, "executing triggered bundle");
        let requests = self
            .builder
            .build(self.chain.as_ref(), BundleMode::Triggered, detection.candidate.gas_price)
            .await?;
        self.execute(ExecutionPath::Triggered { detection }, requests, Some(stats), false).await
    }

    async fn execute_fallback(
        &self,
        path: ExecutionPath,
        stats: Option<MonitorStats>,
    ) -> Result<RunOutcome, RunError> {
        let status = self.contract_status().await?;
        let signer = self.builder.sender();
        if status.owner != signer {
            return Err(RunError::NotOwner { signer, owner: status.owner });
        }
        if status.presale_active {
            warn!("presale is already active, the trigger call may revert");
        }

        let requests = self.builder.build(self.chain.as_ref(), BundleMode::Fallback, None).await?;
        self.execute(path, requests, stats, self.settings.broadcast_fallback).await
    }

    async fn execute(
        &self,
        path: ExecutionPath,
        requests: Vec<BundleRequest>,
        monitor: Option<MonitorStats>,
        broadcast_on_miss: bool,
    ) -> Result<RunOutcome, RunError> {
        let submission = self.submitter.submit(&requests).await?;
        let inclusion = self.submitter.confirm(&submission, self.settings.confirmation_blocks).await;
        let bundle_stats = self.submitter.bundle_stats(&submission).await;

        let broadcast = if !inclusion.included && broadcast_on_miss {
            warn!("bundle missed, broadcasting publicly");
            self.submitter.broadcast(&submission).await
        } else {
            Vec::new()
        };

        if inclusion.included {
            info!(block_number = ?inclusion.block_number, bundle_hash = %submission.bundle_hash, "run complete");
        } else {
            warn!(
                bundle_hash = %submission.bundle_hash,
                "bundle not included, it may have been outbid or reverted"
            );
        }

        Ok(RunOutcome { path, requests, submission, inclusion, bundle_stats, broadcast, monitor })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_execution_mode() {
        assert_eq!("direct".parse::<ExecutionMode>().unwrap(), ExecutionMode::Direct);
        assert_eq!(" Monitor ".parse::<ExecutionMode>().unwrap(), ExecutionMode::Monitor);
        assert!(matches!("watch".parse::<ExecutionMode>(), Err(ConfigError::InvalidMode(_))));
    }
}
