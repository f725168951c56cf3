use super::{RelayClient, RelayError};
use crate::{
    chain::{ChainClient, ChainError},
    metrics,
    signer::{BundleSigner, SignedTx, SignerError},
    tasks::bundle::{BundleError, BundleRequest, validate_nonces},
};
use alloy::primitives::{B256, TxHash};
use serde::Serialize;
use serde_json::Value;
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::time::{self, Instant};
use tracing::{Instrument, debug, debug_span, error, info, instrument, warn};

/// Errors produced while submitting a bundle.
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// The requests do not form a valid bundle.
    #[error(transparent)]
    Bundle(#[from] BundleError),
    /// A request could not be signed.
    #[error(transparent)]
    Signing(#[from] SignerError),
    /// The target block could not be determined.
    #[error(transparent)]
    Chain(#[from] ChainError),
    /// The relay refused the bundle or could not be reached.
    #[error(transparent)]
    Relay(#[from] RelayError),
}

/// A bundle accepted by the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleSubmission {
    /// Relay bundle hash.
    pub bundle_hash: B256,
    /// Block the bundle targets.
    pub target_block: u64,
    /// Signed transactions, in bundle order.
    pub signed_txs: Vec<SignedTx>,
}

impl BundleSubmission {
    /// On-chain hashes of the bundle transactions.
    pub fn expected_hashes(&self) -> Vec<TxHash> {
        self.signed_txs.iter().map(SignedTx::expected_hash).collect()
    }
}

/// Whether a submitted bundle landed on chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InclusionResult {
    /// At least one bundle transaction was found.
    pub included: bool,
    /// Block in which it was found.
    pub block_number: Option<u64>,
    /// Bundle transactions found in that block.
    pub matched_hashes: Vec<TxHash>,
}

/// Signs bundle requests, hands them to the relay and watches for inclusion.
#[derive(Debug)]
pub struct BundleSubmitter<C, S, R> {
    chain: Arc<C>,
    signer: S,
    relay: R,
    block_interval: Duration,
}

impl<C, S, R> BundleSubmitter<C, S, R>
where
    C: ChainClient,
    S: BundleSigner,
    R: RelayClient,
{
    /// Creates a submitter. `block_interval` paces the inclusion checks.
    pub const fn new(chain: Arc<C>, signer: S, relay: R, block_interval: Duration) -> Self {
        Self { chain, signer, relay, block_interval }
    }

    /// The bundle signer.
    pub const fn signer(&self) -> &S {
        &self.signer
    }

    /// The relay client.
    pub const fn relay(&self) -> &R {
        &self.relay
    }

    /// Signs `requests` in order and submits them for the block after the
    /// current head.
    #[instrument(skip_all, fields(count = requests.len()))]
    pub async fn submit(&self, requests: &[BundleRequest]) -> Result<BundleSubmission, SubmitError> {
        validate_nonces(requests)?;

        let mut signed_txs = Vec::with_capacity(requests.len());
        for request in requests {
            let signed = self.signer.sign(request).await?;
            debug!(ordinal = request.ordinal, nonce = request.nonce, tx_hash = %signed.hash, "signed bundle transaction");
            signed_txs.push(signed);
        }

        let target_block = self.chain.block_number().await? + 1;
        let txs = signed_txs.iter().map(|tx| tx.raw.clone()).collect();

        let bundle_hash = self.relay.send_bundle(txs, target_block).await.inspect_err(|err| {
            error!(%err, target_block, "bundle submission failed");
            metrics::submission_failures().increment(1);
        })?;

        metrics::bundles_submitted().increment(1);
        info!(%bundle_hash, target_block, "bundle submitted");

        Ok(BundleSubmission { bundle_hash, target_block, signed_txs })
    }

    /// Checks up to `max_blocks` blocks starting at the target block for any
    /// of the bundle's transactions, waiting one block interval between
    /// checks.
    ///
    /// Blocks that do not exist yet are retried. Query errors are logged and
    /// never abort the wait.
    pub async fn confirm(&self, submission: &BundleSubmission, max_blocks: u64) -> InclusionResult {
        let span = debug_span!("BundleSubmitter::confirm", bundle_hash = %submission.bundle_hash);
        let expected: HashSet<TxHash> = submission.expected_hashes().into_iter().collect();
        let started = Instant::now();

        let mut number = submission.target_block;
        for attempt in 0..max_blocks {
            if attempt > 0 {
                time::sleep(self.block_interval).await;
            }

            let txs = match self.chain.block_transactions(number).instrument(span.clone()).await {
                Ok(Some(txs)) => txs,
                Ok(None) => {
                    span_debug!(span, number, attempt, "block not yet available");
                    continue;
                }
                Err(err) => {
                    span_warn!(span, %err, number, attempt, "failed to fetch block");
                    continue;
                }
            };

            let matched_hashes: Vec<TxHash> =
                txs.iter().map(|tx| tx.id).filter(|id| expected.contains(id)).collect();
            if !matched_hashes.is_empty() {
                metrics::bundles_included().increment(1);
                metrics::inclusion_wait_ms().record(started.elapsed().as_millis() as f64);
                span_info!(span, number, matched = matched_hashes.len(), "bundle included");
                return InclusionResult { included: true, block_number: Some(number), matched_hashes };
            }

            span_debug!(span, number, "bundle not in block");
            number += 1;
        }

        metrics::bundles_not_included().increment(1);
        span_warn!(span, max_blocks, "bundle not included within confirmation window");
        InclusionResult::default()
    }

    /// Relay diagnostics for `submission`. Failures are logged and yield
    /// `None`.
    pub async fn bundle_stats(&self, submission: &BundleSubmission) -> Option<Value> {
        self.relay
            .bundle_stats(submission.bundle_hash, submission.target_block)
            .await
            .inspect_err(|err| debug!(%err, "bundle stats unavailable"))
            .ok()
    }

    /// Broadcasts the bundle transactions to the public mempool, in order.
    /// Stops at the first failure, since later nonces cannot land without
    /// earlier ones.
    pub async fn broadcast(&self, submission: &BundleSubmission) -> Vec<TxHash> {
        let mut sent = Vec::with_capacity(submission.signed_txs.len());
        for tx in &submission.signed_txs {
            match self.chain.send_raw_transaction(tx.raw.clone()).await {
                Ok(hash) => {
                    info!(tx_hash = %hash, "broadcast bundle transaction");
                    sent.push(hash);
                }
                Err(err) => {
                    warn!(%err, tx_hash = %tx.hash, "public broadcast failed");
                    break;
                }
            }
        }
        sent
    }
}
