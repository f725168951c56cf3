use alloy::primitives::{B256, Bytes};
use serde_json::Value;
use std::future::Future;

/// Flashbots relay client.
pub mod flashbots;
pub use flashbots::Flashbots;

mod task;
pub use task::{BundleSubmission, BundleSubmitter, InclusionResult, SubmitError};

/// Errors returned by a [`RelayClient`].
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The relay answered with a JSON-RPC error.
    #[error("relay rejected request: {0}")]
    Rejected(String),
    /// The request could not be delivered.
    #[error("relay request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The response was not valid JSON, or had an unexpected shape.
    #[error("malformed relay response: {0}")]
    Json(#[from] serde_json::Error),
    /// Signing the request failed.
    #[error("failed to sign relay request: {0}")]
    Signature(#[from] alloy::signers::Error),
    /// The response carried neither `result` nor `error`.
    #[error("relay response has no result")]
    MissingResult,
}

/// A private bundle relay.
pub trait RelayClient: Send + Sync + 'static {
    /// Submits signed transactions as an atomic bundle targeting
    /// `target_block`. Returns the relay's bundle hash.
    fn send_bundle(
        &self,
        txs: Vec<Bytes>,
        target_block: u64,
    ) -> impl Future<Output = Result<B256, RelayError>> + Send;

    /// Fetches relay diagnostics for a submitted bundle.
    fn bundle_stats(
        &self,
        bundle_hash: B256,
        target_block: u64,
    ) -> impl Future<Output = Result<Value, RelayError>> + Send;
}
