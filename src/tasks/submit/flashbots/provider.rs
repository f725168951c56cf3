//! A Flashbots relay client.
use crate::tasks::submit::{RelayClient, RelayError};
use alloy::{
    primitives::{B256, Bytes, keccak256},
    rpc::types::mev::{EthBundleHash, EthSendBundle},
    signers::Signer,
};
use init4_bin_base::utils::signer::LocalOrAws;
use reqwest::header::CONTENT_TYPE;
use serde_json::{Value, json};
use tracing::{debug, instrument};

/// Signed JSON-RPC access to a Flashbots relay.
///
/// Every request carries an `X-Flashbots-Signature` header of the form
/// `address:signature`, where the signature is an EIP-191 signature over the
/// hex encoded keccak256 of the request body.
#[derive(Debug, Clone)]
pub struct Flashbots<S = LocalOrAws> {
    /// The relay URL.
    pub relay_url: url::Url,
    client: reqwest::Client,
    signer: S,
}

impl<S: Signer + Send + Sync> Flashbots<S> {
    /// Creates a client for `relay_url`, authenticating with `signer`.
    pub fn new(relay_url: url::Url, signer: S) -> Self {
        Self { relay_url, client: reqwest::Client::new(), signer }
    }

    /// Sends a bundle via `eth_sendBundle`.
    #[instrument(skip_all, fields(block_number = bundle.block_number, txs = bundle.txs.len()))]
    pub async fn send_bundle(&self, bundle: &EthSendBundle) -> Result<EthBundleHash, RelayError> {
        let params = serde_json::to_value(bundle)?;
        let result = self.raw_call("eth_sendBundle", params).await?;
        serde_json::from_value(result).map_err(Into::into)
    }

    /// Fetches relay statistics for a submitted bundle via
    /// `flashbots_getBundleStatsV2`.
    #[instrument(skip(self))]
    pub async fn bundle_stats(&self, bundle_hash: B256, block_number: u64) -> Result<Value, RelayError> {
        let params = json!({ "bundleHash": bundle_hash, "blockNumber": format!("0x{block_number:x}") });
        self.raw_call("flashbots_getBundleStatsV2", params).await
    }

    /// Makes a signed JSON-RPC call and returns the `result` member.
    async fn raw_call(&self, method: &str, params: Value) -> Result<Value, RelayError> {
        let params = match params {
            Value::Array(_) => params,
            other => Value::Array(vec![other]),
        };

        let body = json!({"jsonrpc":"2.0","id":1,"method":method,"params":params});
        let body_bz = serde_json::to_vec(&body)?;

        let signature = self.compute_signature(&body_bz).await?;

        let resp = self
            .client
            .post(self.relay_url.as_str())
            .header(CONTENT_TYPE, "application/json")
            .header("X-Flashbots-Signature", signature)
            .body(body_bz)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        debug!(method, %status, "relay response");

        let mut v: Value = serde_json::from_str(&text)?;
        if let Some(err) = v.get("error") {
            let message = err
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_owned)
                .unwrap_or_else(|| err.to_string());
            return Err(RelayError::Rejected(message));
        }

        match v.get_mut("result") {
            Some(result) => Ok(result.take()),
            None => Err(RelayError::MissingResult),
        }
    }

    /// Builds the `X-Flashbots-Signature` header value for `body_bz`.
    pub async fn compute_signature(&self, body_bz: &[u8]) -> Result<String, RelayError> {
        let payload = format!("0x{:x}", keccak256(body_bz));
        let signature = self.signer.sign_message(payload.as_ref()).await?;
        let address = self.signer.address();
        Ok(format!("{address}:{signature}"))
    }
}

impl<S> RelayClient for Flashbots<S>
where
    S: Signer + Send + Sync + 'static,
{
    async fn send_bundle(&self, txs: Vec<Bytes>, target_block: u64) -> Result<B256, RelayError> {
        let bundle = EthSendBundle { txs, block_number: target_block, ..Default::default() };
        Flashbots::send_bundle(self, &bundle).await.map(|hash| hash.bundle_hash)
    }

    async fn bundle_stats(&self, bundle_hash: B256, target_block: u64) -> Result<Value, RelayError> {
        Flashbots::bundle_stats(self, bundle_hash, target_block).await
    }
}
