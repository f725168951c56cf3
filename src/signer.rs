//! Signing of bundle transactions.
use crate::tasks::bundle::BundleRequest;
use alloy::{
    eips::Encodable2718,
    network::{EthereumWallet, NetworkWallet, TransactionBuilder},
    primitives::{Address, Bytes, TxHash, keccak256},
    rpc::types::TransactionRequest,
};
use serde::Serialize;
use std::future::Future;

/// A signed, EIP-2718 encoded transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignedTx {
    /// Transaction hash reported by the signer.
    pub hash: TxHash,
    /// Raw encoded transaction.
    pub raw: Bytes,
}

impl SignedTx {
    /// Creates a [`SignedTx`] from raw bytes, hashing them locally.
    pub fn from_raw(raw: Bytes) -> Self {
        Self { hash: keccak256(&raw), raw }
    }

    /// Hash of the raw bytes, which is the hash the transaction will have
    /// on chain.
    pub fn expected_hash(&self) -> TxHash {
        keccak256(&self.raw)
    }
}

/// Error produced while signing a transaction.
#[derive(Debug, thiserror::Error)]
#[error("failed to sign transaction: {0}")]
pub struct SignerError(pub String);

/// Produces signed envelopes for bundle requests.
pub trait BundleSigner: Send + Sync + 'static {
    /// Address of the signing key.
    fn address(&self) -> Address;

    /// Signs `request`.
    fn sign(&self, request: &BundleRequest) -> impl Future<Output = Result<SignedTx, SignerError>> + Send;
}

/// A [`BundleSigner`] backed by an [`EthereumWallet`].
#[derive(Debug, Clone)]
pub struct WalletSigner {
    wallet: EthereumWallet,
}

impl WalletSigner {
    /// Wraps a wallet or anything convertible into one, e.g. a local or AWS
    /// signer.
    pub fn new(wallet: impl Into<EthereumWallet>) -> Self {
        Self { wallet: wallet.into() }
    }
}

impl BundleSigner for WalletSigner {
    fn address(&self) -> Address {
        NetworkWallet::<alloy::network::Ethereum>::default_signer_address(&self.wallet)
    }

    async fn sign(&self, request: &BundleRequest) -> Result<SignedTx, SignerError> {
        let tx = TransactionRequest::default()
            .with_from(self.address())
            .with_to(request.to)
            .with_input(request.data.clone())
            .with_nonce(request.nonce)
            .with_gas_limit(request.gas_limit)
            .with_gas_price(request.gas_price)
            .with_value(request.value)
            .with_chain_id(request.chain_id);

        let envelope = tx.build(&self.wallet).await.map_err(|err| SignerError(err.to_string()))?;

        Ok(SignedTx { hash: *envelope.tx_hash(), raw: envelope.encoded_2718().into() })
    }
}
