//! Chain access used by the monitor, the bundle builder and the confirmer.
//!
//! [`ChainClient`] covers the pull-based queries and [`PendingFeed`] the
//! push-based pending transaction subscription. [`AlloyChain`] implements both
//! over any alloy [`Provider`]. [`WsFeed`] connects its websocket only when a
//! subscription is requested.
use alloy::{
    consensus::Transaction as ConsensusTx,
    eips::BlockNumberOrTag,
    network::{Ethereum, TransactionResponse},
    primitives::{Address, Bytes, TxHash},
    providers::{Provider, RootProvider},
    rpc::types::{Transaction, TransactionRequest},
    transports::TransportError,
};
use serde::Serialize;
use std::{future::Future, pin::Pin};
use tokio_stream::{Stream, StreamExt};

/// A stream of pending transaction hashes.
pub type PendingStream = Pin<Box<dyn Stream<Item = TxHash> + Send>>;

/// Result type for chain queries.
pub type ChainResult<T> = Result<T, ChainError>;

/// Errors returned by a [`ChainClient`].
#[derive(Debug, thiserror::Error)]
pub enum ChainError {
    /// The RPC transport failed or the node returned an error.
    #[error("rpc error: {0}")]
    Transport(#[from] TransportError),
    /// The node could not serve the request.
    #[error("chain unavailable: {0}")]
    Unavailable(String),
}

/// A normalized, possibly partial view of a chain transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionCandidate {
    /// Transaction hash.
    pub id: TxHash,
    /// Recipient, `None` for contract creation.
    pub to: Option<Address>,
    /// Calldata.
    pub data: Option<Bytes>,
    /// Legacy gas price, or max fee per gas for dynamic fee transactions.
    pub gas_price: Option<u128>,
    /// Sender.
    pub from: Option<Address>,
}

impl TransactionCandidate {
    /// Returns the 4-byte selector of the calldata, if there is one.
    pub fn selector(&self) -> Option<[u8; 4]> {
        let data = self.data.as_ref()?;
        data.get(..4).and_then(|s| s.try_into().ok())
    }
}

impl From<&Transaction> for TransactionCandidate {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: TransactionResponse::tx_hash(tx),
            to: ConsensusTx::to(tx),
            data: Some(ConsensusTx::input(tx).clone()),
            gas_price: Some(
                ConsensusTx::gas_price(tx).unwrap_or_else(|| ConsensusTx::max_fee_per_gas(tx)),
            ),
            from: Some(TransactionResponse::from(tx)),
        }
    }
}

/// Pull-based chain queries.
pub trait ChainClient: Send + Sync + 'static {
    /// Latest block number.
    fn block_number(&self) -> impl Future<Output = ChainResult<u64>> + Send;

    /// Current network gas price in wei.
    fn gas_price(&self) -> impl Future<Output = ChainResult<u128>> + Send;

    /// Transaction count (next nonce) of `address`.
    fn transaction_count(&self, address: Address) -> impl Future<Output = ChainResult<u64>> + Send;

    /// Fetches a transaction by hash. `None` if the node does not know it.
    fn transaction_by_hash(
        &self,
        hash: TxHash,
    ) -> impl Future<Output = ChainResult<Option<TransactionCandidate>>> + Send;

    /// Fetches the transactions of block `number`. `None` if the block does
    /// not exist yet.
    fn block_transactions(
        &self,
        number: u64,
    ) -> impl Future<Output = ChainResult<Option<Vec<TransactionCandidate>>>> + Send;

    /// Read-only call against `to`.
    fn call(&self, to: Address, data: Bytes) -> impl Future<Output = ChainResult<Bytes>> + Send;

    /// Broadcasts a signed transaction.
    fn send_raw_transaction(&self, raw: Bytes) -> impl Future<Output = ChainResult<TxHash>> + Send;
}

/// Push-based pending transaction notifications.
pub trait PendingFeed: Send + Sync + 'static {
    /// Subscribes to new pending transaction hashes.
    fn subscribe_pending(&self) -> impl Future<Output = ChainResult<PendingStream>> + Send;
}

/// [`ChainClient`] and [`PendingFeed`] over an alloy provider.
#[derive(Debug, Clone)]
pub struct AlloyChain<P> {
    provider: P,
}

impl<P> AlloyChain<P> {
    /// Wraps `provider`.
    pub const fn new(provider: P) -> Self {
        Self { provider }
    }

    /// Returns a reference to the inner provider.
    pub const fn provider(&self) -> &P {
        &self.provider
    }
}

impl<P> ChainClient for AlloyChain<P>
where
    P: Provider + Send + Sync + 'static,
{
    async fn block_number(&self) -> ChainResult<u64> {
        self.provider.get_block_number().await.map_err(Into::into)
    }

    async fn gas_price(&self) -> ChainResult<u128> {
        self.provider.get_gas_price().await.map_err(Into::into)
    }

    async fn transaction_count(&self, address: Address) -> ChainResult<u64> {
        self.provider.get_transaction_count(address).await.map_err(Into::into)
    }

    async fn transaction_by_hash(&self, hash: TxHash) -> ChainResult<Option<TransactionCandidate>> {
        let tx = self.provider.get_transaction_by_hash(hash).await?;
        Ok(tx.as_ref().map(TransactionCandidate::from))
    }

    async fn block_transactions(&self, number: u64) -> ChainResult<Option<Vec<TransactionCandidate>>> {
        let block =
            self.provider.get_block_by_number(BlockNumberOrTag::Number(number)).full().await?;
        Ok(block.map(|block| block.transactions.txns().map(TransactionCandidate::from).collect()))
    }

    async fn call(&self, to: Address, data: Bytes) -> ChainResult<Bytes> {
        let req = TransactionRequest::default().to(to).input(data.into());
        self.provider.call(req).await.map_err(Into::into)
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> ChainResult<TxHash> {
        let pending = self.provider.send_raw_transaction(&raw).await?;
        Ok(*pending.tx_hash())
    }
}

impl<P> PendingFeed for AlloyChain<P>
where
    P: Provider + Send + Sync + 'static,
{
    async fn subscribe_pending(&self) -> ChainResult<PendingStream> {
        let sub = self.provider.subscribe_pending_transactions().await?;
        Ok(Box::pin(sub.into_stream()))
    }
}

/// A [`PendingFeed`] that opens a websocket per subscription.
///
/// Nothing is connected until [`PendingFeed::subscribe_pending`] is called,
/// so a missing or unreachable websocket endpoint only affects the pending
/// loop of a monitor.
#[derive(Debug, Clone, Default)]
pub struct WsFeed {
    ws_url: Option<String>,
}

impl WsFeed {
    /// Creates a feed for `ws_url`. `None` makes every subscription fail.
    pub const fn new(ws_url: Option<String>) -> Self {
        Self { ws_url }
    }

    /// The websocket endpoint, if any.
    pub fn ws_url(&self) -> Option<&str> {
        self.ws_url.as_deref()
    }
}

impl PendingFeed for WsFeed {
    async fn subscribe_pending(&self) -> ChainResult<PendingStream> {
        let ws_url = self
            .ws_url
            .as_deref()
            .ok_or_else(|| ChainError::Unavailable("no websocket url configured".into()))?;

        let provider = RootProvider::<Ethereum>::connect(ws_url).await?;
        let sub = provider.subscribe_pending_transactions().await?;

        // The provider owns the websocket connection and must outlive the stream.
        Ok(Box::pin(sub.into_stream().map(move |hash| {
            let _ = &provider;
            hash
        })))
    }
}
