//! Test utilities for testing executor tasks
use crate::{
    abi::IPresaleNft,
    chain::{ChainClient, ChainError, ChainResult, PendingFeed, PendingStream, TransactionCandidate},
    config::ExecutorConfig,
    constants::SEPOLIA_CHAIN_ID,
    signer::WalletSigner,
    tasks::{
        bundle::BundleSettings,
        submit::{RelayClient, RelayError},
    },
};
use alloy::{
    primitives::{Address, B256, Bytes, Selector, TxHash, keccak256},
    signers::{Signer, local::PrivateKeySigner},
    sol_types::SolCall,
};
use init4_bin_base::deps::tracing_subscriber::{
    EnvFilter, Layer, fmt, layer::SubscriberExt, registry, util::SubscriberInitExt,
};
use serde_json::{Value, json};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Well-known development key used by the test signer.
pub const TEST_KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

/// Contract watched in tests.
pub const TEST_CONTRACT: Address = Address::repeat_byte(0x11);

/// Sets up an executor config with test values
pub fn setup_test_config() -> ExecutorConfig {
    ExecutorConfig {
        rpc_url: "http://localhost:8545".parse().unwrap(),
        ws_url: Some("ws://localhost:8546".into()),
        executor_key: TEST_KEY.into(),
        target_contract: TEST_CONTRACT,
        trigger_selector: None,
        flashbots_endpoint: None,
        execution_mode: None,
        chain_id: SEPOLIA_CHAIN_ID,
        monitor_timeout_ms: 5_000,
        poll_interval_ms: 3_000,
        status_interval_ms: 30_000,
        seen_capacity: 10_000,
        confirmation_blocks: 5,
        block_time_ms: 12_000,
        trigger_gas_limit: 100_000,
        action_gas_limit: 150_000,
        trigger_markup_pct: 110,
        action_markup_pct: 150,
        detected_markup_pct: 110,
        presale_amount: 1,
        presale_unit_price_wei: 10_000_000_000_000_000,
        broadcast_fallback: false,
    }
}

/// Bundle settings matching [`setup_test_config`].
pub fn test_bundle_settings() -> BundleSettings {
    setup_test_config().bundle_settings()
}

/// Initializes a logger that prints during testing
pub fn setup_logging() {
    // Initialize logging
    let filter = EnvFilter::from_default_env();
    let fmt = fmt::layer().with_filter(filter);
    let registry = registry().with(fmt);
    let _ = registry.try_init();
}

/// Private key signer for [`TEST_KEY`].
pub fn test_key() -> PrivateKeySigner {
    TEST_KEY.parse().unwrap()
}

/// Bundle signer for [`TEST_KEY`].
pub fn test_signer() -> WalletSigner {
    WalletSigner::new(test_key())
}

/// Returns a candidate with the given hash, recipient and calldata.
pub fn candidate(id: TxHash, to: Option<Address>, data: Option<Bytes>) -> TransactionCandidate {
    TransactionCandidate { id, to, data, gas_price: None, from: None }
}

/// Returns an `enablePresale()` call to [`TEST_CONTRACT`] priced at
/// `gas_price`.
pub fn trigger_candidate(id: TxHash, gas_price: u128) -> TransactionCandidate {
    TransactionCandidate {
        id,
        to: Some(TEST_CONTRACT),
        data: Some(IPresaleNft::enablePresaleCall {}.abi_encode().into()),
        gas_price: Some(gas_price),
        from: Some(Address::repeat_byte(0xee)),
    }
}

/// A [`MockChain`] at block 100 whose contract is owned by the test signer,
/// with the presale not yet active.
pub fn test_chain() -> Arc<MockChain> {
    let chain = MockChain::new();
    chain.set_head(100);
    chain.set_owner(Signer::address(&test_key()));
    chain.set_presale_active(false);
    Arc::new(chain)
}

#[derive(Debug, Default)]
struct MockChainState {
    gas_price: u128,
    nonces: HashMap<Address, u64>,
    pending: HashMap<TxHash, TransactionCandidate>,
    blocks: HashMap<u64, Vec<TransactionCandidate>>,
    calls: HashMap<Selector, Bytes>,
    broadcasts: Vec<Bytes>,
}

/// An in-memory chain implementing [`ChainClient`] and [`PendingFeed`].
#[derive(Debug)]
pub struct MockChain {
    head: AtomicU64,
    state: Mutex<MockChainState>,
    nonce_queries: AtomicUsize,
    lookups: AtomicUsize,
    feed_tx: mpsc::UnboundedSender<TxHash>,
    feed_rx: Mutex<Option<mpsc::UnboundedReceiver<TxHash>>>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChain {
    /// Creates an empty chain at block 0 with a 1 gwei gas price.
    pub fn new() -> Self {
        let (feed_tx, feed_rx) = mpsc::unbounded_channel();
        Self {
            head: AtomicU64::new(0),
            state: Mutex::new(MockChainState { gas_price: 1_000_000_000, ..Default::default() }),
            nonce_queries: AtomicUsize::new(0),
            lookups: AtomicUsize::new(0),
            feed_tx,
            feed_rx: Mutex::new(Some(feed_rx)),
        }
    }

    /// Sets the chain head.
    pub fn set_head(&self, number: u64) {
        self.head.store(number, Ordering::SeqCst);
    }

    /// The chain head.
    pub fn head(&self) -> u64 {
        self.head.load(Ordering::SeqCst)
    }

    /// Sets the network gas price.
    pub fn set_gas_price(&self, gas_price: u128) {
        self.state.lock().unwrap().gas_price = gas_price;
    }

    /// Sets the transaction count of `address`.
    pub fn set_nonce(&self, address: Address, nonce: u64) {
        self.state.lock().unwrap().nonces.insert(address, nonce);
    }

    /// Number of transaction count queries served.
    pub fn nonce_queries(&self) -> usize {
        self.nonce_queries.load(Ordering::SeqCst)
    }

    /// Number of transaction-by-hash lookups served.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    /// Makes `candidate` available to pending lookups.
    pub fn add_pending(&self, candidate: TransactionCandidate) {
        self.state.lock().unwrap().pending.insert(candidate.id, candidate);
    }

    /// Emits a pending notification for `hash`.
    pub fn notify_pending(&self, hash: TxHash) {
        let _ = self.feed_tx.send(hash);
    }

    /// Mines block `number`, moving the head forward if needed.
    pub fn add_block(&self, number: u64, txs: Vec<TransactionCandidate>) {
        self.state.lock().unwrap().blocks.insert(number, txs);
        self.head.fetch_max(number, Ordering::SeqCst);
    }

    /// Makes the `owner()` call return `owner`.
    pub fn set_owner(&self, owner: Address) {
        self.state
            .lock()
            .unwrap()
            .calls
            .insert(IPresaleNft::ownerCall::SELECTOR.into(), owner.into_word().0.to_vec().into());
    }

    /// Makes the `isPresaleActive()` call return `active`.
    pub fn set_presale_active(&self, active: bool) {
        self.state.lock().unwrap().calls.insert(
            IPresaleNft::isPresaleActiveCall::SELECTOR.into(),
            B256::with_last_byte(active as u8).0.to_vec().into(),
        );
    }

    /// Makes pending subscriptions fail.
    pub fn disable_pending_feed(&self) {
        self.feed_rx.lock().unwrap().take();
    }

    /// Raw transactions broadcast so far.
    pub fn broadcasts(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().broadcasts.clone()
    }
}

impl ChainClient for MockChain {
    async fn block_number(&self) -> ChainResult<u64> {
        Ok(self.head())
    }

    async fn gas_price(&self) -> ChainResult<u128> {
        Ok(self.state.lock().unwrap().gas_price)
    }

    async fn transaction_count(&self, address: Address) -> ChainResult<u64> {
        self.nonce_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().unwrap().nonces.get(&address).copied().unwrap_or_default())
    }

    async fn transaction_by_hash(&self, hash: TxHash) -> ChainResult<Option<TransactionCandidate>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().unwrap().pending.get(&hash).cloned())
    }

    async fn block_transactions(&self, number: u64) -> ChainResult<Option<Vec<TransactionCandidate>>> {
        Ok(self.state.lock().unwrap().blocks.get(&number).cloned())
    }

    async fn call(&self, _to: Address, data: Bytes) -> ChainResult<Bytes> {
        let selector = data
            .get(..4)
            .map(Selector::from_slice)
            .ok_or_else(|| ChainError::Unavailable("calldata too short".into()))?;
        self.state
            .lock()
            .unwrap()
            .calls
            .get(&selector)
            .cloned()
            .ok_or_else(|| ChainError::Unavailable("execution reverted".into()))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> ChainResult<TxHash> {
        let hash = keccak256(&raw);
        self.state.lock().unwrap().broadcasts.push(raw);
        Ok(hash)
    }
}

impl PendingFeed for MockChain {
    async fn subscribe_pending(&self) -> ChainResult<PendingStream> {
        let rx = self
            .feed_rx
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ChainError::Unavailable("pending subscriptions unsupported".into()))?;
        Ok(Box::pin(UnboundedReceiverStream::new(rx)))
    }
}

/// A [`RelayClient`] that records bundles instead of sending them.
#[derive(Debug, Default)]
pub struct MockRelay {
    bundles: Mutex<Vec<(Vec<Bytes>, u64)>>,
    reject: Option<String>,
    mine_into: Option<Arc<MockChain>>,
}

impl MockRelay {
    /// Accepts every bundle.
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects every bundle with `message`.
    pub fn rejecting(message: &str) -> Self {
        Self { reject: Some(message.to_owned()), ..Default::default() }
    }

    /// Accepts every bundle and mines it into `chain` at its target block.
    pub fn mining_into(chain: Arc<MockChain>) -> Self {
        Self { mine_into: Some(chain), ..Default::default() }
    }

    /// Bundles received so far, with their target blocks.
    pub fn bundles(&self) -> Vec<(Vec<Bytes>, u64)> {
        self.bundles.lock().unwrap().clone()
    }
}

impl RelayClient for MockRelay {
    async fn send_bundle(&self, txs: Vec<Bytes>, target_block: u64) -> Result<B256, RelayError> {
        if let Some(message) = &self.reject {
            return Err(RelayError::Rejected(message.clone()));
        }

        if let Some(chain) = &self.mine_into {
            let mined = txs.iter().map(|raw| candidate(keccak256(raw), None, None)).collect();
            chain.add_block(target_block, mined);
        }

        let mut bundles = self.bundles.lock().unwrap();
        bundles.push((txs, target_block));
        Ok(B256::with_last_byte(bundles.len() as u8))
    }

    async fn bundle_stats(&self, bundle_hash: B256, target_block: u64) -> Result<Value, RelayError> {
        Ok(json!({ "bundleHash": bundle_hash, "blockNumber": target_block, "isSimulated": true }))
    }
}
