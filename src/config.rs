use crate::{
    chain::{AlloyChain, WsFeed},
    constants,
    tasks::{
        bundle::{BundleBuilder, BundleSettings},
        monitor::{Classifier, MonitorSettings},
        submit::{BundleSubmitter, Flashbots},
        supervisor::{ExecutionMode, Supervisor, SupervisorSettings},
    },
    signer::{BundleSigner, WalletSigner},
    utils,
};
use alloy::{
    network::Ethereum,
    primitives::{Address, Selector},
    providers::RootProvider,
    sol_types::SolCall,
};
use init4_bin_base::utils::{from_env::FromEnv, signer::LocalOrAws};
use std::{sync::Arc, time::Duration};
use tracing::warn;

/// Chain access over HTTP.
pub type HttpChain = AlloyChain<RootProvider<Ethereum>>;

/// The supervisor wired against live infrastructure.
pub type ExecutorSupervisor = Supervisor<HttpChain, WsFeed, WalletSigner, Flashbots>;

/// Errors produced while interpreting the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// `EXECUTION_MODE` holds an unknown value.
    #[error("unknown execution mode {0:?}, expected \"direct\" or \"monitor\"")]
    InvalidMode(String),
    /// No websocket URL was given and none could be derived.
    #[error("cannot derive a websocket url from {0}")]
    WsUrl(url::Url),
}

/// Configuration for a single executor run against one target contract.
#[derive(Debug, Clone, FromEnv)]
pub struct ExecutorConfig {
    /// URL for the chain RPC node.
    #[from_env(var = "CHAIN_RPC_URL", desc = "URL for the chain RPC node, http:// or https://")]
    pub rpc_url: url::Url,

    /// Websocket URL for pending transaction notifications.
    #[from_env(
        var = "CHAIN_WS_URL",
        desc = "Websocket URL for pending transaction notifications. Derived from CHAIN_RPC_URL if unset",
        infallible,
        optional
    )]
    pub ws_url: Option<String>,

    /// Key of the executing account - AWS Key ID _OR_ local private key.
    #[from_env(
        var = "EXECUTOR_KEY",
        desc = "Key of the executing account - AWS Key ID _OR_ local private key",
        infallible
    )]
    pub executor_key: String,

    /// Contract whose trigger call is watched and acted upon.
    #[from_env(var = "TARGET_CONTRACT", desc = "Address of the watched contract")]
    pub target_contract: Address,

    /// Selector of the trigger call. Defaults to `enablePresale()`.
    #[from_env(
        var = "TRIGGER_SELECTOR",
        desc = "4-byte selector of the trigger call, hex encoded. Defaults to enablePresale()",
        optional
    )]
    pub trigger_selector: Option<Selector>,

    /// Flashbots relay endpoint.
    #[from_env(
        var = "FLASHBOTS_ENDPOINT",
        desc = "Flashbots relay endpoint for private bundle submission",
        optional
    )]
    pub flashbots_endpoint: Option<url::Url>,

    /// Execution mode, `direct` or `monitor`.
    #[from_env(
        var = "EXECUTION_MODE",
        desc = "Execution mode: direct submits the fallback bundle immediately, monitor watches for the trigger first",
        optional
    )]
    pub execution_mode: Option<ExecutionMode>,

    /// Chain ID used for signing.
    #[from_env(var = "CHAIN_ID", desc = "Chain ID used for signing", default = 11155111)]
    pub chain_id: u64,

    /// Monitoring window before falling back to direct execution.
    #[from_env(
        var = "MONITOR_TIMEOUT_MS",
        desc = "Milliseconds to watch for the trigger before falling back to direct execution",
        default = 300000
    )]
    pub monitor_timeout_ms: u64,

    /// Interval between block polls.
    #[from_env(var = "POLL_INTERVAL_MS", desc = "Milliseconds between block polls", default = 3000)]
    pub poll_interval_ms: u64,

    /// Interval between monitoring status reports.
    #[from_env(
        var = "STATUS_INTERVAL_MS",
        desc = "Milliseconds between monitoring status reports",
        default = 30000
    )]
    pub status_interval_ms: u64,

    /// Capacity of the seen transaction set.
    #[from_env(
        var = "SEEN_CAPACITY",
        desc = "Number of transaction hashes remembered for deduplication",
        default = 10000
    )]
    pub seen_capacity: usize,

    /// Number of blocks checked for bundle inclusion.
    #[from_env(
        var = "CONFIRMATION_BLOCKS",
        desc = "Number of blocks checked for bundle inclusion after submission",
        default = 5
    )]
    pub confirmation_blocks: u64,

    /// Expected block interval.
    #[from_env(var = "BLOCK_TIME_MS", desc = "Expected block interval in milliseconds", default = 12000)]
    pub block_time_ms: u64,

    /// Gas limit of the trigger call.
    #[from_env(var = "TRIGGER_GAS_LIMIT", desc = "Gas limit of the trigger call", default = 100000)]
    pub trigger_gas_limit: u64,

    /// Gas limit of the dependent action.
    #[from_env(var = "ACTION_GAS_LIMIT", desc = "Gas limit of the dependent action", default = 150000)]
    pub action_gas_limit: u64,

    /// Gas price markup of the trigger call, as a percentage.
    #[from_env(
        var = "TRIGGER_MARKUP_PCT",
        desc = "Gas price markup of the trigger call, as a percentage",
        default = 110
    )]
    pub trigger_markup_pct: u64,

    /// Gas price markup of the dependent action, as a percentage.
    #[from_env(
        var = "ACTION_MARKUP_PCT",
        desc = "Gas price markup of the dependent action, as a percentage",
        default = 150
    )]
    pub action_markup_pct: u64,

    /// Markup applied to a detected trigger's gas price, as a percentage.
    #[from_env(
        var = "DETECTED_MARKUP_PCT",
        desc = "Markup applied to the detected trigger's gas price before per-action markups, as a percentage",
        default = 110
    )]
    pub detected_markup_pct: u64,

    /// Number of units bought by the dependent action.
    #[from_env(var = "PRESALE_AMOUNT", desc = "Number of units bought by the dependent action", default = 1)]
    pub presale_amount: u64,

    /// Price of one unit in wei.
    #[from_env(
        var = "PRESALE_UNIT_PRICE_WEI",
        desc = "Price of one unit in wei",
        default = 10000000000000000
    )]
    pub presale_unit_price_wei: u128,

    /// Whether a fallback bundle that misses the confirmation window is
    /// broadcast publicly.
    #[from_env(
        var = "BROADCAST_FALLBACK",
        desc = "Broadcast the fallback transactions publicly if the bundle is not included",
        default = false
    )]
    pub broadcast_fallback: bool,
}

impl ExecutorConfig {
    /// Execution mode, `direct` unless configured otherwise.
    pub fn mode(&self) -> ExecutionMode {
        self.execution_mode.unwrap_or_default()
    }

    /// Selector of the trigger call.
    pub fn trigger_selector(&self) -> Selector {
        self.trigger_selector.unwrap_or(crate::abi::IPresaleNft::enablePresaleCall::SELECTOR.into())
    }

    /// Flashbots relay URL.
    pub fn relay_url(&self) -> Result<url::Url, url::ParseError> {
        match &self.flashbots_endpoint {
            Some(url) => Ok(url.clone()),
            None => url::Url::parse(constants::DEFAULT_RELAY_URL),
        }
    }

    /// Websocket URL for the pending feed, derived from the RPC URL if not
    /// configured.
    pub fn ws_url(&self) -> Result<String, ConfigError> {
        match &self.ws_url {
            Some(url) => Ok(url.clone()),
            None => utils::ws_url_from_http(&self.rpc_url)
                .ok_or_else(|| ConfigError::WsUrl(self.rpc_url.clone())),
        }
    }

    /// Expected block interval.
    pub const fn block_interval(&self) -> Duration {
        Duration::from_millis(self.block_time_ms)
    }

    /// Classifier for the watched contract and trigger selector.
    pub fn classifier(&self) -> Classifier {
        Classifier::new(self.target_contract, self.trigger_selector())
    }

    /// Pricing and payload settings for the bundle builder.
    pub const fn bundle_settings(&self) -> BundleSettings {
        BundleSettings {
            contract: self.target_contract,
            chain_id: self.chain_id,
            trigger_gas_limit: self.trigger_gas_limit,
            action_gas_limit: self.action_gas_limit,
            trigger_markup_pct: self.trigger_markup_pct,
            action_markup_pct: self.action_markup_pct,
            detected_markup_pct: self.detected_markup_pct,
            presale_amount: self.presale_amount,
            unit_price_wei: self.presale_unit_price_wei,
        }
    }

    /// Monitor loop settings.
    pub const fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            status_interval: Duration::from_millis(self.status_interval_ms),
            seen_capacity: self.seen_capacity,
        }
    }

    /// Supervisor settings.
    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            mode: self.mode(),
            monitor_timeout: Duration::from_millis(self.monitor_timeout_ms),
            confirmation_blocks: self.confirmation_blocks,
            broadcast_fallback: self.broadcast_fallback,
            monitor: self.monitor_settings(),
        }
    }

    /// Connect to the executor signer.
    pub async fn connect_signer(&self) -> eyre::Result<LocalOrAws> {
        LocalOrAws::load(&self.executor_key, Some(self.chain_id)).await.map_err(Into::into)
    }

    /// Connect to the chain over HTTP.
    pub fn connect_chain(&self) -> HttpChain {
        AlloyChain::new(RootProvider::new_http(self.rpc_url.clone()))
    }

    /// Pending transaction feed over a websocket. The connection is opened
    /// by the monitor, so this never fails. Without a usable websocket URL the
    /// monitor relies on block polling alone.
    pub fn pending_feed(&self) -> WsFeed {
        match self.ws_url() {
            Ok(ws_url) => WsFeed::new(Some(ws_url)),
            Err(err) => {
                if self.mode() == ExecutionMode::Monitor {
                    warn!(%err, "pending feed disabled");
                }
                WsFeed::new(None)
            }
        }
    }

    /// Connect to the Flashbots relay, authenticating with `signer`.
    pub fn connect_flashbots(&self, signer: LocalOrAws) -> eyre::Result<Flashbots> {
        Ok(Flashbots::new(self.relay_url()?, signer))
    }

    /// Assembles a supervisor from already connected parts.
    pub fn supervisor<C, F, S, R>(
        &self,
        chain: Arc<C>,
        feed: Arc<F>,
        signer: S,
        relay: R,
    ) -> Supervisor<C, F, S, R>
    where
        C: crate::chain::ChainClient,
        F: crate::chain::PendingFeed,
        S: BundleSigner,
        R: crate::tasks::submit::RelayClient,
    {
        let builder = BundleBuilder::new(self.bundle_settings(), signer.address());
        let submitter = BundleSubmitter::new(chain.clone(), signer, relay, self.block_interval());
        Supervisor::new(chain, feed, self.classifier(), builder, submitter, self.supervisor_settings())
    }

    /// Connect every collaborator and assemble the supervisor.
    pub async fn connect_supervisor(&self) -> eyre::Result<ExecutorSupervisor> {
        let signer = self.connect_signer().await?;
        let relay = self.connect_flashbots(signer.clone())?;
        let chain = Arc::new(self.connect_chain());
        let feed = Arc::new(self.pending_feed());

        Ok(self.supervisor(chain, feed, WalletSigner::new(signer), relay))
    }
}
