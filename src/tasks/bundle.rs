//! Bundle construction.
//!
//! A bundle is an ordered plan of [`BundleAction`]s turned into fully priced
//! [`BundleRequest`]s with contiguous nonces starting at the sender's current
//! transaction count.
use crate::{
    abi::IPresaleNft,
    chain::{ChainClient, ChainError},
    utils::apply_markup,
};
use alloy::{
    primitives::{Address, Bytes, U256},
    sol_types::SolCall,
};
use serde::Serialize;
use tracing::{debug, instrument};

/// A step in a bundle plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleAction {
    /// The trigger call, e.g. `enablePresale()`.
    Trigger,
    /// The dependent call, e.g. `presale(amount)` paying the unit price.
    Action,
}

/// Which plan to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BundleMode {
    /// The trigger was observed. Only the dependent action is sent.
    Triggered,
    /// No trigger was observed. The executor sends the trigger itself,
    /// followed by the dependent action.
    Fallback,
}

impl BundleMode {
    /// Ordered actions of this plan.
    pub const fn actions(self) -> &'static [BundleAction] {
        match self {
            Self::Triggered => &[BundleAction::Action],
            Self::Fallback => &[BundleAction::Trigger, BundleAction::Action],
        }
    }
}

/// A fully specified, unsigned bundle transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BundleRequest {
    /// Position in the bundle.
    pub ordinal: u32,
    /// The action this request performs.
    pub action: BundleAction,
    /// Recipient.
    pub to: Address,
    /// Calldata.
    pub data: Bytes,
    /// Sender nonce.
    pub nonce: u64,
    /// Gas limit.
    pub gas_limit: u64,
    /// Legacy gas price in wei.
    pub gas_price: u128,
    /// Value in wei.
    pub value: U256,
    /// Signing chain ID.
    pub chain_id: u64,
}

/// Errors produced while building a bundle.
#[derive(Debug, thiserror::Error)]
pub enum BundleError {
    /// The plan or its inputs are unusable.
    #[error("invalid bundle: {0}")]
    InvalidBundle(&'static str),
    /// Nonces are not contiguous.
    #[error("nonce gap at ordinal {ordinal}: expected {expected}, found {found}")]
    NonceGap {
        /// Ordinal of the offending request.
        ordinal: u32,
        /// Expected nonce.
        expected: u64,
        /// Actual nonce.
        found: u64,
    },
    /// Fetching the nonce or gas price failed.
    #[error(transparent)]
    Chain(#[from] ChainError),
}

/// Pricing and payload parameters of the bundle transactions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleSettings {
    /// Contract both calls are sent to.
    pub contract: Address,
    /// Signing chain ID.
    pub chain_id: u64,
    /// Gas limit of the trigger call.
    pub trigger_gas_limit: u64,
    /// Gas limit of the dependent action.
    pub action_gas_limit: u64,
    /// Markup on the basis price for the trigger call, in percent.
    pub trigger_markup_pct: u64,
    /// Markup on the basis price for the dependent action, in percent.
    pub action_markup_pct: u64,
    /// Markup on a detected trigger's gas price, in percent.
    pub detected_markup_pct: u64,
    /// Units bought by the dependent action.
    pub presale_amount: u64,
    /// Price of one unit in wei.
    pub unit_price_wei: u128,
}

/// Builds priced, nonce-ordered bundle requests for one sender.
#[derive(Debug, Clone)]
pub struct BundleBuilder {
    settings: BundleSettings,
    sender: Address,
}

impl BundleBuilder {
    /// Creates a builder for transactions from `sender`.
    pub const fn new(settings: BundleSettings, sender: Address) -> Self {
        Self { settings, sender }
    }

    /// The sending account.
    pub const fn sender(&self) -> Address {
        self.sender
    }

    /// The builder settings.
    pub const fn settings(&self) -> &BundleSettings {
        &self.settings
    }

    /// Builds the plan for `mode`.
    ///
    /// `pricing_hint` is the gas price of the observed trigger. When present
    /// it is marked up and used as the basis price instead of the network
    /// gas price.
    pub async fn build<C: ChainClient>(
        &self,
        chain: &C,
        mode: BundleMode,
        pricing_hint: Option<u128>,
    ) -> Result<Vec<BundleRequest>, BundleError> {
        self.build_plan(chain, mode.actions(), pricing_hint).await
    }

    /// Builds requests for an explicit list of actions.
    ///
    /// The sender nonce is fetched once and assigned contiguously.
    #[instrument(skip(self, chain), fields(sender = %self.sender))]
    pub async fn build_plan<C: ChainClient>(
        &self,
        chain: &C,
        actions: &[BundleAction],
        pricing_hint: Option<u128>,
    ) -> Result<Vec<BundleRequest>, BundleError> {
        if actions.is_empty() {
            return Err(BundleError::InvalidBundle("bundle plan has no actions"));
        }

        let basis = match pricing_hint {
            Some(0) => return Err(BundleError::InvalidBundle("pricing hint must be positive")),
            Some(hint) => apply_markup(hint, self.settings.detected_markup_pct),
            None => chain.gas_price().await?,
        };

        let base_nonce = chain.transaction_count(self.sender).await?;
        debug!(basis, base_nonce, "pricing bundle");

        let requests: Vec<_> = actions
            .iter()
            .enumerate()
            .map(|(ordinal, action)| self.request(ordinal as u32, *action, base_nonce, basis))
            .collect();

        for request in &requests {
            debug!(
                ordinal = request.ordinal,
                action = ?request.action,
                nonce = request.nonce,
                gas_price = request.gas_price,
                gas_limit = request.gas_limit,
                value = %request.value,
                "bundle request"
            );
        }

        Ok(requests)
    }

    fn request(&self, ordinal: u32, action: BundleAction, base_nonce: u64, basis: u128) -> BundleRequest {
        let settings = &self.settings;
        let (data, value, gas_limit, markup) = match action {
            BundleAction::Trigger => (
                IPresaleNft::enablePresaleCall {}.abi_encode(),
                U256::ZERO,
                settings.trigger_gas_limit,
                settings.trigger_markup_pct,
            ),
            BundleAction::Action => (
                IPresaleNft::presaleCall { amount: U256::from(settings.presale_amount) }.abi_encode(),
                U256::from(settings.unit_price_wei) * U256::from(settings.presale_amount),
                settings.action_gas_limit,
                settings.action_markup_pct,
            ),
        };

        BundleRequest {
            ordinal,
            action,
            to: settings.contract,
            data: data.into(),
            nonce: base_nonce + ordinal as u64,
            gas_limit,
            gas_price: apply_markup(basis, markup),
            value,
            chain_id: settings.chain_id,
        }
    }
}

/// Checks that `requests` are ordered by ordinal with contiguous nonces.
pub fn validate_nonces(requests: &[BundleRequest]) -> Result<(), BundleError> {
    let Some(first) = requests.first() else {
        return Err(BundleError::InvalidBundle("bundle is empty"));
    };

    for (idx, request) in requests.iter().enumerate() {
        if request.ordinal as usize != idx {
            return Err(BundleError::InvalidBundle("requests are not in ordinal order"));
        }
        let expected = first.nonce + idx as u64;
        if request.nonce != expected {
            return Err(BundleError::NonceGap {
                ordinal: request.ordinal,
                expected,
                found: request.nonce,
            });
        }
    }
    Ok(())
}
