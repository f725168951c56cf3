use crate::chain::TransactionCandidate;
use alloy::primitives::{Address, Selector};

/// Result of classifying a [`TransactionCandidate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Classification {
    /// The candidate is addressed to the watched contract.
    pub is_target_contract: bool,
    /// The candidate calls the trigger function on the watched contract.
    pub is_trigger: bool,
}

/// Decides whether a transaction is the trigger call on the watched contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classifier {
    contract: Address,
    selector: Selector,
}

impl Classifier {
    /// Creates a classifier for `selector` calls to `contract`.
    pub const fn new(contract: Address, selector: Selector) -> Self {
        Self { contract, selector }
    }

    /// The watched contract.
    pub const fn contract(&self) -> Address {
        self.contract
    }

    /// The trigger selector.
    pub const fn selector(&self) -> Selector {
        self.selector
    }

    /// Classifies `candidate`. Missing fields never match.
    pub fn classify(&self, candidate: &TransactionCandidate) -> Classification {
        // Address equality is byte equality, so checksum casing never matters.
        let is_target_contract = candidate.to == Some(self.contract);
        let is_trigger = is_target_contract
            && candidate
                .data
                .as_ref()
                .is_some_and(|data| data.starts_with(self.selector.as_slice()));

        Classification { is_target_contract, is_trigger }
    }
}
