//! Contract interface of the watched presale contract.
use alloy::sol;

sol! {
    /// The gated presale NFT contract.
    #[derive(Debug)]
    interface IPresaleNft {
        /// Opens the presale. Owner only.
        function enablePresale() external;
        /// Mints `amount` tokens during the presale.
        function presale(uint256 amount) external payable;
        /// Whether the presale is open.
        function isPresaleActive() external view returns (bool);
        /// The contract owner.
        function owner() external view returns (address);
    }
}

#[cfg(test)]
mod tests {
    use super::IPresaleNft;
    use alloy::sol_types::SolCall;

    #[test]
    fn enable_presale_selector() {
        assert_eq!(IPresaleNft::enablePresaleCall::SELECTOR, [0xa8, 0xea, 0xc4, 0x92]);
    }
}
