//! Constants used in the executor.

/// Sepolia chain ID, the default signing chain.
pub const SEPOLIA_CHAIN_ID: u64 = 11155111;
/// Flashbots relay used when `FLASHBOTS_ENDPOINT` is not set.
pub const DEFAULT_RELAY_URL: &str = "https://relay-sepolia.flashbots.net";
/// Pending notifications between progress logs.
pub const PENDING_LOG_EVERY: u64 = 100;
