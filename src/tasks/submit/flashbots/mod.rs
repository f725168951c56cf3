//! Flashbots relay access

/// Signed JSON-RPC client for `eth_sendBundle` and bundle statistics.
pub mod provider;
pub use provider::Flashbots;
