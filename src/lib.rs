#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
mod macros;

pub mod abi;
pub mod chain;
pub mod config;
pub mod constants;
pub mod metrics;
pub mod signer;
pub mod tasks;
pub mod utils;

/// Test utilities
pub mod test_utils;

use openssl as _;
