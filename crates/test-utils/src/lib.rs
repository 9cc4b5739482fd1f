//! Shared test utilities for sqlkv crates.
//!
//! - [`TestDir`] - Managed temporary directory with database path helpers
//! - [`assert_strictly_increasing`] - Ordering assertion for ids and timestamps
//! - [`assert_eventually`] - Poll a condition until it's true or timeout
//! - [`corpus`] - Deterministic text for dictionary training
//! - [`strategies`] - Proptest generators
//! - `test_*_config` - Small configurations for fast tests

#![deny(unsafe_code)]
#![cfg_attr(test, allow(clippy::disallowed_methods))]

mod test_dir;
pub use test_dir::{DATABASE_FILE, TestDir};

mod assertions;
pub use assertions::{assert_eventually, assert_strictly_increasing};

mod config;
pub use config::{
    test_compression_config, test_counter_config, test_database_config, test_retry_config,
};

pub mod corpus;
pub mod strategies;
