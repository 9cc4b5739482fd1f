//! Test configuration helpers.
//!
//! Small, fast configurations so tests exercise reservation boundaries and
//! dictionary training without large fixtures.

use std::time::Duration;

use sqlkv_types::config::{CompressionConfig, CounterConfig, DatabaseConfig, RetryConfig};

/// Database configuration for tests.
///
/// - `reader_connections`: 2 (enough to exercise the pool)
/// - `busy_timeout`: 1s (fail fast on lock bugs)
#[must_use]
pub fn test_database_config() -> DatabaseConfig {
    DatabaseConfig {
        reader_connections: 2,
        statement_cache_capacity: 32,
        busy_timeout: Duration::from_secs(1),
        wal: true,
    }
}

/// Compression configuration for tests.
///
/// Keeps trained dictionaries at 2 KiB so training on a few hundred short
/// samples succeeds quickly.
#[must_use]
pub fn test_compression_config() -> CompressionConfig {
    CompressionConfig { level: 3, dictionary_max_size: 2048 }
}

/// Counter configuration with a small reserve.
///
/// - `start`: 1
/// - `reserve`: 10 (a persist every ten ids)
#[must_use]
pub fn test_counter_config() -> CounterConfig {
    CounterConfig { start: 1, reserve: 10 }
}

/// Retry configuration for tests.
#[must_use]
pub fn test_retry_config() -> RetryConfig {
    RetryConfig { max_attempts: 5 }
}
