//! Database connection configuration.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Upper bound on pooled reader connections.
pub const MAX_READER_CONNECTIONS: usize = 64;

/// Connection settings for a [`Database`](../../sqlkv_store/struct.Database.html).
///
/// # Validation Rules
///
/// - `reader_connections` must be <= 64 (0 routes reads through the writer)
/// - `statement_cache_capacity` must be >= 1
///
/// # Example
///
/// ```no_run
/// # use sqlkv_types::config::DatabaseConfig;
/// # use std::time::Duration;
/// let config = DatabaseConfig::builder()
///     .reader_connections(8)
///     .busy_timeout(Duration::from_secs(2))
///     .build()
///     .expect("valid database config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DatabaseConfig {
    /// Number of pooled read-only connections.
    #[serde(default = "default_reader_connections")]
    pub reader_connections: usize,
    /// Compiled statements kept per connection.
    #[serde(default = "default_statement_cache_capacity")]
    pub statement_cache_capacity: usize,
    /// How long the engine waits on a locked database file before failing.
    #[serde(default = "default_busy_timeout")]
    #[serde(with = "super::humantime_serde")]
    #[schemars(with = "String")]
    pub busy_timeout: Duration,
    /// Use write-ahead logging for file-backed databases.
    #[serde(default = "default_wal")]
    pub wal: bool,
}

#[bon::bon]
impl DatabaseConfig {
    /// Creates a new database configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if:
    /// - `reader_connections` > 64
    /// - `statement_cache_capacity` is 0
    #[builder]
    pub fn new(
        #[builder(default = default_reader_connections())] reader_connections: usize,
        #[builder(default = default_statement_cache_capacity())] statement_cache_capacity: usize,
        #[builder(default = default_busy_timeout())] busy_timeout: Duration,
        #[builder(default = default_wal())] wal: bool,
    ) -> Result<Self, ConfigError> {
        let config = Self { reader_connections, statement_cache_capacity, busy_timeout, wal };
        config.validate()?;
        Ok(config)
    }
}

impl DatabaseConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.reader_connections > MAX_READER_CONNECTIONS {
            return Err(ConfigError::Validation {
                message: format!(
                    "reader_connections must be <= {}, got {}",
                    MAX_READER_CONNECTIONS, self.reader_connections
                ),
            });
        }
        if self.statement_cache_capacity == 0 {
            return Err(ConfigError::Validation {
                message: "statement_cache_capacity must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            reader_connections: default_reader_connections(),
            statement_cache_capacity: default_statement_cache_capacity(),
            busy_timeout: default_busy_timeout(),
            wal: default_wal(),
        }
    }
}

fn default_reader_connections() -> usize {
    4
}

fn default_statement_cache_capacity() -> usize {
    64
}

fn default_busy_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_wal() -> bool {
    true
}
