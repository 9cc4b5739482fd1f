//! Counter reservation and key-collision retry configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Counter allocation settings.
///
/// A larger `reserve` amortizes durable writes over more ids at the cost of
/// a larger gap after a crash.
///
/// # Example
///
/// ```no_run
/// # use sqlkv_types::config::CounterConfig;
/// let config = CounterConfig::builder().start(1000).reserve(500).build().expect("valid");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CounterConfig {
    /// First id handed out by a counter with no persisted state.
    #[serde(default = "default_start")]
    pub start: i64,
    /// Number of ids reserved per durable write.
    #[serde(default = "default_reserve")]
    pub reserve: i64,
}

#[bon::bon]
impl CounterConfig {
    /// Creates a new counter configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `start` is negative or
    /// `reserve` is not positive.
    #[builder]
    pub fn new(
        #[builder(default = default_start())] start: i64,
        #[builder(default = default_reserve())] reserve: i64,
    ) -> Result<Self, ConfigError> {
        let config = Self { start, reserve };
        config.validate()?;
        Ok(config)
    }
}

impl CounterConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.start < 0 {
            return Err(ConfigError::Validation {
                message: format!("start must be >= 0, got {}", self.start),
            });
        }
        if self.reserve < 1 {
            return Err(ConfigError::Validation {
                message: format!("reserve must be >= 1, got {}", self.reserve),
            });
        }
        Ok(())
    }
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self { start: default_start(), reserve: default_reserve() }
    }
}

fn default_start() -> i64 {
    1
}

fn default_reserve() -> i64 {
    100
}

/// Bounded retry for inserts that draw random primary keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RetryConfig {
    /// Total attempts, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[bon::bon]
impl RetryConfig {
    /// Creates a new retry configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `max_attempts` is 0.
    #[builder]
    pub fn new(
        #[builder(default = default_max_attempts())] max_attempts: u32,
    ) -> Result<Self, ConfigError> {
        let config = Self { max_attempts };
        config.validate()?;
        Ok(config)
    }
}

impl RetryConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if `max_attempts` is 0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Validation {
                message: "max_attempts must be >= 1".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: default_max_attempts() }
    }
}

fn default_max_attempts() -> u32 {
    8
}
