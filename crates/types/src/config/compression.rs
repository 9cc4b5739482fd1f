//! Payload compression configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Maximum zstd compression level.
const MAX_COMPRESSION_LEVEL: i32 = 22;

/// Minimum zstd compression level.
const MIN_COMPRESSION_LEVEL: i32 = 1;

/// Smallest dictionary zstd's trainer accepts.
const MIN_DICTIONARY_SIZE: usize = 256;

/// How a collection compresses its payloads.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CompressionMode {
    /// Store the serialized record as-is.
    #[default]
    None,
    /// Generic zstd compression.
    Zstd,
    /// zstd compression against the collection's latest trained dictionary.
    ///
    /// Falls back to [`CompressionMode::Zstd`] until a dictionary exists.
    Dictionary,
}

/// Compression settings shared by a codec.
///
/// # Validation Rules
///
/// - `level` must be 1-22 (zstd valid range)
/// - `dictionary_max_size` must be >= 256 bytes
///
/// # Example
///
/// ```no_run
/// # use sqlkv_types::config::CompressionConfig;
/// let config = CompressionConfig::builder()
///     .level(6)
///     .dictionary_max_size(16 * 1024)
///     .build()
///     .expect("valid compression config");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct CompressionConfig {
    /// zstd compression level (1-22, 3 recommended).
    #[serde(default = "default_level")]
    pub level: i32,
    /// Upper bound on trained dictionary size in bytes.
    #[serde(default = "default_dictionary_max_size")]
    pub dictionary_max_size: usize,
}

#[bon::bon]
impl CompressionConfig {
    /// Creates a new compression configuration with validation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if:
    /// - `level` outside 1-22
    /// - `dictionary_max_size` < 256
    #[builder]
    pub fn new(
        #[builder(default = default_level())] level: i32,
        #[builder(default = default_dictionary_max_size())] dictionary_max_size: usize,
    ) -> Result<Self, ConfigError> {
        let config = Self { level, dictionary_max_size };
        config.validate()?;
        Ok(config)
    }
}

impl CompressionConfig {
    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Validation`] if any value is out of range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.level < MIN_COMPRESSION_LEVEL || self.level > MAX_COMPRESSION_LEVEL {
            return Err(ConfigError::Validation {
                message: format!(
                    "level must be {}-{}, got {}",
                    MIN_COMPRESSION_LEVEL, MAX_COMPRESSION_LEVEL, self.level
                ),
            });
        }
        if self.dictionary_max_size < MIN_DICTIONARY_SIZE {
            return Err(ConfigError::Validation {
                message: format!(
                    "dictionary_max_size must be >= {}, got {}",
                    MIN_DICTIONARY_SIZE, self.dictionary_max_size
                ),
            });
        }
        Ok(())
    }
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self { level: default_level(), dictionary_max_size: default_dictionary_max_size() }
    }
}

fn default_level() -> i32 {
    3
}

fn default_dictionary_max_size() -> usize {
    112_640 // 110 KiB, zstd's own recommendation
}
