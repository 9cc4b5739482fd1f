//! Error types for the sqlkv store.
//!
//! Engine failures are classified on conversion: the extended result codes
//! for primary-key and unique violations become [`Error::PrimaryKeyConstraint`]
//! and [`Error::UniqueConstraint`]; everything else stays opaque as
//! [`Error::Engine`]. Not-found is never an error; lookups return `Ok(None)`.

use std::{fmt, io};

use rusqlite::ffi;
use snafu::Snafu;
use sqlkv_types::{CodecError, ContextError, config::ConfigError};

/// Result type alias for store operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Stable numeric codes for [`Error`] variants.
///
/// | Range     | Domain                         |
/// |-----------|--------------------------------|
/// | 1000–1099 | Caller input                   |
/// | 1100–1199 | Constraint violations          |
/// | 1200–1299 | Compression dictionaries       |
/// | 1300–1399 | Engine                         |
/// | 1400–1499 | Payload encoding               |
/// | 1500–1599 | Cancellation and retry         |
/// | 1600–1699 | Configuration                  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    /// Record rejected by a validation hook.
    Validation = 1000,
    /// Malformed call: unknown field, bad identifier, wrong arity.
    InvalidArgument = 1001,
    /// A unique column already holds the value.
    UniqueConstraint = 1100,
    /// The primary key already exists.
    PrimaryKeyConstraint = 1101,
    /// A payload references a dictionary version that is not stored.
    MissingDictionary = 1200,
    /// All 255 dictionary versions are in use.
    DictionaryExhausted = 1201,
    /// Opaque engine failure.
    Engine = 1300,
    /// Table or index creation failed.
    Schema = 1301,
    /// Record could not be serialized or deserialized.
    Serialization = 1400,
    /// zstd compression or decompression failed.
    Compression = 1401,
    /// The caller's context was cancelled.
    Cancelled = 1500,
    /// The caller's context deadline passed.
    DeadlineExceeded = 1501,
    /// A retried operation kept failing.
    RetryExhausted = 1502,
    /// A configuration value is invalid.
    Config = 1600,
    /// A counter reached the end of the id range.
    CounterExhausted = 1700,
}

impl ErrorCode {
    /// Returns the numeric code value.
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Converts a numeric code to an `ErrorCode`, returning `None` for unknown values.
    #[must_use]
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::Validation),
            1001 => Some(Self::InvalidArgument),
            1100 => Some(Self::UniqueConstraint),
            1101 => Some(Self::PrimaryKeyConstraint),
            1200 => Some(Self::MissingDictionary),
            1201 => Some(Self::DictionaryExhausted),
            1300 => Some(Self::Engine),
            1301 => Some(Self::Schema),
            1400 => Some(Self::Serialization),
            1401 => Some(Self::Compression),
            1500 => Some(Self::Cancelled),
            1501 => Some(Self::DeadlineExceeded),
            1502 => Some(Self::RetryExhausted),
            1600 => Some(Self::Config),
            1700 => Some(Self::CounterExhausted),
            _ => None,
        }
    }

    /// Whether an operation failing with this code may succeed if repeated.
    ///
    /// A primary-key collision is retryable with a fresh key.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::PrimaryKeyConstraint)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_u16())
    }
}

/// Errors returned by store operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// A collection's validation hook rejected the record.
    #[snafu(display("Validation failed: {message}"))]
    Validation {
        /// Message returned by the hook.
        message: String,
    },

    /// Malformed call.
    #[snafu(display("Invalid argument: {message}"))]
    InvalidArgument {
        /// What was wrong.
        message: String,
    },

    /// A unique column already holds the value.
    #[snafu(display("Unique constraint violated: {message}"))]
    UniqueConstraint {
        /// Engine message naming the column.
        message: String,
    },

    /// The primary key already exists.
    #[snafu(display("Primary key constraint violated: {message}"))]
    PrimaryKeyConstraint {
        /// Engine message naming the column.
        message: String,
    },

    /// A payload references a dictionary that is not stored.
    #[snafu(display("Missing dictionary {key} version {version}"))]
    MissingDictionary {
        /// Dictionary owner (table name).
        key: String,
        /// Requested version.
        version: u8,
    },

    /// No dictionary versions remain for the key.
    #[snafu(display("Dictionary versions exhausted for {key}"))]
    DictionaryExhausted {
        /// Dictionary owner (table name).
        key: String,
    },

    /// Opaque engine failure.
    #[snafu(display("Engine error: {source}"))]
    Engine {
        /// The underlying rusqlite error.
        source: rusqlite::Error,
    },

    /// Table, index, or trigger creation failed.
    #[snafu(display("Schema creation failed for {table}: {source}"))]
    Schema {
        /// Table being created.
        table: String,
        /// The underlying rusqlite error.
        source: rusqlite::Error,
    },

    /// Payload serialization failed.
    #[snafu(display("Serialization error: {source}"))]
    Serialization {
        /// The underlying codec error.
        source: CodecError,
    },

    /// zstd failed.
    #[snafu(display("Compression error: {source}"))]
    Compression {
        /// The underlying zstd I/O error.
        source: io::Error,
    },

    /// The caller's context was cancelled before the operation started.
    #[snafu(display("Operation cancelled"))]
    Cancelled,

    /// The caller's context deadline passed before the operation started.
    #[snafu(display("Deadline exceeded"))]
    DeadlineExceeded,

    /// Every attempt of a retried operation failed.
    #[snafu(display("Retry exhausted after {attempts} attempts: {source}"))]
    RetryExhausted {
        /// Attempts made.
        attempts: u32,
        /// Error from the final attempt.
        source: Box<Error>,
    },

    /// Invalid configuration.
    #[snafu(display("Configuration error: {source}"))]
    Config {
        /// The underlying validation error.
        source: ConfigError,
    },

    /// The next reservation would overflow the id range.
    #[snafu(display("Counter {key} exhausted at {current}"))]
    CounterExhausted {
        /// Counter name.
        key: String,
        /// First id that could not be reserved.
        current: i64,
    },
}

impl Error {
    /// Returns the stable code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::Validation,
            Self::InvalidArgument { .. } => ErrorCode::InvalidArgument,
            Self::UniqueConstraint { .. } => ErrorCode::UniqueConstraint,
            Self::PrimaryKeyConstraint { .. } => ErrorCode::PrimaryKeyConstraint,
            Self::MissingDictionary { .. } => ErrorCode::MissingDictionary,
            Self::DictionaryExhausted { .. } => ErrorCode::DictionaryExhausted,
            Self::Engine { .. } => ErrorCode::Engine,
            Self::Schema { .. } => ErrorCode::Schema,
            Self::Serialization { .. } => ErrorCode::Serialization,
            Self::Compression { .. } => ErrorCode::Compression,
            Self::Cancelled => ErrorCode::Cancelled,
            Self::DeadlineExceeded => ErrorCode::DeadlineExceeded,
            Self::RetryExhausted { .. } => ErrorCode::RetryExhausted,
            Self::Config { .. } => ErrorCode::Config,
            Self::CounterExhausted { .. } => ErrorCode::CounterExhausted,
        }
    }

    /// Whether repeating the operation may succeed.
    ///
    /// Besides [`ErrorCode::is_retryable`] codes, engine busy/locked
    /// failures count as retryable.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        if let Self::Engine { source: rusqlite::Error::SqliteFailure(e, _) } = self {
            return matches!(e.code, ffi::ErrorCode::DatabaseBusy | ffi::ErrorCode::DatabaseLocked);
        }
        self.code().is_retryable()
    }

    pub(crate) fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(source: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(failure, message) = &source {
            let message = message.clone().unwrap_or_else(|| failure.to_string());
            match failure.extended_code {
                ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                    return Self::PrimaryKeyConstraint { message };
                },
                ffi::SQLITE_CONSTRAINT_UNIQUE => return Self::UniqueConstraint { message },
                _ => {},
            }
        }
        Self::Engine { source }
    }
}

impl From<ContextError> for Error {
    fn from(err: ContextError) -> Self {
        match err {
            ContextError::Cancelled => Self::Cancelled,
            ContextError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

impl From<CodecError> for Error {
    fn from(source: CodecError) -> Self {
        Self::Serialization { source }
    }
}

impl From<io::Error> for Error {
    fn from(source: io::Error) -> Self {
        Self::Compression { source }
    }
}

impl From<ConfigError> for Error {
    fn from(source: ConfigError) -> Self {
        Self::Config { source }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use rusqlite::Connection;

    use super::*;

    fn engine_error(sql: &str) -> Error {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE t (id INTEGER PRIMARY KEY, email TEXT UNIQUE);
             INSERT INTO t VALUES (1, 'a@example.com');",
        )
        .unwrap();
        Error::from(conn.execute(sql, []).unwrap_err())
    }

    #[test]
    fn test_primary_key_violation_classified() {
        let err = engine_error("INSERT INTO t VALUES (1, 'b@example.com')");
        assert!(matches!(err, Error::PrimaryKeyConstraint { .. }), "got: {err:?}");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_unique_violation_classified() {
        let err = engine_error("INSERT INTO t VALUES (2, 'a@example.com')");
        match &err {
            Error::UniqueConstraint { message } => assert!(message.contains("email"), "{message}"),
            other => panic!("expected UniqueConstraint, got {other:?}"),
        }
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_text_primary_key_violation_classified() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE c (key TEXT PRIMARY KEY NOT NULL); INSERT INTO c VALUES ('x');")
            .unwrap();
        let err = Error::from(conn.execute("INSERT INTO c VALUES ('x')", []).unwrap_err());
        assert!(matches!(err, Error::PrimaryKeyConstraint { .. }), "got: {err:?}");
    }

    #[test]
    fn test_other_engine_errors_stay_opaque() {
        let err = engine_error("INSERT INTO missing VALUES (1)");
        assert!(matches!(err, Error::Engine { .. }));
        assert_eq!(err.code(), ErrorCode::Engine);
    }

    #[test]
    fn test_context_errors_map() {
        assert!(matches!(Error::from(ContextError::Cancelled), Error::Cancelled));
        assert!(matches!(Error::from(ContextError::DeadlineExceeded), Error::DeadlineExceeded));
    }

    #[test]
    fn test_error_code_roundtrip() {
        for code in [
            ErrorCode::Validation,
            ErrorCode::InvalidArgument,
            ErrorCode::UniqueConstraint,
            ErrorCode::PrimaryKeyConstraint,
            ErrorCode::MissingDictionary,
            ErrorCode::DictionaryExhausted,
            ErrorCode::Engine,
            ErrorCode::Schema,
            ErrorCode::Serialization,
            ErrorCode::Compression,
            ErrorCode::Cancelled,
            ErrorCode::DeadlineExceeded,
            ErrorCode::RetryExhausted,
            ErrorCode::Config,
            ErrorCode::CounterExhausted,
        ] {
            assert_eq!(ErrorCode::from_u16(code.as_u16()), Some(code));
        }
        assert_eq!(ErrorCode::from_u16(9999), None);
    }

    #[test]
    fn test_error_display() {
        let err = Error::MissingDictionary { key: "patients".to_string(), version: 3 };
        assert_eq!(err.to_string(), "Missing dictionary patients version 3");
        let err = Error::RetryExhausted {
            attempts: 4,
            source: Box::new(Error::PrimaryKeyConstraint { message: "t.id".to_string() }),
        };
        assert_eq!(
            err.to_string(),
            "Retry exhausted after 4 attempts: Primary key constraint violated: t.id"
        );
    }
}
