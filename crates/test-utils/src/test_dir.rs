//! Temporary directory management for tests.
//!
//! [`TestDir`] wraps [`tempfile::TempDir`] with path helpers for database files.

// Test utilities are expected to panic on failure - that's their purpose
#![allow(clippy::expect_used)]

use std::path::{Path, PathBuf};

use tempfile::TempDir;

/// File name used by [`TestDir::database_path`].
pub const DATABASE_FILE: &str = "sqlkv.db";

/// A managed temporary directory for tests.
///
/// The directory and any database files inside it are removed on drop.
///
/// # Example
///
/// ```
/// use sqlkv_test_utils::TestDir;
///
/// let dir = TestDir::new();
/// let db_path = dir.database_path();
/// assert!(db_path.starts_with(dir.path()));
/// ```
pub struct TestDir {
    inner: TempDir,
}

impl TestDir {
    /// Create a new temporary directory.
    ///
    /// # Panics
    ///
    /// Panics if the temporary directory cannot be created.
    #[must_use]
    pub fn new() -> Self {
        let inner = TempDir::with_prefix("sqlkv-").expect("failed to create temp directory");
        Self { inner }
    }

    /// Returns the path to the temporary directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        self.inner.path()
    }

    /// Join a relative path to the temporary directory.
    #[must_use]
    pub fn join<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.inner.path().join(path)
    }

    /// Path of the conventional database file in this directory.
    ///
    /// Reopening the same path simulates a process restart: everything held
    /// in memory is gone and only what was committed survives.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.join(DATABASE_FILE)
    }

    /// Whether the database file and its WAL sidecar exist.
    #[must_use]
    pub fn has_wal(&self) -> bool {
        self.database_path().exists() && self.join(format!("{DATABASE_FILE}-wal")).exists()
    }
}

impl Default for TestDir {
    fn default() -> Self {
        Self::new()
    }
}
