//! Named statement cache.
//!
//! Each table keeps its generated SQL under a logical name ("insert",
//! "row_by_email", a caller-chosen select name). The SQL text is built once
//! and shared; compiled statements are then reused through rusqlite's
//! per-connection `prepare_cached`, keyed by that text.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::RwLock;
use rusqlite::{CachedStatement, Connection};

use crate::error::Result;

/// Append-only map from statement name to SQL text.
///
/// Lookups take a shared lock. A miss builds the SQL and inserts it under
/// the exclusive lock, re-checking first so concurrent misses agree on one
/// text. Entries are never evicted.
#[derive(Debug, Default)]
pub struct StatementCache {
    statements: RwLock<HashMap<String, Arc<str>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl StatementCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the SQL registered under `name`, building it with `build` on
    /// first use.
    pub fn sql(&self, name: &str, build: impl FnOnce() -> String) -> Arc<str> {
        if let Some(sql) = self.statements.read().get(name) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(sql);
        }

        let mut statements = self.statements.write();
        if let Some(sql) = statements.get(name) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Arc::clone(sql);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let sql: Arc<str> = Arc::from(build());
        tracing::debug!(statement = name, sql = %sql, "Registered statement");
        statements.insert(name.to_string(), Arc::clone(&sql));
        sql
    }

    /// Prepares the statement registered under `name` on `conn`.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the SQL does not compile.
    pub fn prepare<'conn>(
        &self,
        conn: &'conn Connection,
        name: &str,
        build: impl FnOnce() -> String,
    ) -> Result<CachedStatement<'conn>> {
        let sql = self.sql(name, build);
        Ok(conn.prepare_cached(&sql)?)
    }

    /// Whether `name` has been registered.
    pub fn contains(&self, name: &str) -> bool {
        self.statements.read().contains_key(name)
    }

    /// Number of registered statements.
    pub fn len(&self) -> usize {
        self.statements.read().len()
    }

    /// Whether nothing has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns (hits, misses) since creation.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.misses.load(Ordering::Relaxed))
    }
}
