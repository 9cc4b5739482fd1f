//! Versioned compression dictionaries.
//!
//! Dictionaries are stored per owner key (a collection's table name) with
//! versions 1 through 255. Rows are append-only: a version, once written, is
//! never overwritten, so every payload compressed against it stays readable.
//! Compiled zstd dictionaries are cached per `(key, version)` and built at
//! most once per process.

use std::{
    collections::HashMap,
    fmt,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::RwLock;
use rusqlite::{Connection, OptionalExtension, params};
use snafu::ResultExt;
use sqlkv_types::Context;
use zstd::dict::{DecoderDictionary, EncoderDictionary};

use crate::{
    db::Database,
    error::{Error, Result, SchemaSnafu},
};

/// Name of the dictionary table.
pub const DICTIONARY_TABLE: &str = "comp_dict";

/// Highest dictionary version; 0 means "no dictionary".
pub const MAX_DICTIONARY_VERSION: u8 = u8::MAX;

const CREATE_SQL: &str = "CREATE TABLE IF NOT EXISTS comp_dict (
    key TEXT NOT NULL,
    version INTEGER NOT NULL,
    dict BLOB NOT NULL,
    PRIMARY KEY (key, version)
)";
const INSERT_SQL: &str = "INSERT INTO comp_dict (key, version, dict) VALUES (?1, ?2, ?3)";
const GET_SQL: &str = "SELECT dict FROM comp_dict WHERE key = ?1 AND version = ?2";
const LATEST_VERSION_SQL: &str = "SELECT COALESCE(MAX(version), 0) FROM comp_dict WHERE key = ?1";
const VERSIONS_SQL: &str = "SELECT version FROM comp_dict WHERE key = ?1 ORDER BY version";

/// A dictionary prepared for compression and decompression.
pub struct CompiledDictionary {
    version: u8,
    encoder: EncoderDictionary<'static>,
    decoder: DecoderDictionary<'static>,
}

impl CompiledDictionary {
    /// Compiles raw dictionary bytes at the given compression level.
    pub fn new(version: u8, bytes: &[u8], level: i32) -> Self {
        Self {
            version,
            encoder: EncoderDictionary::copy(bytes, level),
            decoder: DecoderDictionary::copy(bytes),
        }
    }

    /// The version this dictionary was stored under.
    pub fn version(&self) -> u8 {
        self.version
    }

    /// The compression half.
    pub fn encoder(&self) -> &EncoderDictionary<'static> {
        &self.encoder
    }

    /// The decompression half.
    pub fn decoder(&self) -> &DecoderDictionary<'static> {
        &self.decoder
    }
}

impl fmt::Debug for CompiledDictionary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompiledDictionary").field("version", &self.version).finish_non_exhaustive()
    }
}

/// Durable dictionary table plus the compiled-dictionary cache.
pub struct DictionaryStore {
    db: Arc<Database>,
    level: i32,
    compiled: RwLock<HashMap<(String, u8), Arc<CompiledDictionary>>>,
    hits: AtomicU64,
    compilations: AtomicU64,
}

impl DictionaryStore {
    /// Creates the dictionary table if needed.
    ///
    /// `level` is the zstd level compiled encoders use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Schema`] if the table cannot be created.
    pub fn open(ctx: &Context, db: Arc<Database>, level: i32) -> Result<Self> {
        db.write(ctx, |conn| {
            conn.execute_batch(CREATE_SQL).context(SchemaSnafu { table: DICTIONARY_TABLE })?;
            Ok(())
        })?;
        Ok(Self {
            db,
            level,
            compiled: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            compilations: AtomicU64::new(0),
        })
    }

    /// Stores `bytes` as `version` of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for version 0 and
    /// [`Error::PrimaryKeyConstraint`] if the version already exists.
    pub fn insert(&self, ctx: &Context, key: &str, version: u8, bytes: &[u8]) -> Result<()> {
        if version == 0 {
            return Err(Error::invalid_argument("dictionary version 0 is reserved"));
        }
        self.db.write(ctx, |conn| insert_row(conn, key, version, bytes))?;
        tracing::debug!(key, version, size = bytes.len(), "Stored dictionary");
        Ok(())
    }

    /// Stores `bytes` as the next version of `key` and returns that version.
    ///
    /// The version lookup and insert share one transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DictionaryExhausted`] once version 255 exists.
    pub fn append(&self, ctx: &Context, key: &str, bytes: &[u8]) -> Result<u8> {
        let version = self.db.transaction(ctx, |conn| {
            let latest = latest_version(conn, key)?;
            if latest == MAX_DICTIONARY_VERSION {
                return Err(Error::DictionaryExhausted { key: key.to_string() });
            }
            let version = latest + 1;
            insert_row(conn, key, version, bytes)?;
            Ok(version)
        })?;
        tracing::debug!(key, version, size = bytes.len(), "Appended dictionary");
        Ok(version)
    }

    /// Raw bytes of one version.
    ///
    /// # Errors
    ///
    /// Returns an engine error on failure.
    pub fn get(&self, ctx: &Context, key: &str, version: u8) -> Result<Option<Vec<u8>>> {
        self.db.read(ctx, |conn| {
            let mut stmt = conn.prepare_cached(GET_SQL)?;
            Ok(stmt.query_row(params![key, version], |row| row.get(0)).optional()?)
        })
    }

    /// Highest stored version of `key`, or 0 when there is none.
    ///
    /// # Errors
    ///
    /// Returns an engine error on failure.
    pub fn latest_version(&self, ctx: &Context, key: &str) -> Result<u8> {
        self.db.read(ctx, |conn| latest_version(conn, key))
    }

    /// Highest stored version of `key` with its bytes.
    ///
    /// # Errors
    ///
    /// Returns an engine error on failure.
    pub fn latest(&self, ctx: &Context, key: &str) -> Result<Option<(u8, Vec<u8>)>> {
        self.db.read(ctx, |conn| {
            let version = latest_version(conn, key)?;
            if version == 0 {
                return Ok(None);
            }
            let mut stmt = conn.prepare_cached(GET_SQL)?;
            let bytes: Vec<u8> = stmt.query_row(params![key, version], |row| row.get(0))?;
            Ok(Some((version, bytes)))
        })
    }

    /// Every stored version of `key`, ascending.
    ///
    /// # Errors
    ///
    /// Returns an engine error on failure.
    pub fn versions(&self, ctx: &Context, key: &str) -> Result<Vec<u8>> {
        self.db.read(ctx, |conn| {
            let mut stmt = conn.prepare_cached(VERSIONS_SQL)?;
            let versions = stmt
                .query_map([key], |row| row.get::<_, u8>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(versions)
        })
    }

    /// The compiled form of one version, compiling and caching it on first
    /// use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MissingDictionary`] if the version is not stored.
    pub fn compiled(
        &self,
        ctx: &Context,
        key: &str,
        version: u8,
    ) -> Result<Arc<CompiledDictionary>> {
        let cache_key = (key.to_string(), version);
        if let Some(dict) = self.compiled.read().get(&cache_key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(dict));
        }

        let bytes = match version {
            0 => None,
            _ => self.get(ctx, key, version)?,
        };
        let Some(bytes) = bytes else {
            return Err(Error::MissingDictionary { key: key.to_string(), version });
        };

        let mut compiled = self.compiled.write();
        if let Some(dict) = compiled.get(&cache_key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(dict));
        }
        let dict = Arc::new(CompiledDictionary::new(version, &bytes, self.level));
        self.compilations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(key, version, size = bytes.len(), "Compiled dictionary");
        compiled.insert(cache_key, Arc::clone(&dict));
        Ok(dict)
    }

    /// Number of compiled dictionaries held in memory.
    pub fn cached_count(&self) -> usize {
        self.compiled.read().len()
    }

    /// Returns (cache hits, compilations) since open.
    pub fn stats(&self) -> (u64, u64) {
        (self.hits.load(Ordering::Relaxed), self.compilations.load(Ordering::Relaxed))
    }
}

impl fmt::Debug for DictionaryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DictionaryStore")
            .field("level", &self.level)
            .field("cached", &self.cached_count())
            .finish_non_exhaustive()
    }
}

fn insert_row(conn: &Connection, key: &str, version: u8, bytes: &[u8]) -> Result<()> {
    let mut stmt = conn.prepare_cached(INSERT_SQL)?;
    stmt.execute(params![key, version, bytes])?;
    Ok(())
}

fn latest_version(conn: &Connection, key: &str) -> Result<u8> {
    let mut stmt = conn.prepare_cached(LATEST_VERSION_SQL)?;
    Ok(stmt.query_row([key], |row| row.get::<_, u8>(0))?)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use std::thread;

    use sqlkv_test_utils::corpus;

    use super::*;

    fn store() -> (Context, DictionaryStore) {
        let ctx = Context::background();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = DictionaryStore::open(&ctx, db, 3).unwrap();
        (ctx, store)
    }

    fn trained() -> Vec<u8> {
        zstd::dict::from_samples(&corpus::training_samples(400), 2048).unwrap()
    }

    #[test]
    fn test_empty_key_has_no_versions() {
        let (ctx, store) = store();
        assert_eq!(store.latest_version(&ctx, "patients").unwrap(), 0);
        assert!(store.latest(&ctx, "patients").unwrap().is_none());
        assert!(store.versions(&ctx, "patients").unwrap().is_empty());
        assert!(store.get(&ctx, "patients", 1).unwrap().is_none());
    }

    #[test]
    fn test_insert_never_overwrites() {
        let (ctx, store) = store();
        store.insert(&ctx, "patients", 1, b"first").unwrap();
        let again = store.insert(&ctx, "patients", 1, b"second");
        assert!(matches!(again, Err(Error::PrimaryKeyConstraint { .. })));
        assert_eq!(store.get(&ctx, "patients", 1).unwrap().unwrap(), b"first");
    }

    #[test]
    fn test_version_zero_reserved() {
        let (ctx, store) = store();
        let result = store.insert(&ctx, "patients", 0, b"x");
        assert!(matches!(result, Err(Error::InvalidArgument { .. })));
    }

    #[test]
    fn test_append_allocates_next_version_per_key() {
        let (ctx, store) = store();
        assert_eq!(store.append(&ctx, "a", b"one").unwrap(), 1);
        assert_eq!(store.append(&ctx, "a", b"two").unwrap(), 2);
        assert_eq!(store.append(&ctx, "b", b"uno").unwrap(), 1);
        assert_eq!(store.versions(&ctx, "a").unwrap(), vec![1, 2]);
        assert_eq!(store.latest(&ctx, "a").unwrap(), Some((2, b"two".to_vec())));
    }

    #[test]
    fn test_append_exhausts_at_255() {
        let (ctx, store) = store();
        store.insert(&ctx, "full", MAX_DICTIONARY_VERSION, b"last").unwrap();
        let result = store.append(&ctx, "full", b"more");
        assert!(matches!(result, Err(Error::DictionaryExhausted { .. })));
    }

    #[test]
    fn test_compiled_missing_version() {
        let (ctx, store) = store();
        let err = store.compiled(&ctx, "patients", 4).unwrap_err();
        assert!(matches!(err, Error::MissingDictionary { version: 4, .. }));
        assert!(matches!(
            store.compiled(&ctx, "patients", 0),
            Err(Error::MissingDictionary { version: 0, .. })
        ));
    }

    #[test]
    fn test_compiled_once_per_version() {
        let (ctx, store) = store();
        store.insert(&ctx, "patients", 1, &trained()).unwrap();
        let a = store.compiled(&ctx, "patients", 1).unwrap();
        let b = store.compiled(&ctx, "patients", 1).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.version(), 1);
        assert_eq!(store.stats(), (1, 1));
        assert_eq!(store.cached_count(), 1);
    }

    #[test]
    fn test_concurrent_compilation_builds_one() {
        let ctx = Context::background();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let store = Arc::new(DictionaryStore::open(&ctx, db, 3).unwrap());
        store.insert(&ctx, "patients", 1, &trained()).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    store.compiled(&Context::background(), "patients", 1).unwrap()
                })
            })
            .collect();
        let dicts: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(dicts.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(store.stats().1, 1);
    }
}
