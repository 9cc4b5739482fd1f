//! Database handle and lock discipline.
//!
//! A [`Database`] owns one writer connection and a pool of reader
//! connections to the same SQLite database. A process-wide read/write lock
//! orders them: reads hold the shared side, writes and transactions hold the
//! exclusive side. Every entry point checks the caller's [`Context`] after
//! acquiring the lock and before touching the engine.
//!
//! # Example
//!
//! ```no_run
//! use sqlkv_store::Database;
//! use sqlkv_types::{Context, config::DatabaseConfig};
//!
//! let db = Database::open("records.db", DatabaseConfig::default())?;
//! let ctx = Context::background();
//! db.write(&ctx, |conn| {
//!     conn.execute_batch("CREATE TABLE IF NOT EXISTS notes (id INTEGER PRIMARY KEY)")?;
//!     Ok(())
//! })?;
//! let count: i64 = db.read(&ctx, |conn| {
//!     Ok(conn.query_row("SELECT COUNT(*) FROM notes", [], |row| row.get(0))?)
//! })?;
//! # Ok::<(), sqlkv_store::Error>(())
//! ```

use std::{
    fmt,
    path::{Path, PathBuf},
    sync::atomic::{AtomicU64, AtomicUsize, Ordering},
};

use parking_lot::{Mutex, RwLock};
use rusqlite::{Connection, OpenFlags};
use sqlkv_types::{Context, config::DatabaseConfig};

use crate::error::Result;

/// Distinguishes in-memory databases opened by this process.
static MEMORY_DB_SEQ: AtomicU64 = AtomicU64::new(0);

/// Point-in-time counters for a [`Database`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatabaseStats {
    /// Pooled reader connections.
    pub reader_connections: usize,
    /// Read closures run since open.
    pub reads: u64,
    /// Write closures and transactions run since open.
    pub writes: u64,
}

/// Shared handle to a SQLite database.
///
/// Thread-safe; share it behind an `Arc`.
pub struct Database {
    /// Process-wide ordering of reads against writes.
    lock: RwLock<()>,
    writer: Mutex<Connection>,
    readers: Vec<Mutex<Connection>>,
    next_reader: AtomicUsize,
    path: Option<PathBuf>,
    config: DatabaseConfig,
    reads: AtomicU64,
    writes: AtomicU64,
}

impl Database {
    /// Opens or creates a file-backed database.
    ///
    /// The writer connection is opened first and switched to WAL when
    /// configured; readers are then opened read-only.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the configuration is
    /// invalid, or an engine error if a connection cannot be opened.
    pub fn open(path: impl AsRef<Path>, config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();

        let writer = Connection::open(&path)?;
        configure(&writer, &config)?;
        if config.wal {
            let mode: String =
                writer.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
            writer.pragma_update(None, "synchronous", "NORMAL")?;
            tracing::debug!(journal_mode = %mode, "Configured journal mode");
        }

        let flags = OpenFlags::SQLITE_OPEN_READ_ONLY
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let readers = (0..config.reader_connections)
            .map(|_| {
                let conn = Connection::open_with_flags(&path, flags)?;
                configure(&conn, &config)?;
                Ok(Mutex::new(conn))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            path = %path.display(),
            readers = readers.len(),
            wal = config.wal,
            "Opened database"
        );
        Ok(Self::assemble(writer, readers, Some(path), config))
    }

    /// Opens a private in-memory database with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an engine error if a connection cannot be opened.
    pub fn open_in_memory() -> Result<Self> {
        Self::open_in_memory_with(DatabaseConfig::default())
    }

    /// Opens a private in-memory database.
    ///
    /// Reader connections attach to the same memory database through a
    /// shared-cache URI unique to this handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) if the configuration is
    /// invalid, or an engine error if a connection cannot be opened.
    pub fn open_in_memory_with(config: DatabaseConfig) -> Result<Self> {
        config.validate()?;
        let seq = MEMORY_DB_SEQ.fetch_add(1, Ordering::Relaxed);
        let uri = format!("file:sqlkv-{}-{seq}?mode=memory&cache=shared", std::process::id());
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let writer = Connection::open_with_flags(&uri, flags)?;
        configure(&writer, &config)?;
        let readers = (0..config.reader_connections)
            .map(|_| {
                let conn = Connection::open_with_flags(&uri, flags)?;
                configure(&conn, &config)?;
                Ok(Mutex::new(conn))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(uri = %uri, readers = readers.len(), "Opened in-memory database");
        Ok(Self::assemble(writer, readers, None, config))
    }

    fn assemble(
        writer: Connection,
        readers: Vec<Mutex<Connection>>,
        path: Option<PathBuf>,
        config: DatabaseConfig,
    ) -> Self {
        Self {
            lock: RwLock::new(()),
            writer: Mutex::new(writer),
            readers,
            next_reader: AtomicUsize::new(0),
            path,
            config,
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Runs `f` on a reader connection under the shared lock.
    ///
    /// Reads run concurrently with each other and never with a write. With no
    /// pooled readers, reads use the writer connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Cancelled`](crate::Error::Cancelled) or
    /// [`Error::DeadlineExceeded`](crate::Error::DeadlineExceeded) if `ctx`
    /// has expired, otherwise whatever `f` returns.
    pub fn read<R>(&self, ctx: &Context, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        let _shared = self.lock.read();
        ctx.check()?;
        self.reads.fetch_add(1, Ordering::Relaxed);

        if self.readers.is_empty() {
            let conn = self.writer.lock();
            return f(&conn);
        }

        let start = self.next_reader.fetch_add(1, Ordering::Relaxed) % self.readers.len();
        let free = (0..self.readers.len())
            .map(|offset| (start + offset) % self.readers.len())
            .find_map(|i| self.readers[i].try_lock());
        let conn = match free {
            Some(conn) => conn,
            None => self.readers[start].lock(),
        };
        f(&conn)
    }

    /// Runs `f` on the writer connection under the exclusive lock.
    ///
    /// Each statement `f` executes commits on its own. Use
    /// [`transaction`](Self::transaction) to group statements.
    ///
    /// # Errors
    ///
    /// Returns a context error if `ctx` has expired, otherwise whatever `f`
    /// returns.
    pub fn write<R>(&self, ctx: &Context, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        let _exclusive = self.lock.write();
        ctx.check()?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        let conn = self.writer.lock();
        f(&conn)
    }

    /// Runs `f` inside a transaction under the exclusive lock.
    ///
    /// Commits when `f` returns `Ok`; rolls back when it returns `Err`.
    ///
    /// # Errors
    ///
    /// Returns a context error if `ctx` has expired, an engine error if the
    /// transaction cannot begin or commit, otherwise whatever `f` returns.
    pub fn transaction<R>(
        &self,
        ctx: &Context,
        f: impl FnOnce(&Connection) -> Result<R>,
    ) -> Result<R> {
        let _exclusive = self.lock.write();
        ctx.check()?;
        self.writes.fetch_add(1, Ordering::Relaxed);
        let mut conn = self.writer.lock();
        let tx = conn.transaction()?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// File path, or `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The configuration this handle was opened with.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Returns usage counters.
    pub fn stats(&self) -> DatabaseStats {
        DatabaseStats {
            reader_connections: self.readers.len(),
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("path", &self.path)
            .field("readers", &self.readers.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn configure(conn: &Connection, config: &DatabaseConfig) -> Result<()> {
    conn.busy_timeout(config.busy_timeout)?;
    conn.set_prepared_statement_cache_capacity(config.statement_cache_capacity);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use std::{sync::Arc, thread, time::Duration};

    use sqlkv_test_utils::TestDir;

    use super::*;
    use crate::error::Error;

    fn create_notes(db: &Database, ctx: &Context) {
        db.write(ctx, |conn| {
            conn.execute_batch("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)")?;
            Ok(())
        })
        .unwrap();
    }

    fn count_notes(db: &Database, ctx: &Context) -> i64 {
        db.read(ctx, |conn| Ok(conn.query_row("SELECT COUNT(*) FROM notes", [], |r| r.get(0))?))
            .unwrap()
    }

    #[test]
    fn test_in_memory_readers_see_writes() {
        let db = Database::open_in_memory().unwrap();
        let ctx = Context::background();
        create_notes(&db, &ctx);
        db.write(&ctx, |conn| {
            conn.execute("INSERT INTO notes (body) VALUES ('a')", [])?;
            Ok(())
        })
        .unwrap();
        for _ in 0..8 {
            assert_eq!(count_notes(&db, &ctx), 1);
        }
        assert_eq!(db.stats().reader_connections, 4);
    }

    #[test]
    fn test_in_memory_databases_are_isolated() {
        let a = Database::open_in_memory().unwrap();
        let b = Database::open_in_memory().unwrap();
        let ctx = Context::background();
        create_notes(&a, &ctx);
        let missing = b.read(&ctx, |conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM notes", [], |r| r.get::<_, i64>(0))?)
        });
        assert!(missing.is_err());
    }

    #[test]
    fn test_file_database_uses_wal() {
        let dir = TestDir::new();
        let db = Database::open(dir.join("wal.db"), DatabaseConfig::default()).unwrap();
        let ctx = Context::background();
        let mode: String = db
            .read(&ctx, |conn| Ok(conn.query_row("PRAGMA journal_mode", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
        assert_eq!(db.path(), Some(dir.join("wal.db").as_path()));
    }

    #[test]
    fn test_file_database_persists_across_reopen() {
        let dir = TestDir::new();
        let path = dir.join("persist.db");
        let ctx = Context::background();
        {
            let db = Database::open(&path, DatabaseConfig::default()).unwrap();
            create_notes(&db, &ctx);
            db.write(&ctx, |conn| {
                conn.execute("INSERT INTO notes (body) VALUES ('kept')", [])?;
                Ok(())
            })
            .unwrap();
        }
        let db = Database::open(&path, DatabaseConfig::default()).unwrap();
        assert_eq!(count_notes(&db, &ctx), 1);
    }

    #[test]
    fn test_zero_readers_route_through_writer() {
        let config = DatabaseConfig::builder().reader_connections(0).build().unwrap();
        let db = Database::open_in_memory_with(config).unwrap();
        let ctx = Context::background();
        create_notes(&db, &ctx);
        assert_eq!(count_notes(&db, &ctx), 0);
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        let ctx = Context::background();
        create_notes(&db, &ctx);
        let result: Result<()> = db.transaction(&ctx, |conn| {
            conn.execute("INSERT INTO notes (body) VALUES ('lost')", [])?;
            Err(Error::invalid_argument("abort"))
        });
        assert!(result.is_err());
        assert_eq!(count_notes(&db, &ctx), 0);
    }

    #[test]
    fn test_cancelled_context_skips_closure() {
        let db = Database::open_in_memory().unwrap();
        let ctx = Context::background();
        ctx.cancel();
        let mut ran = false;
        let result = db.write(&ctx, |_| {
            ran = true;
            Ok(())
        });
        assert!(matches!(result, Err(Error::Cancelled)));
        assert!(!ran);
    }

    #[test]
    fn test_expired_deadline_skips_read() {
        let db = Database::open_in_memory().unwrap();
        let ctx = Context::with_timeout(Duration::ZERO);
        let result = db.read(&ctx, |_| Ok(()));
        assert!(matches!(result, Err(Error::DeadlineExceeded)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = DatabaseConfig { statement_cache_capacity: 0, ..DatabaseConfig::default() };
        assert!(matches!(Database::open_in_memory_with(config), Err(Error::Config { .. })));
    }

    #[test]
    fn test_concurrent_reads_and_writes() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let ctx = Context::background();
        create_notes(&db, &ctx);

        let writers: Vec<_> = (0..4)
            .map(|_| {
                let db = Arc::clone(&db);
                thread::spawn(move || {
                    let ctx = Context::background();
                    for _ in 0..25 {
                        db.write(&ctx, |conn| {
                            conn.execute("INSERT INTO notes (body) VALUES ('x')", [])?;
                            Ok(())
                        })
                        .unwrap();
                        count_notes(&db, &ctx);
                    }
                })
            })
            .collect();
        for handle in writers {
            handle.join().unwrap();
        }
        assert_eq!(count_notes(&db, &ctx), 100);
        assert_eq!(db.stats().writes, 101);
    }
}
