//! sqlkv-store: typed record storage over SQLite.
//!
//! Records of a Rust type are serialized into a payload column, optionally
//! compressed with zstd or a trained per-table dictionary, while selected
//! fields are copied into ordinary columns for indexing, uniqueness, and
//! filtering.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │        Collection<T>  /  Counter             │
//! │  (validate, hooks, soft delete, search)      │
//! └──────────┬──────────────────────┬───────────┘
//!            │                      │
//! ┌──────────▼──────────┐ ┌─────────▼───────────┐
//! │        Table         │ │        Codec         │
//! │ (DDL, cached stmts)  │ │ (postcard + zstd)    │
//! └──────────┬──────────┘ └─────────┬───────────┘
//!            │            ┌─────────▼───────────┐
//!            │            │   DictionaryStore    │
//!            │            │ (versions, compiled) │
//!            │            └─────────┬───────────┘
//! ┌──────────▼──────────────────────▼───────────┐
//! │                 Database                     │
//! │   (one writer, reader pool, RW lock, WAL)    │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use sqlkv_store::{Codec, Collection, CollectionOptions, ColumnType, Database, Field};
//! use sqlkv_types::{Context, config::{CompressionConfig, CompressionMode}};
//!
//! #[derive(serde::Serialize, serde::Deserialize, Default)]
//! struct User {
//!     #[serde(skip)]
//!     id: i64,
//!     email: String,
//!     bio: String,
//! }
//!
//! let ctx = Context::background();
//! let db = Arc::new(Database::open_in_memory()?);
//! let codec = Arc::new(Codec::open(&ctx, Arc::clone(&db), CompressionConfig::default())?);
//!
//! let options = CollectionOptions::new(Field::new(
//!     "id",
//!     ColumnType::Integer,
//!     |u: &User| (u.id != 0).then_some(u.id),
//!     |u, v: Option<i64>| u.id = v.unwrap_or_default(),
//! ))
//! .field(Field::new("email", ColumnType::Text, |u: &User| u.email.clone(), |u, v| u.email = v).unique())
//! .compression(CompressionMode::Zstd);
//! let users = Collection::open(&ctx, db, codec, "users", options)?;
//!
//! let mut user = User { email: "ada@example.com".into(), ..User::default() };
//! users.insert(&ctx, &mut user)?;
//! let loaded = users.get(&ctx, user.id)?;
//! # Ok::<(), sqlkv_store::Error>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod codec;
pub mod collection;
pub mod counter;
pub mod db;
pub mod dictionary;
pub mod error;
pub mod field;
pub mod retry;
pub mod search;
pub mod statement;
pub mod table;

// Re-export commonly used types
pub use codec::{Codec, EncodeOptions, EncodedRecord};
pub use collection::{Collection, CollectionOptions, SelectOptions};
pub use counter::{COUNTER_TABLE, Counter, CounterRecord, counter_collection};
pub use db::{Database, DatabaseStats};
pub use dictionary::{CompiledDictionary, DICTIONARY_TABLE, DictionaryStore, MAX_DICTIONARY_VERSION};
pub use error::{Error, ErrorCode, Result};
pub use field::{Field, RESERVED_COLUMNS};
pub use retry::retry_on_key_collision;
pub use search::SearchIndex;
pub use statement::StatementCache;
pub use table::{ColumnType, SelectQuery, Table, TableField};
