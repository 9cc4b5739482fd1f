//! Shared fixtures for store integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlkv_store::{
    Codec, Collection, CollectionOptions, ColumnType, Database, Field, SearchIndex,
};
use sqlkv_test_utils::{TestDir, corpus, test_compression_config, test_database_config};
use sqlkv_types::{Context, config::CompressionMode};

/// Record used across integration tests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    /// Stored only in the key column.
    #[serde(skip)]
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub notes: String,
    pub visits: u32,
}

impl Patient {
    /// A patient whose text comes from the training corpus.
    pub fn sample(i: usize) -> Self {
        Self {
            id: 0,
            name: format!("Patient {i}"),
            email: format!("patient{i}@example.com"),
            phone: (i % 2 == 0).then(|| format!("555-{i:04}")),
            notes: corpus::note(i),
            visits: (i % 5) as u32,
        }
    }
}

/// Collection options for `Patient` with a unique email and indexed phone.
pub fn patient_options(mode: CompressionMode) -> CollectionOptions<Patient> {
    CollectionOptions::new(Field::new(
        "id",
        ColumnType::Integer,
        |p: &Patient| (p.id != 0).then_some(p.id),
        |p, v: Option<i64>| p.id = v.unwrap_or_default(),
    ))
    .field(Field::new("email", ColumnType::Text, |p: &Patient| p.email.clone(), |p, v| p.email = v).unique())
    .field(
        Field::new("phone", ColumnType::Text, |p: &Patient| p.phone.clone(), |p, v| p.phone = v)
            .nullable()
            .indexed(),
    )
    .field(Field::new("notes", ColumnType::Text, |p: &Patient| p.notes.clone(), |p, v| p.notes = v))
    .compression(mode)
}

/// Same as [`patient_options`] with a full-text index over name and notes.
pub fn searchable_patient_options(mode: CompressionMode) -> CollectionOptions<Patient> {
    patient_options(mode)
        .field(Field::new("name", ColumnType::Text, |p: &Patient| p.name.clone(), |p, v| p.name = v))
        .search_index(SearchIndex::new(["name", "notes"]))
}

/// An in-memory database plus a dictionary-capable codec.
pub struct Fixture {
    pub ctx: Context,
    pub db: Arc<Database>,
    pub codec: Arc<Codec>,
}

impl Fixture {
    pub fn in_memory() -> Self {
        let ctx = Context::background();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let codec = Arc::new(Codec::open(&ctx, Arc::clone(&db), test_compression_config()).unwrap());
        Self { ctx, db, codec }
    }

    pub fn on_disk(dir: &TestDir) -> Self {
        let ctx = Context::background();
        let db = Arc::new(Database::open(dir.database_path(), test_database_config()).unwrap());
        let codec = Arc::new(Codec::open(&ctx, Arc::clone(&db), test_compression_config()).unwrap());
        Self { ctx, db, codec }
    }

    pub fn patients(&self, options: CollectionOptions<Patient>) -> Collection<Patient> {
        Collection::open(&self.ctx, Arc::clone(&self.db), Arc::clone(&self.codec), "patients", options)
            .unwrap()
    }
}
