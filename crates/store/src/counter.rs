//! Durable monotonic counters.
//!
//! A [`Counter`] hands out strictly increasing `i64` ids. It persists only a
//! high-water mark (`limit`) and serves ids below it from memory, so one
//! durable write covers `reserve` ids. The new limit is stored before any id
//! past the old one is returned; after a crash the counter resumes at the
//! persisted limit, skipping whatever was reserved but unused.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sqlkv_types::{Context, config::CounterConfig};

use crate::{
    codec::Codec,
    collection::{Collection, CollectionOptions},
    db::Database,
    error::{Error, Result},
    field::Field,
    table::ColumnType,
};

/// Table holding every counter's persisted limit.
pub const COUNTER_TABLE: &str = "counters";

/// Persisted state of one counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterRecord {
    /// Counter name; stored in the key column.
    #[serde(skip)]
    pub key: String,
    /// Ids below this value may have been handed out.
    pub limit: i64,
}

/// Opens the shared `counters` collection.
///
/// # Errors
///
/// Returns [`Error::Schema`](crate::Error::Schema) if the table cannot be
/// created.
pub fn counter_collection(
    ctx: &Context,
    db: Arc<Database>,
    codec: Arc<Codec>,
) -> Result<Collection<CounterRecord>> {
    let key = Field::new(
        "key",
        ColumnType::Text,
        |r: &CounterRecord| r.key.clone(),
        |r, v| r.key = v,
    );
    Collection::open(ctx, db, codec, COUNTER_TABLE, CollectionOptions::new(key))
}

#[derive(Debug)]
struct State {
    current: i64,
    limit: i64,
}

/// A named id sequence backed by one row of the counters collection.
///
/// Safe to share between threads; [`next`](Self::next) serializes callers.
pub struct Counter {
    key: String,
    reserve: i64,
    records: Arc<Collection<CounterRecord>>,
    state: Mutex<State>,
}

impl Counter {
    /// Loads counter `key`, starting at `config.start` if it was never
    /// persisted or the persisted limit is lower.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`](crate::Error::Config) for an invalid config,
    /// or a read or decode error.
    pub fn open(
        ctx: &Context,
        records: Arc<Collection<CounterRecord>>,
        key: impl Into<String>,
        config: &CounterConfig,
    ) -> Result<Self> {
        config.validate()?;
        let key = key.into();
        let persisted = records.get(ctx, key.clone())?.map(|r| r.limit);
        let current = persisted.map_or(config.start, |limit| limit.max(config.start));
        tracing::debug!(counter = %key, current, persisted = ?persisted, "Opened counter");
        Ok(Self {
            key,
            reserve: config.reserve,
            records,
            state: Mutex::new(State { current, limit: current }),
        })
    }

    /// Counter name.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Returns the next id.
    ///
    /// # Errors
    ///
    /// Returns the write error if a new reservation cannot be persisted; the
    /// counter is unchanged in that case and the call may be retried.
    /// Returns [`Error::CounterExhausted`] once the next block would pass
    /// `i64::MAX`.
    pub fn next(&self, ctx: &Context) -> Result<i64> {
        let mut state = self.state.lock();
        if state.current >= state.limit {
            let limit = state.current.checked_add(self.reserve).ok_or_else(|| {
                Error::CounterExhausted { key: self.key.clone(), current: state.current }
            })?;
            let mut record = CounterRecord { key: self.key.clone(), limit };
            self.records.upsert(ctx, &mut record)?;
            tracing::debug!(counter = %self.key, limit, "Reserved counter block");
            state.limit = limit;
        }
        // current < limit here, so the increment cannot overflow
        let id = state.current;
        state.current += 1;
        Ok(id)
    }

    /// Persisted high-water mark as last written by this instance.
    pub fn limit(&self) -> i64 {
        self.state.lock().limit
    }
}

impl std::fmt::Debug for Counter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Counter")
            .field("key", &self.key)
            .field("current", &state.current)
            .field("limit", &state.limit)
            .finish()
    }
}
