//! Typed collections.
//!
//! A [`Collection<T>`] stores records of one type in a table laid out as
//!
//! ```text
//! key | flags | field columns... | payload
//! ```
//!
//! The payload is the whole record, serialized and optionally compressed by
//! the [`Codec`]. Field columns copy selected values out of the record so the
//! engine can index, constrain, and filter on them. On read the payload is
//! decoded first, then every column value is written back through its field
//! setter, so fields skipped by serde (typically the key) are restored from
//! their columns.
//!
//! Encoding and decoding always run outside the database lock: reads collect
//! raw rows and decode after the lock is released, writes encode before
//! taking it.

use std::{
    fmt,
    marker::PhantomData,
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
};

use rusqlite::types::Value;
use serde::{Serialize, de::DeserializeOwned};
use sqlkv_types::{Context, RecordFlags, config::CompressionMode};

use crate::{
    codec::{Codec, EncodeOptions, EncodedRecord},
    db::Database,
    error::{Error, Result},
    field::{Field, RESERVED_COLUMNS},
    search::{self, SearchIndex},
    table::{ColumnType, SelectQuery, Table, TableField},
};

const FLAGS_COLUMN: usize = 1;
const FIRST_FIELD_COLUMN: usize = 2;
const LIVE: &str = "flags & 1 = 0";

type Hook<T> = Arc<dyn Fn(&mut T) + Send + Sync>;
type Validator<T> = Arc<dyn Fn(&T) -> std::result::Result<(), String> + Send + Sync>;

/// Construction options for a [`Collection`].
///
/// # Example
///
/// ```no_run
/// use sqlkv_store::{CollectionOptions, ColumnType, Field};
/// use sqlkv_types::config::CompressionMode;
///
/// #[derive(serde::Serialize, serde::Deserialize, Default)]
/// struct Note {
///     #[serde(skip)]
///     id: i64,
///     author: String,
///     body: String,
/// }
///
/// let options = CollectionOptions::new(Field::new(
///     "id",
///     ColumnType::Integer,
///     |n: &Note| (n.id != 0).then_some(n.id),
///     |n, v: Option<i64>| n.id = v.unwrap_or_default(),
/// ))
/// .field(Field::new("author", ColumnType::Text, |n: &Note| n.author.clone(), |n, v| n.author = v).indexed())
/// .compression(CompressionMode::Dictionary)
/// .validate(|n| if n.body.is_empty() { Err("empty body".into()) } else { Ok(()) });
/// ```
pub struct CollectionOptions<T> {
    key: Field<T>,
    fields: Vec<Field<T>>,
    compression: CompressionMode,
    on_insert: Option<Hook<T>>,
    on_update: Option<Hook<T>>,
    validate: Option<Validator<T>>,
    search: Option<SearchIndex>,
}

impl<T> CollectionOptions<T> {
    /// Options keyed by `key`.
    ///
    /// For an integer key, have the getter return `None` (NULL) to let the
    /// engine assign one on insert.
    pub fn new(key: Field<T>) -> Self {
        Self {
            key: key.into_primary_key(),
            fields: Vec::new(),
            compression: CompressionMode::None,
            on_insert: None,
            on_update: None,
            validate: None,
            search: None,
        }
    }

    /// Adds a column copied out of each record.
    #[must_use]
    pub fn field(mut self, field: Field<T>) -> Self {
        self.fields.push(field);
        self
    }

    /// Sets the payload compression mode.
    #[must_use]
    pub fn compression(mut self, mode: CompressionMode) -> Self {
        self.compression = mode;
        self
    }

    /// Runs `hook` on the record before every insert.
    #[must_use]
    pub fn on_insert(mut self, hook: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        self.on_insert = Some(Arc::new(hook));
        self
    }

    /// Runs `hook` on the record before every upsert and update.
    #[must_use]
    pub fn on_update(mut self, hook: impl Fn(&mut T) + Send + Sync + 'static) -> Self {
        self.on_update = Some(Arc::new(hook));
        self
    }

    /// Rejects records for which `check` returns an error message.
    #[must_use]
    pub fn validate(
        mut self,
        check: impl Fn(&T) -> std::result::Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validate = Some(Arc::new(check));
        self
    }

    /// Maintains a full-text index over the given text fields.
    #[must_use]
    pub fn search_index(mut self, index: SearchIndex) -> Self {
        self.search = Some(index);
        self
    }
}

/// Options for [`Collection::select`].
///
/// Soft-deleted rows are always excluded; `filter` narrows further.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectOptions<'a> {
    /// SQL predicate over field columns; bind arguments with `?`.
    pub filter: Option<&'a str>,
    /// SQL placed after `ORDER BY`.
    pub order_by: Option<&'a str>,
    /// Maximum records.
    pub limit: Option<u64>,
    /// Reuse the generated statement under this name.
    pub statement: Option<&'a str>,
}

/// Typed record storage over one table.
pub struct Collection<T> {
    table: Table,
    codec: Arc<Codec>,
    key: Field<T>,
    fields: Vec<Field<T>>,
    compression: CompressionMode,
    dictionary_version: AtomicU8,
    on_insert: Option<Hook<T>>,
    on_update: Option<Hook<T>>,
    validate: Option<Validator<T>>,
    search: Option<SearchIndex>,
    _record: PhantomData<fn() -> T>,
}

impl<T> Collection<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Creates (if needed) and opens the collection table `name`.
    ///
    /// With [`CompressionMode::Dictionary`] the latest stored dictionary for
    /// `name` is picked up; until one is trained, payloads use plain zstd.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if a field uses a reserved column
    /// name, or dictionary mode is requested with a codec lacking a
    /// dictionary store; [`Error::Schema`] if table creation fails.
    pub fn open(
        ctx: &Context,
        db: Arc<Database>,
        codec: Arc<Codec>,
        name: impl Into<String>,
        options: CollectionOptions<T>,
    ) -> Result<Self> {
        let name = name.into();
        for field in std::iter::once(&options.key).chain(&options.fields) {
            if RESERVED_COLUMNS.contains(&field.column().name()) {
                return Err(Error::invalid_argument(format!(
                    "column name {} is reserved",
                    field.column().name()
                )));
            }
        }

        let dictionaries = codec.dictionaries().cloned();
        if options.compression == CompressionMode::Dictionary && dictionaries.is_none() {
            return Err(Error::invalid_argument(format!(
                "collection {name} uses dictionary compression but the codec has no dictionary store"
            )));
        }

        let mut columns = Vec::with_capacity(options.fields.len() + 3);
        columns.push(options.key.column().clone());
        columns.push(TableField::new("flags", ColumnType::Integer));
        columns.extend(options.fields.iter().map(|f| f.column().clone()));
        columns.push(TableField::new("payload", ColumnType::Blob));

        let table = Table::create(ctx, db, name, columns)?;
        if let Some(index) = &options.search {
            index.create(ctx, &table)?;
        }

        let dictionary_version = match (options.compression, dictionaries) {
            (CompressionMode::Dictionary, Some(store)) => store.latest_version(ctx, table.name())?,
            _ => 0,
        };
        tracing::debug!(
            collection = table.name(),
            fields = options.fields.len(),
            compression = ?options.compression,
            dictionary_version,
            "Opened collection"
        );

        Ok(Self {
            table,
            codec,
            key: options.key,
            fields: options.fields,
            compression: options.compression,
            dictionary_version: AtomicU8::new(dictionary_version),
            on_insert: options.on_insert,
            on_update: options.on_update,
            validate: options.validate,
            search: options.search,
            _record: PhantomData,
        })
    }

    /// Collection (table) name.
    pub fn name(&self) -> &str {
        self.table.name()
    }

    /// The underlying table.
    pub fn table(&self) -> &Table {
        &self.table
    }

    /// Compression mode for new writes.
    pub fn compression(&self) -> CompressionMode {
        self.compression
    }

    /// Dictionary version new writes compress with; 0 until one is trained.
    pub fn dictionary_version(&self) -> u8 {
        self.dictionary_version.load(Ordering::Acquire)
    }

    /// Validates, runs the insert hook, and stores `record` as a new row.
    ///
    /// Returns the stored key. When the engine assigned the key, it is also
    /// written back into `record`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] if the validation hook rejects the
    /// record, [`Error::PrimaryKeyConstraint`] or [`Error::UniqueConstraint`]
    /// on conflicts.
    pub fn insert(&self, ctx: &Context, record: &mut T) -> Result<Value> {
        self.check(record)?;
        if let Some(hook) = &self.on_insert {
            hook(record);
        }
        let encoded = self.encode(ctx, record)?;
        let values = self.row_values(record, encoded);
        let assigned = values[0] == Value::Null;
        let key = self.table.insert(ctx, &values)?;
        if assigned {
            self.key.set(record, key.clone())?;
        }
        Ok(key)
    }

    /// Validates, runs the update hook, and inserts or replaces the row with
    /// the record's key.
    ///
    /// Replacing a soft-deleted row makes it live again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] or [`Error::UniqueConstraint`].
    pub fn upsert(&self, ctx: &Context, record: &mut T) -> Result<Value> {
        self.check(record)?;
        if let Some(hook) = &self.on_update {
            hook(record);
        }
        let encoded = self.encode(ctx, record)?;
        let values = self.row_values(record, encoded);
        let assigned = values[0] == Value::Null;
        let key = self.table.upsert(ctx, &values)?;
        if assigned {
            self.key.set(record, key.clone())?;
        }
        Ok(key)
    }

    /// Validates, runs the update hook, and rewrites the live row with the
    /// record's key. Returns the number of rows changed (0 or 1).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Validation`] or [`Error::UniqueConstraint`].
    pub fn update(&self, ctx: &Context, record: &mut T) -> Result<usize> {
        self.check(record)?;
        if let Some(hook) = &self.on_update {
            hook(record);
        }
        let encoded = self.encode(ctx, record)?;
        let values = self.row_values(record, encoded);
        self.table.update(ctx, &values, Some(LIVE))
    }

    /// Fetches the live record with `key`.
    ///
    /// # Errors
    ///
    /// Returns decode errors such as [`Error::MissingDictionary`].
    pub fn get(&self, ctx: &Context, key: impl Into<Value>) -> Result<Option<T>> {
        let key_name = self.key.column().name();
        let row = self.table.row_where(ctx, key_name, Some(LIVE), &key.into())?;
        row.map(|row| self.decode_row(ctx, row)).transpose()
    }

    /// Fetches the live record whose unique `field` equals `value`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `field` is not a unique column.
    pub fn get_unique(
        &self,
        ctx: &Context,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<Option<T>> {
        let unique = self
            .table
            .field_index(field)
            .is_some_and(|i| self.table.fields()[i].is_unique());
        if !unique {
            return Err(Error::invalid_argument(format!(
                "{} has no unique field {field}",
                self.name()
            )));
        }
        let row = self.table.row_where(ctx, field, Some(LIVE), &value.into())?;
        row.map(|row| self.decode_row(ctx, row)).transpose()
    }

    /// Every live record matching `options`, decoded.
    ///
    /// # Errors
    ///
    /// Returns an engine error for invalid SQL fragments, or the first decode
    /// error.
    pub fn select(
        &self,
        ctx: &Context,
        options: &SelectOptions<'_>,
        bind: &[Value],
    ) -> Result<Vec<T>> {
        let filter = live_filter(options.filter);
        let query = SelectQuery {
            filter: Some(&filter),
            order_by: options.order_by,
            limit: options.limit,
            statement: options.statement,
        };
        let mut rows = Vec::new();
        self.table.select(ctx, &query, bind, |row| {
            rows.push(row);
            Ok(())
        })?;
        rows.into_iter().map(|row| self.decode_row(ctx, row)).collect()
    }

    /// Number of live records matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an engine error for an invalid predicate.
    pub fn count(&self, ctx: &Context, filter: Option<&str>, bind: &[Value]) -> Result<i64> {
        self.table.count(ctx, Some(&live_filter(filter)), bind)
    }

    /// Live records whose indexed text contains `query`, at most `limit`.
    ///
    /// The query is matched as a literal substring of at least three
    /// characters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the collection has no search
    /// index.
    pub fn search(&self, ctx: &Context, query: &str, limit: u64) -> Result<Vec<T>> {
        let Some(index) = &self.search else {
            return Err(Error::invalid_argument(format!("{} has no search index", self.name())));
        };
        let bind = [Value::Text(search::phrase(query)), Value::Integer(limit_value(limit))];
        let mut rows = Vec::new();
        self.table.query(ctx, "search", || index.search_sql(&self.table), &bind, |row| {
            rows.push(row);
            Ok(())
        })?;
        rows.into_iter().map(|row| self.decode_row(ctx, row)).collect()
    }

    /// Hides the record with `key` from reads. Returns rows changed (0 or 1).
    ///
    /// # Errors
    ///
    /// Returns an engine error on failure.
    pub fn soft_delete(&self, ctx: &Context, key: impl Into<Value>) -> Result<usize> {
        self.table.execute(
            ctx,
            "soft_delete",
            || {
                format!(
                    "UPDATE \"{}\" SET flags = flags | 1 WHERE \"{}\" = ?1 AND {LIVE}",
                    self.name(),
                    self.key.column().name()
                )
            },
            &[key.into()],
        )
    }

    /// Makes a soft-deleted record visible again. Returns rows changed.
    ///
    /// # Errors
    ///
    /// Returns an engine error on failure.
    pub fn restore(&self, ctx: &Context, key: impl Into<Value>) -> Result<usize> {
        self.table.execute(
            ctx,
            "restore",
            || {
                format!(
                    "UPDATE \"{}\" SET flags = flags & ~1 WHERE \"{}\" = ?1 AND flags & 1 = 1",
                    self.name(),
                    self.key.column().name()
                )
            },
            &[key.into()],
        )
    }

    /// Physically removes the record with `key`, live or soft-deleted.
    /// Returns rows removed.
    ///
    /// # Errors
    ///
    /// Returns an engine error on failure.
    pub fn delete(&self, ctx: &Context, key: impl Into<Value>) -> Result<usize> {
        self.table.delete(ctx, &key.into())
    }

    /// Trains a new dictionary version from up to `sample_limit` live
    /// payloads and switches new writes to it. Returns the new version.
    ///
    /// Rows written with earlier versions stay readable.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] unless the collection uses
    /// [`CompressionMode::Dictionary`] and has at least one live row,
    /// [`Error::Compression`] if zstd cannot train on the samples.
    pub fn train(&self, ctx: &Context, sample_limit: u64) -> Result<u8> {
        if self.compression != CompressionMode::Dictionary {
            return Err(Error::invalid_argument(format!(
                "{} does not use dictionary compression",
                self.name()
            )));
        }

        let query =
            SelectQuery { filter: Some(LIVE), limit: Some(sample_limit), ..SelectQuery::default() };
        let payload_column = self.table.fields().len() - 1;
        let mut raw_rows = Vec::new();
        self.table.select(ctx, &query, &[], |mut row| {
            let payload = std::mem::replace(&mut row[payload_column], Value::Null);
            raw_rows.push((row_flags(&row)?, payload));
            Ok(())
        })?;

        let samples = raw_rows
            .into_iter()
            .map(|(flags, payload)| {
                let Value::Blob(payload) = payload else {
                    return Err(malformed_payload());
                };
                self.codec.decode_bytes(ctx, &payload, flags, self.name())
            })
            .collect::<Result<Vec<_>>>()?;

        let version = self.codec.train(ctx, self.name(), &samples)?;
        self.dictionary_version.store(version, Ordering::Release);
        Ok(version)
    }

    fn check(&self, record: &T) -> Result<()> {
        match &self.validate {
            Some(validate) => validate(record).map_err(|message| Error::Validation { message }),
            None => Ok(()),
        }
    }

    fn encode(&self, ctx: &Context, record: &T) -> Result<EncodedRecord> {
        let options = match self.compression {
            CompressionMode::None => EncodeOptions::default(),
            CompressionMode::Zstd => EncodeOptions { compress: true, ..EncodeOptions::default() },
            CompressionMode::Dictionary => {
                let version = self.dictionary_version();
                EncodeOptions {
                    compress: true,
                    use_dictionary: version != 0,
                    dictionary_key: self.name(),
                    dictionary_version: version,
                }
            },
        };
        self.codec.encode(ctx, record, &options)
    }

    fn row_values(&self, record: &T, encoded: EncodedRecord) -> Vec<Value> {
        let mut values = Vec::with_capacity(self.fields.len() + 3);
        values.push(self.key.get(record));
        values.push(Value::Integer(encoded.flags.bits()));
        values.extend(self.fields.iter().map(|f| f.get(record)));
        values.push(Value::Blob(encoded.payload));
        values
    }

    fn decode_row(&self, ctx: &Context, mut row: Vec<Value>) -> Result<T> {
        let flags = row_flags(&row)?;
        let Some(Value::Blob(payload)) = row.pop() else {
            return Err(malformed_payload());
        };
        let mut record: T = self.codec.decode(ctx, &payload, flags, self.name())?;

        let mut columns = row.into_iter();
        if let Some(key) = columns.next() {
            self.key.set(&mut record, key)?;
        }
        for (field, value) in self.fields.iter().zip(columns.skip(FIRST_FIELD_COLUMN - 1)) {
            field.set(&mut record, value)?;
        }
        Ok(record)
    }
}

impl<T> fmt::Debug for Collection<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collection")
            .field("table", &self.table.name())
            .field("compression", &self.compression)
            .field("dictionary_version", &self.dictionary_version.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

fn live_filter(filter: Option<&str>) -> String {
    match filter {
        Some(filter) => format!("{LIVE} AND ({filter})"),
        None => LIVE.to_string(),
    }
}

fn limit_value(limit: u64) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn row_flags(row: &[Value]) -> Result<RecordFlags> {
    match row.get(FLAGS_COLUMN) {
        Some(Value::Integer(bits)) => Ok(RecordFlags::from_bits(*bits)),
        other => Err(Error::invalid_argument(format!("row has malformed flags: {other:?}"))),
    }
}

fn malformed_payload() -> Error {
    Error::invalid_argument("row has no payload blob")
}
