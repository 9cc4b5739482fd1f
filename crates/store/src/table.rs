//! Schema-driven row storage.
//!
//! A [`Table`] owns an ordered list of [`TableField`]s. Field order fixes
//! column order in every generated statement, so callers pass and receive
//! rows as `Vec<Value>` positionally. Generated SQL is registered in the
//! table's [`StatementCache`] under a logical name.

use std::{fmt, sync::Arc};

use rusqlite::{Connection, Row, params_from_iter, types::Value};
use snafu::ResultExt;
use sqlkv_types::Context;

use crate::{
    db::Database,
    error::{Error, Result, SchemaSnafu},
    statement::StatementCache,
};

/// Storage class of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// 64-bit signed integer. An integer primary key aliases the rowid.
    Integer,
    /// UTF-8 text.
    Text,
    /// Raw bytes.
    Blob,
    /// 64-bit float.
    Real,
}

impl ColumnType {
    /// SQL type name.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Text => "TEXT",
            Self::Blob => "BLOB",
            Self::Real => "REAL",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Column definition.
///
/// # Example
///
/// ```
/// use sqlkv_store::{ColumnType, TableField};
///
/// let id = TableField::new("id", ColumnType::Integer).primary_key();
/// let email = TableField::new("email", ColumnType::Text).unique();
/// let phone = TableField::new("phone", ColumnType::Text).nullable().indexed();
/// assert!(id.is_primary_key() && email.is_unique() && phone.is_nullable());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableField {
    name: String,
    column_type: ColumnType,
    primary_key: bool,
    nullable: bool,
    unique: bool,
    indexed: bool,
}

impl TableField {
    /// A required, non-unique, unindexed column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            primary_key: false,
            nullable: false,
            unique: false,
            indexed: false,
        }
    }

    /// Marks the column as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    /// Allows NULL.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Adds a UNIQUE constraint.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Creates a secondary index `{table}_{column}_idx`.
    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Column name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Storage class.
    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    /// Whether this is the primary key.
    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    /// Whether NULL is allowed.
    pub fn is_nullable(&self) -> bool {
        self.nullable && !self.primary_key
    }

    /// Whether values must be unique. Primary keys are implicitly unique.
    pub fn is_unique(&self) -> bool {
        self.unique || self.primary_key
    }

    /// Whether a secondary index is created.
    pub fn is_indexed(&self) -> bool {
        self.indexed
    }

    fn column_sql(&self) -> String {
        let mut sql = format!("\"{}\" {}", self.name, self.column_type);
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
            // An INTEGER PRIMARY KEY aliases the rowid and must accept NULL
            // so the engine assigns one.
            if self.column_type != ColumnType::Integer {
                sql.push_str(" NOT NULL");
            }
        } else {
            if !self.nullable {
                sql.push_str(" NOT NULL");
            }
            if self.unique {
                sql.push_str(" UNIQUE");
            }
        }
        sql
    }
}

/// Options for [`Table::select`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectQuery<'a> {
    /// SQL predicate placed after `WHERE`; bind arguments with `?`.
    pub filter: Option<&'a str>,
    /// SQL placed after `ORDER BY`.
    pub order_by: Option<&'a str>,
    /// Maximum rows.
    pub limit: Option<u64>,
    /// Register the generated SQL under this name and reuse it on later
    /// calls. The first registration wins, so one name must always carry the
    /// same filter and ordering.
    pub statement: Option<&'a str>,
}

/// Logical statement name for an unnamed select, derived from its clauses.
fn select_name(query: &SelectQuery<'_>) -> String {
    let mut name = String::from("select");
    if let Some(filter) = query.filter {
        name.push_str(&format!(" where {filter}"));
    }
    if let Some(order_by) = query.order_by {
        name.push_str(&format!(" order by {order_by}"));
    }
    if let Some(limit) = query.limit {
        name.push_str(&format!(" limit {limit}"));
    }
    name
}

/// Returns `Ok` if `name` matches `[A-Za-z_][A-Za-z0-9_]*`.
pub(crate) fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(Error::invalid_argument(format!("invalid identifier {name:?}")))
    }
}

/// A table with a fixed schema.
pub struct Table {
    name: String,
    fields: Vec<TableField>,
    primary: usize,
    db: Arc<Database>,
    statements: StatementCache,
}

impl Table {
    /// Creates the table and its indexes if they do not exist.
    ///
    /// All DDL runs in one transaction, so a failure leaves no partial
    /// schema behind.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for a bad name, duplicate columns,
    /// or anything other than exactly one primary key, and
    /// [`Error::Schema`] if the engine rejects the DDL.
    pub fn create(
        ctx: &Context,
        db: Arc<Database>,
        name: impl Into<String>,
        fields: Vec<TableField>,
    ) -> Result<Self> {
        let name = name.into();
        validate_identifier(&name)?;
        for (i, field) in fields.iter().enumerate() {
            validate_identifier(field.name())?;
            if fields[..i].iter().any(|f| f.name() == field.name()) {
                return Err(Error::invalid_argument(format!(
                    "duplicate column {} in {name}",
                    field.name()
                )));
            }
        }
        let primaries: Vec<usize> =
            fields.iter().enumerate().filter(|(_, f)| f.is_primary_key()).map(|(i, _)| i).collect();
        let [primary] = primaries[..] else {
            return Err(Error::invalid_argument(format!(
                "table {name} needs exactly one primary key, found {}",
                primaries.len()
            )));
        };

        let ddl = create_table_sql(&name, &fields);
        db.transaction(ctx, |conn| {
            conn.execute_batch(&ddl).context(SchemaSnafu { table: name.as_str() })?;
            Ok(())
        })?;
        tracing::debug!(table = %name, columns = fields.len(), "Created table");

        Ok(Self { name, fields, primary, db, statements: StatementCache::new() })
    }

    /// Table name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Columns in order.
    pub fn fields(&self) -> &[TableField] {
        &self.fields
    }

    /// The primary-key column.
    pub fn primary_key(&self) -> &TableField {
        &self.fields[self.primary]
    }

    /// Position of the primary-key column.
    pub fn primary_index(&self) -> usize {
        self.primary
    }

    /// Position of the column called `name`.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name() == name)
    }

    /// The database this table lives in.
    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }

    /// Comma-separated quoted column list, in field order.
    pub fn column_list(&self) -> String {
        self.fields.iter().map(|f| format!("\"{}\"", f.name())).collect::<Vec<_>>().join(", ")
    }

    /// Inserts one row and returns the stored primary key.
    ///
    /// When the key is NULL on an integer primary key, the engine assigns a
    /// rowid and that value is returned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PrimaryKeyConstraint`] or [`Error::UniqueConstraint`]
    /// on conflicts, [`Error::InvalidArgument`] if `values` has the wrong
    /// length.
    pub fn insert(&self, ctx: &Context, values: &[Value]) -> Result<Value> {
        self.check_arity(values)?;
        self.db.write(ctx, |conn| {
            let mut stmt = self.statements.prepare(conn, "insert", || self.insert_sql())?;
            stmt.execute(params_from_iter(values))?;
            Ok(self.stored_key(conn, values))
        })
    }

    /// Inserts one row, or replaces every non-key column of the row with the
    /// same primary key.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UniqueConstraint`] if another row holds a unique
    /// value, [`Error::InvalidArgument`] if `values` has the wrong length.
    pub fn upsert(&self, ctx: &Context, values: &[Value]) -> Result<Value> {
        self.check_arity(values)?;
        self.db.write(ctx, |conn| {
            let mut stmt = self.statements.prepare(conn, "upsert", || self.upsert_sql())?;
            stmt.execute(params_from_iter(values))?;
            Ok(self.stored_key(conn, values))
        })
    }

    /// Replaces every non-key column of the row whose key matches
    /// `values[primary]`, optionally restricted by an extra predicate.
    ///
    /// Returns the number of rows changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UniqueConstraint`] if a unique value collides.
    pub fn update(&self, ctx: &Context, values: &[Value], guard: Option<&str>) -> Result<usize> {
        self.check_arity(values)?;
        let name = match guard {
            Some(guard) => format!("update where {guard}"),
            None => "update".to_string(),
        };
        let key = &values[self.primary];
        let bind = values
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != self.primary)
            .map(|(_, v)| v)
            .chain(std::iter::once(key));
        self.db.write(ctx, |conn| {
            let mut stmt = self.statements.prepare(conn, &name, || self.update_sql(guard))?;
            Ok(stmt.execute(params_from_iter(bind))?)
        })
    }

    /// Physically deletes the row with `key`. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Returns an engine error on failure.
    pub fn delete(&self, ctx: &Context, key: &Value) -> Result<usize> {
        self.execute(
            ctx,
            "delete",
            || {
                let column = self.primary_key().name();
                format!("DELETE FROM \"{}\" WHERE \"{column}\" = ?1", self.name)
            },
            std::slice::from_ref(key),
        )
    }

    /// Runs a named write statement and returns the affected row count.
    ///
    /// `build` is called only the first time `name` is used.
    ///
    /// # Errors
    ///
    /// Returns an engine or constraint error on failure.
    pub fn execute(
        &self,
        ctx: &Context,
        name: &str,
        build: impl FnOnce() -> String,
        bind: &[Value],
    ) -> Result<usize> {
        self.db.write(ctx, |conn| {
            let mut stmt = self.statements.prepare(conn, name, build)?;
            Ok(stmt.execute(params_from_iter(bind))?)
        })
    }

    /// Fetches at most one row whose `field` equals `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the table has no such field.
    pub fn row(&self, ctx: &Context, field: &str, key: &Value) -> Result<Option<Vec<Value>>> {
        self.row_where(ctx, field, None, key)
    }

    /// Like [`row`](Self::row), with an extra predicate ANDed to the match.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if the table has no such field.
    pub fn row_where(
        &self,
        ctx: &Context,
        field: &str,
        condition: Option<&str>,
        key: &Value,
    ) -> Result<Option<Vec<Value>>> {
        if self.field_index(field).is_none() {
            return Err(Error::invalid_argument(format!("{} has no field {field}", self.name)));
        }
        let name = match condition {
            Some(condition) => format!("row by {field} where {condition}"),
            None => format!("row by {field}"),
        };
        self.db.read(ctx, |conn| {
            let mut stmt = self.statements.prepare(conn, &name, || {
                let mut sql = format!(
                    "SELECT {} FROM \"{}\" WHERE \"{field}\" = ?1",
                    self.column_list(),
                    self.name
                );
                if let Some(condition) = condition {
                    sql.push_str(" AND (");
                    sql.push_str(condition);
                    sql.push(')');
                }
                sql.push_str(" LIMIT 1");
                sql
            })?;
            let mut rows = stmt.query([key])?;
            match rows.next()? {
                Some(row) => Ok(Some(self.read_row(row)?)),
                None => Ok(None),
            }
        })
    }

    /// Passes each row matching `query` to `on_row`.
    ///
    /// Rows are read under the database read lock and handed to `on_row`
    /// after the lock is released, so the callback may write through the same
    /// [`Database`]. An error from `on_row` stops iteration and is returned.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the SQL is invalid, or the first error from
    /// `on_row`.
    pub fn select(
        &self,
        ctx: &Context,
        query: &SelectQuery<'_>,
        bind: &[Value],
        on_row: impl FnMut(Vec<Value>) -> Result<()>,
    ) -> Result<()> {
        let name = match query.statement {
            Some(name) => format!("select:{name}"),
            None => select_name(query),
        };
        self.query(ctx, &name, || self.select_sql(query), bind, on_row)
    }

    /// Counts rows matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an engine error if the predicate is invalid.
    pub fn count(&self, ctx: &Context, filter: Option<&str>, bind: &[Value]) -> Result<i64> {
        let name = match filter {
            Some(filter) => format!("count where {filter}"),
            None => "count".to_string(),
        };
        self.db.read(ctx, |conn| {
            let mut stmt = self.statements.prepare(conn, &name, || {
                let mut sql = format!("SELECT COUNT(*) FROM \"{}\"", self.name);
                if let Some(filter) = filter {
                    sql.push_str(" WHERE ");
                    sql.push_str(filter);
                }
                sql
            })?;
            Ok(stmt.query_row(params_from_iter(bind), |row| row.get(0))?)
        })
    }

    /// Runs a named query whose result columns are this table's fields in
    /// order, passing each row to `on_row` once the read lock is released.
    pub(crate) fn query(
        &self,
        ctx: &Context,
        name: &str,
        build: impl FnOnce() -> String,
        bind: &[Value],
        on_row: impl FnMut(Vec<Value>) -> Result<()>,
    ) -> Result<()> {
        let rows = self.db.read(ctx, |conn| {
            let mut stmt = self.statements.prepare(conn, name, build)?;
            let mut rows = stmt.query(params_from_iter(bind))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(self.read_row(row)?);
            }
            Ok(out)
        })?;
        rows.into_iter().try_for_each(on_row)
    }

    /// The statement cache, shared with wrappers that add their own SQL.
    #[cfg(test)]
    pub(crate) fn statements(&self) -> &StatementCache {
        &self.statements
    }

    fn check_arity(&self, values: &[Value]) -> Result<()> {
        if values.len() != self.fields.len() {
            return Err(Error::invalid_argument(format!(
                "{} expects {} values, got {}",
                self.name,
                self.fields.len(),
                values.len()
            )));
        }
        Ok(())
    }

    fn stored_key(&self, conn: &Connection, values: &[Value]) -> Value {
        match &values[self.primary] {
            Value::Null if self.primary_key().column_type() == ColumnType::Integer => {
                Value::Integer(conn.last_insert_rowid())
            },
            key => key.clone(),
        }
    }

    fn read_row(&self, row: &Row<'_>) -> Result<Vec<Value>> {
        (0..self.fields.len()).map(|i| Ok(row.get::<_, Value>(i)?)).collect()
    }

    fn insert_sql(&self) -> String {
        let placeholders =
            (1..=self.fields.len()).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ");
        format!("INSERT INTO \"{}\" ({}) VALUES ({placeholders})", self.name, self.column_list())
    }

    fn upsert_sql(&self) -> String {
        let assignments = self
            .fields
            .iter()
            .filter(|f| !f.is_primary_key())
            .map(|f| format!("\"{0}\" = excluded.\"{0}\"", f.name()))
            .collect::<Vec<_>>();
        let mut sql = self.insert_sql();
        sql.push_str(&format!(" ON CONFLICT(\"{}\") DO ", self.primary_key().name()));
        if assignments.is_empty() {
            sql.push_str("NOTHING");
        } else {
            sql.push_str("UPDATE SET ");
            sql.push_str(&assignments.join(", "));
        }
        sql
    }

    fn update_sql(&self, guard: Option<&str>) -> String {
        let non_key: Vec<&TableField> =
            self.fields.iter().filter(|f| !f.is_primary_key()).collect();
        let assignments = non_key
            .iter()
            .enumerate()
            .map(|(i, f)| format!("\"{}\" = ?{}", f.name(), i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!(
            "UPDATE \"{}\" SET {assignments} WHERE \"{}\" = ?{}",
            self.name,
            self.primary_key().name(),
            non_key.len() + 1
        );
        if let Some(guard) = guard {
            sql.push_str(" AND (");
            sql.push_str(guard);
            sql.push(')');
        }
        sql
    }

    fn select_sql(&self, query: &SelectQuery<'_>) -> String {
        let mut sql = format!("SELECT {} FROM \"{}\"", self.column_list(), self.name);
        if let Some(filter) = query.filter {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        if let Some(order_by) = query.order_by {
            sql.push_str(" ORDER BY ");
            sql.push_str(order_by);
        }
        if let Some(limit) = query.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        sql
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .finish_non_exhaustive()
    }
}

fn create_table_sql(name: &str, fields: &[TableField]) -> String {
    let columns = fields.iter().map(TableField::column_sql).collect::<Vec<_>>().join(", ");
    let mut ddl = format!("CREATE TABLE IF NOT EXISTS \"{name}\" ({columns});");
    for field in fields.iter().filter(|f| f.is_indexed()) {
        ddl.push_str(&format!(
            "\nCREATE INDEX IF NOT EXISTS \"{name}_{0}_idx\" ON \"{name}\" (\"{0}\");",
            field.name()
        ));
    }
    ddl
}
