//! Full-text search over collection columns.
//!
//! A [`SearchIndex`] adds a contentless FTS5 table `{table}_ft` using the
//! trigram tokenizer, kept in step with the base table by three triggers:
//!
//! ```text
//! {table}_ft_ai  AFTER INSERT  -> insert new.rowid
//! {table}_ft_ad  AFTER DELETE  -> delete old.rowid
//! {table}_ft_au  AFTER UPDATE  -> rewrite every indexed column of old.rowid
//! ```
//!
//! The index holds no copy of the text, only tokens, so results are joined
//! back to the base table by rowid. Flags and payload are never indexed.

use snafu::ResultExt;
use sqlkv_types::Context;

use crate::{
    error::{Error, Result, SchemaSnafu},
    field::RESERVED_COLUMNS,
    table::{ColumnType, Table, validate_identifier},
};

/// Columns to index for full-text search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchIndex {
    columns: Vec<String>,
}

impl SearchIndex {
    /// Indexes the named text columns.
    pub fn new<I, S>(columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { columns: columns.into_iter().map(Into::into).collect() }
    }

    /// Indexed column names.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Name of the FTS table for `table`.
    pub fn fts_table(table: &str) -> String {
        format!("{table}_ft")
    }

    /// Creates the FTS table and triggers for `table` if they do not exist.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if a column is missing, reserved,
    /// or not text, and [`Error::Schema`] if the engine rejects the DDL.
    pub(crate) fn create(&self, ctx: &Context, table: &Table) -> Result<()> {
        self.validate(table)?;
        let ddl = self.ddl(table.name());
        table.database().transaction(ctx, |conn| {
            conn.execute_batch(&ddl).context(SchemaSnafu { table: Self::fts_table(table.name()) })?;
            Ok(())
        })?;
        tracing::debug!(table = table.name(), columns = ?self.columns, "Created search index");
        Ok(())
    }

    /// SQL selecting live base-table rows that match `?1`, at most `?2`.
    pub(crate) fn search_sql(&self, table: &Table) -> String {
        let name = table.name();
        let fts = Self::fts_table(name);
        let columns = table
            .fields()
            .iter()
            .map(|f| format!("\"{name}\".\"{}\"", f.name()))
            .collect::<Vec<_>>()
            .join(", ");
        format!(
            "SELECT {columns} FROM \"{fts}\" JOIN \"{name}\" ON \"{name}\".rowid = \"{fts}\".rowid \
             WHERE \"{fts}\" MATCH ?1 AND \"{name}\".flags & 1 = 0 \
             ORDER BY \"{name}\".rowid LIMIT ?2"
        )
    }

    fn validate(&self, table: &Table) -> Result<()> {
        if self.columns.is_empty() {
            return Err(Error::invalid_argument("search index needs at least one column"));
        }
        for column in &self.columns {
            validate_identifier(column)?;
            if RESERVED_COLUMNS.contains(&column.as_str()) {
                return Err(Error::invalid_argument(format!("column {column} cannot be indexed")));
            }
            let field = table
                .field_index(column)
                .map(|i| &table.fields()[i])
                .ok_or_else(|| {
                    Error::invalid_argument(format!("{} has no field {column}", table.name()))
                })?;
            if field.column_type() != ColumnType::Text {
                return Err(Error::invalid_argument(format!("search column {column} is not text")));
            }
        }
        Ok(())
    }

    fn ddl(&self, table: &str) -> String {
        let fts = Self::fts_table(table);
        let cols = self.columns.join(", ");
        let new_cols =
            self.columns.iter().map(|c| format!("new.{c}")).collect::<Vec<_>>().join(", ");
        let assignments =
            self.columns.iter().map(|c| format!("{c} = new.{c}")).collect::<Vec<_>>().join(", ");
        format!(
            "CREATE VIRTUAL TABLE IF NOT EXISTS \"{fts}\" USING fts5(\
                {cols}, content='', contentless_delete=1, tokenize='trigram');\n\
             CREATE TRIGGER IF NOT EXISTS \"{fts}_ai\" AFTER INSERT ON \"{table}\" BEGIN \
                INSERT INTO \"{fts}\" (rowid, {cols}) VALUES (new.rowid, {new_cols}); END;\n\
             CREATE TRIGGER IF NOT EXISTS \"{fts}_ad\" AFTER DELETE ON \"{table}\" BEGIN \
                DELETE FROM \"{fts}\" WHERE rowid = old.rowid; END;\n\
             CREATE TRIGGER IF NOT EXISTS \"{fts}_au\" AFTER UPDATE ON \"{table}\" BEGIN \
                UPDATE \"{fts}\" SET {assignments} WHERE rowid = old.rowid; END;"
        )
    }
}

/// Quotes `query` as a single FTS5 phrase so user input is matched
/// literally.
pub(crate) fn phrase(query: &str) -> String {
    format!("\"{}\"", query.replace('"', "\"\""))
}
