//! Typed field descriptors.
//!
//! A [`Field`] pairs a column definition with a getter and setter closure,
//! so a collection can copy values between a record and a row without
//! reflection.

use std::{fmt, sync::Arc};

use rusqlite::types::{FromSql, Value, ValueRef};

use crate::{
    error::{Error, Result},
    table::{ColumnType, TableField},
};

/// Column names a collection reserves for itself.
pub const RESERVED_COLUMNS: [&str; 2] = ["flags", "payload"];

type Getter<T> = Arc<dyn Fn(&T) -> Value + Send + Sync>;
type Setter<T> = Arc<dyn Fn(&mut T, Value) -> Result<()> + Send + Sync>;

/// A column of a collection backed by accessors on `T`.
///
/// # Example
///
/// ```
/// use sqlkv_store::{ColumnType, Field};
///
/// struct User {
///     id: i64,
///     email: String,
/// }
///
/// let id = Field::new("id", ColumnType::Integer, |u: &User| u.id, |u, v| u.id = v);
/// let email = Field::new("email", ColumnType::Text, |u: &User| u.email.clone(), |u, v| u.email = v)
///     .unique();
/// assert_eq!(email.column().name(), "email");
/// # let _ = id;
/// ```
pub struct Field<T> {
    column: TableField,
    get: Getter<T>,
    set: Setter<T>,
}

impl<T> Clone for Field<T> {
    fn clone(&self) -> Self {
        Self { column: self.column.clone(), get: Arc::clone(&self.get), set: Arc::clone(&self.set) }
    }
}

impl<T: 'static> Field<T> {
    /// Describes a column read with `get` and written back with `set`.
    ///
    /// `V` is the Rust type stored in the column: `i64`, `String`,
    /// `Vec<u8>`, `f64`, `bool`, or an `Option` of one of them for nullable
    /// columns.
    pub fn new<V>(
        name: impl Into<String>,
        column_type: ColumnType,
        get: impl Fn(&T) -> V + Send + Sync + 'static,
        set: impl Fn(&mut T, V) + Send + Sync + 'static,
    ) -> Self
    where
        V: Into<Value> + FromSql + 'static,
    {
        let column = TableField::new(name, column_type);
        let column_name = column.name().to_string();
        Self {
            column,
            get: Arc::new(move |record| get(record).into()),
            set: Arc::new(move |record, value| {
                let converted = V::column_result(ValueRef::from(&value)).map_err(|e| {
                    Error::invalid_argument(format!("column {column_name}: {e}"))
                })?;
                set(record, converted);
                Ok(())
            }),
        }
    }
}

impl<T> Field<T> {
    /// Allows NULL.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.column = self.column.nullable();
        self
    }

    /// Adds a UNIQUE constraint.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.column = self.column.unique();
        self
    }

    /// Creates a secondary index.
    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.column = self.column.indexed();
        self
    }

    /// The column definition.
    pub fn column(&self) -> &TableField {
        &self.column
    }

    /// Reads the column value from `record`.
    pub fn get(&self, record: &T) -> Value {
        (self.get)(record)
    }

    /// Writes a column value into `record`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `value` does not convert to the
    /// field's Rust type.
    pub fn set(&self, record: &mut T, value: Value) -> Result<()> {
        (self.set)(record, value)
    }

    pub(crate) fn into_primary_key(mut self) -> Self {
        self.column = self.column.primary_key();
        self
    }
}

impl<T> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field").field("column", &self.column).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Item {
        id: i64,
        label: String,
        note: Option<String>,
    }

    #[test]
    fn test_get_and_set() {
        let label = Field::new("label", ColumnType::Text, |i: &Item| i.label.clone(), |i, v| {
            i.label = v
        });
        let mut item = Item { label: "old".into(), ..Item::default() };
        assert_eq!(label.get(&item), Value::Text("old".into()));
        label.set(&mut item, Value::Text("new".into())).unwrap();
        assert_eq!(item.label, "new");
    }

    #[test]
    fn test_optional_field() {
        let note = Field::new("note", ColumnType::Text, |i: &Item| i.note.clone(), |i, v| {
            i.note = v
        })
        .nullable();
        let mut item = Item::default();
        assert_eq!(note.get(&item), Value::Null);
        note.set(&mut item, Value::Text("hi".into())).unwrap();
        assert_eq!(item.note.as_deref(), Some("hi"));
        note.set(&mut item, Value::Null).unwrap();
        assert!(item.note.is_none());
        assert!(note.column().is_nullable());
    }

    #[test]
    fn test_type_mismatch_is_invalid_argument() {
        let id = Field::new("id", ColumnType::Integer, |i: &Item| i.id, |i, v| i.id = v);
        let mut item = Item::default();
        let err = id.set(&mut item, Value::Text("seven".into())).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument { .. }));
        assert!(err.to_string().contains("column id"), "{err}");
    }

    #[test]
    fn test_primary_key_marking() {
        let id = Field::new("id", ColumnType::Integer, |i: &Item| i.id, |i, v| i.id = v);
        let pk = id.clone().into_primary_key();
        assert!(pk.column().is_primary_key());
        assert!(!id.column().is_primary_key());
    }
}
