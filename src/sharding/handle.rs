// Shard handles and the registry the engine borrows them from
// The engine never opens or closes a handle; whoever built the registry
// owns that lifecycle and gets the handles back with `into_handles`.

use super::ShardIndex;
use crate::error::{Result, ShardError};
use crate::storage::{Row, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

/// An open channel to one shard's storage backend
///
/// Each call runs exactly one parameterized statement and is atomic on
/// that shard. Implementations must be shareable across threads since
/// scatter-gather queries hit every shard in parallel.
pub trait ShardHandle: Send + Sync {
    /// Run a write statement, returning the number of rows affected
    fn execute(&self, statement: &str, params: &[Value]) -> Result<usize>;

    /// Run a read statement
    fn query(&self, statement: &str, params: &[Value]) -> Result<RowSet>;

    /// False once the handle has been closed
    fn is_open(&self) -> bool {
        true
    }

    /// Insert a row unless its key is already present
    ///
    /// Returns true when a row was written. A constraint violation on an
    /// existing key is absorbed; any other violation (bad data) is returned.
    fn insert_if_absent(
        &self,
        insert: &str,
        params: &[Value],
        exists: &str,
        key: &[Value],
    ) -> Result<bool> {
        match self.execute(insert, params) {
            Ok(n) => Ok(n > 0),
            Err(ShardError::ConstraintViolation(reason)) => {
                let rows = self.query(exists, key)?;
                let present = rows
                    .iter()
                    .next()
                    .map(|row| row.integer("n"))
                    .transpose()?
                    .unwrap_or(0)
                    > 0;
                if present {
                    Ok(false)
                } else {
                    Err(ShardError::ConstraintViolation(reason))
                }
            }
            Err(e) => Err(e),
        }
    }
}

impl<H: ShardHandle + ?Sized> ShardHandle for Arc<H> {
    fn execute(&self, statement: &str, params: &[Value]) -> Result<usize> {
        (**self).execute(statement, params)
    }

    fn query(&self, statement: &str, params: &[Value]) -> Result<RowSet> {
        (**self).query(statement, params)
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

impl<H: ShardHandle + ?Sized> ShardHandle for &H {
    fn execute(&self, statement: &str, params: &[Value]) -> Result<usize> {
        (**self).execute(statement, params)
    }

    fn query(&self, statement: &str, params: &[Value]) -> Result<RowSet> {
        (**self).query(statement, params)
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}

/// Rows returned by a read statement, addressable by position or by name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl RowSet {
    pub fn new(columns: Vec<String>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = RowView<'_>> + '_ {
        self.rows.iter().map(move |row| RowView {
            columns: &self.columns,
            row,
        })
    }
}

/// One row of a RowSet
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    columns: &'a [String],
    row: &'a Row,
}

impl<'a> RowView<'a> {
    pub fn get(&self, index: usize) -> Option<&'a Value> {
        self.row.values.get(index)
    }

    /// Column names match case-insensitively
    pub fn by_name(&self, name: &str) -> Option<&'a Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(name))
            .and_then(|i| self.get(i))
    }

    fn required(&self, name: &str) -> Result<&'a Value> {
        self.by_name(name)
            .ok_or_else(|| ShardError::MalformedRow(format!("missing column '{}'", name)))
    }

    pub fn text(&self, name: &str) -> Result<&'a str> {
        let value = self.required(name)?;
        value.as_text().ok_or_else(|| {
            ShardError::MalformedRow(format!("column '{}' is not text: {}", name, value))
        })
    }

    pub fn integer(&self, name: &str) -> Result<i64> {
        let value = self.required(name)?;
        value.as_integer().ok_or_else(|| {
            ShardError::MalformedRow(format!("column '{}' is not an integer: {}", name, value))
        })
    }

    /// Like `integer` but NULL reads as None
    pub fn nullable_integer(&self, name: &str) -> Result<Option<i64>> {
        match self.required(name)? {
            Value::Null => Ok(None),
            _ => self.integer(name).map(Some),
        }
    }
}

/// Immutable map from shard index to handle, built once before the engine
#[derive(Debug)]
pub struct ShardRegistry<H> {
    handles: BTreeMap<ShardIndex, H>,
}

impl<H> ShardRegistry<H> {
    pub fn new() -> Self {
        Self {
            handles: BTreeMap::new(),
        }
    }

    /// Build from `(index, handle)` pairs; an index listed twice is rejected
    pub fn from_handles(handles: impl IntoIterator<Item = (ShardIndex, H)>) -> Result<Self> {
        let mut registry = Self::new();
        for (index, handle) in handles {
            registry.register(index, handle)?;
        }
        Ok(registry)
    }

    pub fn register(&mut self, index: ShardIndex, handle: H) -> Result<()> {
        if self.handles.contains_key(&index) {
            return Err(ShardError::InvalidConfiguration(format!(
                "shard {} registered twice",
                index
            )));
        }
        self.handles.insert(index, handle);
        Ok(())
    }

    pub fn get(&self, index: ShardIndex) -> Option<&H> {
        self.handles.get(&index)
    }

    pub fn indices(&self) -> impl Iterator<Item = ShardIndex> + '_ {
        self.handles.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Give the handles back so the owner can close them
    pub fn into_handles(self) -> BTreeMap<ShardIndex, H> {
        self.handles
    }
}

impl<H> Default for ShardRegistry<H> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> RowSet {
        RowSet::new(
            vec!["Name".to_string(), "n".to_string()],
            vec![Row::new(vec![Value::from("Ada"), Value::Null])],
        )
    }

    #[test]
    fn test_row_view_by_position_and_name() {
        let set = rows();
        let row = set.iter().next().unwrap();
        assert_eq!(row.get(0), Some(&Value::from("Ada")));
        assert_eq!(row.text("name").unwrap(), "Ada");
        assert_eq!(row.nullable_integer("n").unwrap(), None);
        assert!(matches!(row.integer("n"), Err(ShardError::MalformedRow(_))));
        assert!(matches!(row.text("email"), Err(ShardError::MalformedRow(_))));
    }

    #[test]
    fn test_registry_rejects_duplicate_index() {
        let err = ShardRegistry::from_handles(vec![(0, "a"), (0, "b")]).unwrap_err();
        assert!(matches!(err, ShardError::InvalidConfiguration(_)));

        let registry = ShardRegistry::from_handles(vec![(1, "b"), (0, "a")]).unwrap();
        assert_eq!(registry.indices().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(registry.get(1), Some(&"b"));
        assert_eq!(registry.into_handles().len(), 2);
    }
}
