// Storage module - the in-memory row store behind one shard
// Every shard owns its own set of tables; nothing here knows about sharding

pub mod btree;
pub mod page;
pub mod table;

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Represents a single row in a table
/// A row is positional: values[i] belongs to schema column i
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }
}

/// A single typed column value
///
/// Ordering and hashing are derived so values can key indexes and
/// GROUP BY buckets directly. Values of different variants order by
/// variant (Null < Integer < Text).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Value {
    Null,
    Integer(i64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Whether this value may be stored in a column of the given type
    /// NULL fits every type; nullability is checked separately
    pub fn fits(&self, data_type: &DataType) -> bool {
        matches!(
            (self, data_type),
            (Value::Null, _)
                | (Value::Integer(_), DataType::Integer)
                | (Value::Text(_), DataType::Text)
        )
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i64::from(i))
    }
}

/// Represents the schema (structure) of a table
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Schema {
    pub columns: Vec<Column>,
    /// Column positions forming the primary key, in declaration order
    /// Empty when the table has no primary key
    pub primary_key: Vec<usize>,
}

/// Represents a single column definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Column {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
}

/// The data types our storage supports
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum DataType {
    Integer,
    Text,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Integer => f.write_str("INTEGER"),
            DataType::Text => f.write_str("TEXT"),
        }
    }
}

impl Schema {
    pub fn new(columns: Vec<Column>, primary_key: Vec<usize>) -> Self {
        Self {
            columns,
            primary_key,
        }
    }

    /// Find the index of a column by name
    pub fn get_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    /// Extract the primary key of a row, if the table has one
    pub fn primary_key_of(&self, values: &[Value]) -> Option<Vec<Value>> {
        if self.primary_key.is_empty() {
            return None;
        }
        Some(self.primary_key.iter().map(|&i| values[i].clone()).collect())
    }
}

/// Errors raised by the row store itself
///
/// These are the errors a real backend would report as constraint
/// failures; callers can tell them apart from plan/parse errors.
#[derive(Debug, Error, PartialEq)]
pub enum StorageError {
    #[error("primary key violation on '{table}': duplicate key ({key})")]
    DuplicateKey { table: String, key: String },

    #[error("column '{column}' of '{table}' may not be NULL")]
    NullViolation { table: String, column: String },

    #[error("column '{column}' of '{table}' expects {expected}, got '{value}'")]
    TypeMismatch {
        table: String,
        column: String,
        expected: DataType,
        value: Value,
    },

    #[error("expected {expected} values for '{table}', got {actual}")]
    Arity {
        table: String,
        expected: usize,
        actual: usize,
    },

    #[error("column not found: {0}")]
    ColumnNotFound(String),
}

impl StorageError {
    /// True for errors caused by the data being written rather than the
    /// statement shape
    pub fn is_constraint(&self) -> bool {
        matches!(
            self,
            StorageError::DuplicateKey { .. }
                | StorageError::NullViolation { .. }
                | StorageError::TypeMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_fits_type() {
        assert!(Value::Integer(3).fits(&DataType::Integer));
        assert!(Value::Null.fits(&DataType::Text));
        assert!(!Value::from("x").fits(&DataType::Integer));
    }

    #[test]
    fn test_primary_key_extraction() {
        let schema = Schema::new(
            vec![
                Column {
                    name: "a".to_string(),
                    data_type: DataType::Text,
                    nullable: false,
                },
                Column {
                    name: "b".to_string(),
                    data_type: DataType::Integer,
                    nullable: true,
                },
            ],
            vec![0, 1],
        );
        let key = schema.primary_key_of(&[Value::from("s1"), Value::Integer(2)]);
        assert_eq!(key, Some(vec![Value::from("s1"), Value::Integer(2)]));
    }
}
