//! Column values, rows, and result sets exchanged with a backend.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Null,
    Uuid(Uuid),
    BigInt(i64),
    Int(i32),
    Text(String),
    Blob(#[serde(with = "blob")] Vec<u8>),
    Map(BTreeMap<String, String>),
}

impl Value {
    /// Column type name, as used in decode errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Uuid(_) => "uuid",
            Value::BigInt(_) => "bigint",
            Value::Int(_) => "int",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
            Value::Map(_) => "map",
        }
    }
}

impl From<Option<String>> for Value {
    fn from(value: Option<String>) -> Self {
        value.map_or(Value::Null, Value::Text)
    }
}

/// Errors from typed column access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ColumnError {
    #[error("column {0} is missing")]
    Missing(String),

    #[error("column {0} is null")]
    Null(String),

    #[error("column {column} has type {found}, expected {expected}")]
    WrongType {
        column: String,
        expected: &'static str,
        found: &'static str,
    },
}

/// One row: column name to value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    columns: BTreeMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a column, builder style.
    pub fn with(mut self, column: impl Into<String>, value: Value) -> Self {
        self.insert(column, value);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        self.columns.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.columns.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn require(&self, column: &str) -> Result<&Value, ColumnError> {
        self.columns
            .get(column)
            .ok_or_else(|| ColumnError::Missing(column.to_string()))
    }

    pub fn get_uuid(&self, column: &str) -> Result<Uuid, ColumnError> {
        match self.require(column)? {
            Value::Uuid(v) => Ok(*v),
            other => Err(wrong_type(column, "uuid", other)),
        }
    }

    pub fn get_big_int(&self, column: &str) -> Result<i64, ColumnError> {
        match self.require(column)? {
            Value::BigInt(v) => Ok(*v),
            other => Err(wrong_type(column, "bigint", other)),
        }
    }

    pub fn get_int(&self, column: &str) -> Result<i32, ColumnError> {
        match self.require(column)? {
            Value::Int(v) => Ok(*v),
            other => Err(wrong_type(column, "int", other)),
        }
    }

    /// Nullable text; `Null` reads as `None`.
    pub fn get_text(&self, column: &str) -> Result<Option<String>, ColumnError> {
        match self.require(column)? {
            Value::Null => Ok(None),
            Value::Text(v) => Ok(Some(v.clone())),
            other => Err(wrong_type(column, "text", other)),
        }
    }

    /// Nullable map; `Null` reads as an empty map.
    pub fn get_map(&self, column: &str) -> Result<BTreeMap<String, String>, ColumnError> {
        match self.require(column)? {
            Value::Null => Ok(BTreeMap::new()),
            Value::Map(v) => Ok(v.clone()),
            other => Err(wrong_type(column, "map", other)),
        }
    }

    /// Moves a blob column out of the row without copying it.
    pub fn take_blob(&mut self, column: &str) -> Result<Vec<u8>, ColumnError> {
        match self.columns.remove(column) {
            Some(Value::Blob(v)) => Ok(v),
            Some(Value::Null) => Err(ColumnError::Null(column.to_string())),
            Some(other) => {
                let err = wrong_type(column, "blob", &other);
                self.columns.insert(column.to_string(), other);
                Err(err)
            }
            None => Err(ColumnError::Missing(column.to_string())),
        }
    }
}

fn wrong_type(column: &str, expected: &'static str, found: &Value) -> ColumnError {
    ColumnError::WrongType {
        column: column.to_string(),
        expected,
        found: found.type_name(),
    }
}

/// Rows returned by a backend operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResultSet {
    rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// First row, if any.
    pub fn one(self) -> Option<Row> {
        self.rows.into_iter().next()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

mod blob {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(data))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD.decode(encoded).map_err(serde::de::Error::custom)
    }
}
