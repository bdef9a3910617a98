use std::sync::Arc;

use crate::{BackendError, Row, Value};

/// A table and the columns forming its primary key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    keyspace: String,
    name: String,
    primary_key: Vec<String>,
}

impl TableSchema {
    pub fn new(keyspace: impl Into<String>, name: impl Into<String>, primary_key: &[&str]) -> Self {
        Self {
            keyspace: keyspace.into(),
            name: name.into(),
            primary_key: primary_key.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// `keyspace.table`.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.keyspace, self.name)
    }

    /// Extracts the primary-key values of `row`, in key column order.
    pub fn key_of(&self, row: &Row) -> Result<Vec<Value>, BackendError> {
        self.primary_key
            .iter()
            .map(|column| {
                row.get(column).cloned().ok_or_else(|| {
                    BackendError::InvalidOperation(format!(
                        "insert into {} is missing key column {column}",
                        self.qualified_name()
                    ))
                })
            })
            .collect()
    }

    /// Checks that `key` supplies exactly one value per key column.
    pub fn check_key(&self, key: &[Value]) -> Result<(), BackendError> {
        if key.len() != self.primary_key.len() {
            return Err(BackendError::InvalidOperation(format!(
                "select from {} needs {} key values, got {}",
                self.qualified_name(),
                self.primary_key.len(),
                key.len()
            )));
        }
        if let Some(value) = key.iter().find(|v| matches!(v, Value::Null)) {
            return Err(BackendError::InvalidOperation(format!(
                "select from {} with {} key value",
                self.qualified_name(),
                value.type_name()
            )));
        }
        Ok(())
    }
}

/// A single backend operation, already bound to its values.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Upserts a row keyed by the table's primary key.
    Insert { table: Arc<TableSchema>, row: Row },
    /// Looks up the row with the given primary key.
    Select { table: Arc<TableSchema>, key: Vec<Value> },
}

impl Operation {
    pub fn table(&self) -> &TableSchema {
        match self {
            Operation::Insert { table, .. } | Operation::Select { table, .. } => table,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Insert { .. } => "insert",
            Operation::Select { .. } => "select",
        }
    }
}
