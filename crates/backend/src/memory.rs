//! In-process backend: a map keyed by table and primary key.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::{Backend, BackendError, BackendFuture, Operation, ResultSet, Row, Value};

type RowKey = (String, Vec<Value>);

/// Failure to inject: every operation on `table`, or only the one
/// addressing `key`.
#[derive(Debug, Clone)]
struct InjectedFailure {
    table: String,
    key: Option<Vec<Value>>,
}

/// Backend holding all rows in memory.
///
/// Inserts are upserts, as in a wide-column store. Operation counts and
/// failure injection make it usable as a test double.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    rows: RwLock<HashMap<RowKey, Row>>,
    selects: RwLock<HashMap<String, usize>>,
    failures: RwLock<Vec<InjectedFailure>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored rows across all tables.
    pub fn len(&self) -> usize {
        self.rows.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of selects issued against `table` (unqualified name).
    pub fn select_count(&self, table: &str) -> usize {
        self.selects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(table)
            .copied()
            .unwrap_or(0)
    }

    /// Makes operations on `table` fail with [`BackendError::Unavailable`].
    ///
    /// With `key`, only operations addressing that primary key fail.
    pub fn inject_failure(&self, table: &str, key: Option<Vec<Value>>) {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(InjectedFailure {
                table: table.to_string(),
                key,
            });
    }

    pub fn clear_failures(&self) {
        self.failures
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn check_failure(&self, table: &str, key: &[Value]) -> Result<(), BackendError> {
        let failures = self.failures.read().unwrap_or_else(PoisonError::into_inner);
        let hit = failures.iter().any(|f| {
            f.table == table && f.key.as_deref().is_none_or(|k| k == key)
        });
        if hit {
            return Err(BackendError::Unavailable(format!(
                "injected failure on {table}"
            )));
        }
        Ok(())
    }

    fn run(&self, op: Operation) -> Result<ResultSet, BackendError> {
        match op {
            Operation::Insert { table, row } => {
                let key = table.key_of(&row)?;
                self.check_failure(table.name(), &key)?;
                self.rows
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert((table.qualified_name(), key), row);
                Ok(ResultSet::empty())
            }
            Operation::Select { table, key } => {
                table.check_key(&key)?;
                *self
                    .selects
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .entry(table.name().to_string())
                    .or_default() += 1;
                self.check_failure(table.name(), &key)?;
                let rows = self.rows.read().unwrap_or_else(PoisonError::into_inner);
                let found = rows.get(&(table.qualified_name(), key)).cloned();
                Ok(ResultSet::new(found.into_iter().collect()))
            }
        }
    }
}

impl Backend for MemoryBackend {
    fn execute(&self, op: Operation) -> BackendFuture<'_, ResultSet> {
        Box::pin(async move { self.run(op) })
    }
}
