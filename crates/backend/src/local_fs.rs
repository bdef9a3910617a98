//! Local directory backend: one JSON document per row.
//!
//! Rows live at `<root>/<keyspace>/<table>/<key>.json`. Writes go to a
//! temporary file first and are renamed into place, so a reader never
//! observes a half-written row.

use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::{Backend, BackendError, BackendFuture, Operation, ResultSet, Row, TableSchema, Value};

pub struct LocalFsBackend {
    root: PathBuf,
}

impl LocalFsBackend {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, table: &TableSchema, key: &[Value]) -> Result<PathBuf, BackendError> {
        let parts = key
            .iter()
            .map(encode_key_part)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self
            .root
            .join(table.keyspace())
            .join(table.name())
            .join(format!("{}.json", parts.join("."))))
    }

    async fn insert(&self, table: &TableSchema, row: &Row) -> Result<ResultSet, BackendError> {
        let key = table.key_of(row)?;
        let path = self.path_for(table, &key)?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }

        let json = serde_json::to_vec(row)?;
        let tmp = path.with_extension("json.tmp");
        let mut f = fs::File::create(&tmp).await?;
        f.write_all(&json).await?;
        f.flush().await?;
        f.sync_all().await?;
        drop(f);
        fs::rename(&tmp, &path).await?;

        debug!(path = %path.display(), bytes = json.len(), "row written");
        Ok(ResultSet::empty())
    }

    async fn select(&self, table: &TableSchema, key: &[Value]) -> Result<ResultSet, BackendError> {
        table.check_key(key)?;
        let path = self.path_for(table, key)?;
        match fs::read(&path).await {
            Ok(buf) => {
                let row: Row = serde_json::from_slice(&buf).map_err(|e| {
                    BackendError::Corrupt(format!("{}: {e}", path.display()))
                })?;
                Ok(ResultSet::new(vec![row]))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ResultSet::empty()),
            Err(e) => Err(e.into()),
        }
    }
}

impl Backend for LocalFsBackend {
    fn execute(&self, op: Operation) -> BackendFuture<'_, ResultSet> {
        Box::pin(async move {
            match &op {
                Operation::Insert { table, row } => self.insert(table, row).await,
                Operation::Select { table, key } => self.select(table, key).await,
            }
        })
    }
}

/// Encodes one key value as a filename-safe token without `.`.
fn encode_key_part(value: &Value) -> Result<String, BackendError> {
    match value {
        Value::Uuid(v) => Ok(v.hyphenated().to_string()),
        Value::BigInt(v) => Ok(v.to_string()),
        Value::Int(v) => Ok(v.to_string()),
        Value::Text(v) => Ok(URL_SAFE_NO_PAD.encode(v.as_bytes())),
        Value::Blob(v) => Ok(URL_SAFE_NO_PAD.encode(v)),
        other => Err(BackendError::InvalidOperation(format!(
            "{} values cannot form a key",
            other.type_name()
        ))),
    }
}
