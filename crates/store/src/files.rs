//! File metadata records.

use std::sync::Arc;

use binstore_backend::{Backend, ColumnError, Row};
use binstore_protocol::FileInfo;
use chrono::DateTime;
use tracing::debug;
use uuid::Uuid;

use crate::metrics::{MetricOp, MetricTarget, StoreMetrics, Timer};
use crate::statements::Statements;
use crate::StoreError;

/// Stores and loads [`FileInfo`] records.
#[derive(Clone)]
pub struct FileMetadataStore {
    backend: Arc<dyn Backend>,
    statements: Statements,
    metrics: Arc<dyn StoreMetrics>,
}

impl FileMetadataStore {
    pub fn new(
        backend: Arc<dyn Backend>,
        statements: Statements,
        metrics: Arc<dyn StoreMetrics>,
    ) -> Self {
        Self {
            backend,
            statements,
            metrics,
        }
    }

    /// Persists a new file record.
    pub async fn store(&self, file: &FileInfo) -> Result<(), StoreError> {
        let op = self.statements.store_file(file)?;

        let timer = Timer::start(&self.metrics, MetricTarget::Files, MetricOp::Write);
        let result = self.backend.execute(op).await;
        timer.observe(&result);
        result?;

        debug!(file_id = %file.id, length = file.length, "file record stored");
        Ok(())
    }

    /// Loads a file record. A missing record is `Ok(None)`, not an error.
    pub async fn load(&self, id: Uuid) -> Result<Option<FileInfo>, StoreError> {
        let timer = Timer::start(&self.metrics, MetricTarget::Files, MetricOp::Read);
        let rows = match self.backend.execute(self.statements.load_file(id)).await {
            Ok(rows) => rows,
            Err(e) => {
                timer.error();
                return Err(StoreError::load_failed("file", e));
            }
        };

        let Some(row) = rows.one() else {
            timer.stop();
            return Ok(None);
        };

        let decoded = decode_file(id, &row);
        timer.observe(&decoded);
        decoded.map(Some)
    }
}

fn decode_file(id: Uuid, row: &Row) -> Result<FileInfo, StoreError> {
    let err = |e: ColumnError| StoreError::decode("file", e);

    let length = row.get_big_int("length").map_err(err)?;
    let length = u64::try_from(length)
        .map_err(|_| StoreError::decode("file", format!("negative length {length}")))?;

    let chunk_size = row.get_int("chunk_size").map_err(err)?;
    let chunk_size = u32::try_from(chunk_size)
        .map_err(|_| StoreError::decode("file", format!("negative chunk size {chunk_size}")))?;

    let millis = row.get_big_int("upload_date").map_err(err)?;
    let upload_date = DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| StoreError::decode("file", format!("upload date {millis} out of range")))?;

    Ok(FileInfo {
        id,
        length,
        chunk_size,
        upload_date,
        file_name: row.get_text("file_name").map_err(err)?,
        content_type: row.get_text("content_type").map_err(err)?,
        metadata: row.get_map("metadata").map_err(err)?.into_iter().collect(),
    })
}
