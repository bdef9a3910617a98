//! Chunk records.

use std::sync::Arc;

use binstore_backend::Backend;
use binstore_protocol::ChunkInfo;
use tracing::trace;
use uuid::Uuid;

use crate::metrics::{MetricOp, MetricTarget, StoreMetrics, Timer};
use crate::statements::Statements;
use crate::StoreError;

/// Stores and loads [`ChunkInfo`] records keyed by `(file_id, num)`.
#[derive(Clone)]
pub struct ChunkStore {
    backend: Arc<dyn Backend>,
    statements: Statements,
    metrics: Arc<dyn StoreMetrics>,
}

impl ChunkStore {
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

    /// Persists one chunk.
    pub async fn store(&self, chunk: ChunkInfo) -> Result<(), StoreError> {
        let (file_id, num, len) = (chunk.file_id, chunk.num, chunk.data.len());
        let op = self.statements.store_chunk(chunk)?;

        let timer = Timer::start(&self.metrics, MetricTarget::Chunks, MetricOp::Write);
        let result = self.backend.execute(op).await;
        timer.observe(&result);
        result?;

        trace!(%file_id, chunk = num, bytes = len, "chunk stored");
        Ok(())
    }

    /// Loads chunk `num` of `file_id`.
    ///
    /// `Ok(None)` means no chunk exists at that index. Whether that ends a
    /// read or breaks it is the caller's decision.
    pub async fn load(&self, file_id: Uuid, num: u32) -> Result<Option<ChunkInfo>, StoreError> {
        let op = self.statements.load_chunk(file_id, num)?;

        let timer = Timer::start(&self.metrics, MetricTarget::Chunks, MetricOp::Read);
        let rows = match self.backend.execute(op).await {
            Ok(rows) => rows,
            Err(e) => {
                timer.error();
                return Err(StoreError::load_failed("chunk", e));
            }
        };

        let Some(mut row) = rows.one() else {
            timer.stop();
            return Ok(None);
        };

        match row.take_blob("data") {
            Ok(data) => {
                timer.stop();
                Ok(Some(ChunkInfo { file_id, num, data }))
            }
            Err(e) => {
                timer.error();
                Err(StoreError::decode("chunk", e))
            }
        }
    }
}
