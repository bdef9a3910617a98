//! The store facade: one backend, one keyspace, one set of handles.

use std::sync::Arc;

use binstore_backend::Backend;
use binstore_protocol::{ChunkInfo, ContentRange, FileInfo};
use tokio::io::AsyncRead;
use uuid::Uuid;

use crate::chunks::ChunkStore;
use crate::config::StoreConfig;
use crate::files::FileMetadataStore;
use crate::metrics::{NoopMetrics, StoreMetrics};
use crate::reader::{FileReader, StreamReader};
use crate::statements::Statements;
use crate::writer::{FileWriter, NewFile};
use crate::StoreError;

/// Chunked binary object store over a [`Backend`].
///
/// Cheap to clone; clones share the backend and metrics sink.
#[derive(Clone)]
pub struct BinaryStore {
    files: FileMetadataStore,
    chunks: ChunkStore,
    reader: StreamReader,
    writer: FileWriter,
    metrics: Arc<dyn StoreMetrics>,
    config: StoreConfig,
}

impl BinaryStore {
    pub fn new(backend: Arc<dyn Backend>, config: StoreConfig) -> Self {
        Self::with_metrics(backend, config, Arc::new(NoopMetrics))
    }

    pub fn with_metrics(
        backend: Arc<dyn Backend>,
        config: StoreConfig,
        metrics: Arc<dyn StoreMetrics>,
    ) -> Self {
        let statements = Statements::new(&config.keyspace);
        let files = FileMetadataStore::new(
            Arc::clone(&backend),
            statements.clone(),
            Arc::clone(&metrics),
        );
        let chunks = ChunkStore::new(backend, statements, Arc::clone(&metrics));
        let reader = StreamReader::new(files.clone(), chunks.clone(), config.reader.clone());
        let writer = FileWriter::new(files.clone(), chunks.clone(), config.default_chunk_size);
        Self {
            files,
            chunks,
            reader,
            writer,
            metrics,
            config,
        }
    }

    /// The sink every backend call of this store reports to.
    pub fn metrics(&self) -> &Arc<dyn StoreMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn files(&self) -> &FileMetadataStore {
        &self.files
    }

    pub fn chunks(&self) -> &ChunkStore {
        &self.chunks
    }

    pub async fn store_file(&self, file: &FileInfo) -> Result<(), StoreError> {
        self.files.store(file).await
    }

    pub async fn load_file(&self, id: Uuid) -> Result<Option<FileInfo>, StoreError> {
        self.files.load(id).await
    }

    pub async fn store_chunk(&self, chunk: ChunkInfo) -> Result<(), StoreError> {
        self.chunks.store(chunk).await
    }

    pub async fn load_chunk(&self, file_id: Uuid, num: u32) -> Result<Option<ChunkInfo>, StoreError> {
        self.chunks.load(file_id, num).await
    }

    /// Streams a whole file. See [`StreamReader::read`].
    pub fn read(&self, id: Uuid) -> FileReader {
        self.reader.read(id)
    }

    /// Streams part of a file. See [`StreamReader::read_range`].
    pub fn read_range(&self, id: Uuid, range: ContentRange) -> FileReader {
        self.reader.read_range(id, range)
    }

    /// Chunks `source` and stores it. See [`FileWriter::write`].
    pub async fn write_file<R>(&self, new: NewFile, source: R) -> Result<FileInfo, StoreError>
    where
        R: AsyncRead + Unpin,
    {
        self.writer.write(new, source).await
    }

    pub async fn write_bytes(&self, new: NewFile, data: &[u8]) -> Result<FileInfo, StoreError> {
        self.writer.write(new, data).await
    }
}
