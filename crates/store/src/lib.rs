//! Chunked binary object store.
//!
//! Files are split into fixed-size chunks and kept as two kinds of record
//! in a [`Backend`](binstore_backend::Backend): one [`FileInfo`] per file
//! and one [`ChunkInfo`] per chunk, keyed by `(file_id, num)`.
//!
//! Reads stream chunk by chunk through a [`FileReader`], which the consumer
//! can pause and resume. A range read touches only the chunks covering the
//! requested bytes and trims the first and last of them.
//!
//! ```no_run
//! # async fn demo(
//! #     backend: std::sync::Arc<dyn binstore_backend::Backend>,
//! # ) -> Result<(), binstore_store::StoreError> {
//! use binstore_store::{BinaryStore, NewFile, StoreConfig};
//!
//! let store = BinaryStore::new(backend, StoreConfig::default());
//! let id = uuid::Uuid::new_v4();
//! store.write_bytes(NewFile::new(id), b"hello").await?;
//! let (_info, bytes) = store.read(id).read_to_end().await.into_bytes()?;
//! assert_eq!(bytes, b"hello");
//! # Ok(())
//! # }
//! ```

mod buffer;
mod chunks;
mod config;
mod error;
mod files;
pub mod metrics;
mod range;
mod reader;
mod statements;
mod store;
mod writer;

pub use binstore_protocol::{ChunkInfo, ContentRange, FileInfo, FileReadInfo, ReadResult};
pub use chunks::ChunkStore;
pub use config::{ReaderConfig, StoreConfig, DEFAULT_IDLE_TIMEOUT_SECS, DEFAULT_KEYSPACE};
pub use error::StoreError;
pub use files::FileMetadataStore;
pub use range::RangeInfo;
pub use reader::{FileReader, ReadControl, ReadEvent, ReadOutcome, ReaderState, StreamReader};
pub use statements::Statements;
pub use store::BinaryStore;
pub use writer::{FileWriter, NewFile};

/// Default chunk size for writes: 256 KiB.
pub const DEFAULT_CHUNK_SIZE: u32 = 256 * 1024;

/// Highest chunk number the schema can persist.
pub(crate) const MAX_CHUNK_NUM: u32 = i32::MAX as u32;
