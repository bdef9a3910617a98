//! Store error types.

use std::time::Duration;

use binstore_backend::BackendError;
use uuid::Uuid;

/// Errors produced by the store and its readers.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("file not found: {0}")]
    NotFound(Uuid),

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("invalid file: {0}")]
    InvalidFile(String),

    #[error("backend failure: {0}")]
    Backend(#[from] BackendError),

    #[error("cannot decode {record} record: {reason}")]
    Decode { record: &'static str, reason: String },

    #[error("chunk {num} of file {file_id} is missing")]
    MissingChunk { file_id: Uuid, num: u32 },

    #[error("reader paused for longer than {0:?}")]
    IdleTimeout(Duration),

    #[error("read cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Maps a failed load of `record`. A row the backend holds but cannot
    /// read back is a decode failure, not a backend outage.
    pub(crate) fn load_failed(record: &'static str, e: BackendError) -> Self {
        match e {
            BackendError::Corrupt(reason) => StoreError::decode(record, reason),
            other => StoreError::Backend(other),
        }
    }

    pub(crate) fn decode(record: &'static str, reason: impl std::fmt::Display) -> Self {
        StoreError::Decode {
            record,
            reason: reason.to_string(),
        }
    }
}
