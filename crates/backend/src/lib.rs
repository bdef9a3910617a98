//! Key-value backend contract for binstore.
//!
//! The store talks to durable storage through a single asynchronous
//! primitive, [`Backend::execute`], which runs one [`Operation`] and
//! yields the matching rows. Connection management, pooling, and schema
//! provisioning belong to the backend implementation.
//!
//! Two implementations ship here: [`MemoryBackend`] for tests and
//! embedding, and [`LocalFsBackend`] which keeps one JSON document per
//! row under a directory.

mod local_fs;
mod memory;
mod operation;
mod value;

use std::future::Future;
use std::pin::Pin;

pub use local_fs::LocalFsBackend;
pub use memory::MemoryBackend;
pub use operation::{Operation, TableSchema};
pub use value::{ColumnError, ResultSet, Row, Value};

/// A boxed future returned by backend methods.
pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, BackendError>> + Send + 'a>>;

/// Durable record storage.
///
/// Implementations must not block the calling thread; every call
/// completes through the returned future.
pub trait Backend: Send + Sync + 'static {
    /// Runs one operation. Inserts yield an empty result set; selects yield
    /// zero or one row for a full primary key.
    fn execute(&self, op: Operation) -> BackendFuture<'_, ResultSet>;
}

/// Errors produced by a backend. The original cause is kept as the
/// error source.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A stored row exists but cannot be read back.
    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("backend unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Other(Box<dyn std::error::Error + Send + Sync>),
}
