//! Operations against the `files` and `chunks` tables.
//!
//! ```text
//! files  (id uuid PRIMARY KEY, length bigint, chunk_size int,
//!         upload_date bigint, file_name text, content_type text,
//!         metadata map<text, text>)
//! chunks (file_id uuid, num int, data blob, PRIMARY KEY (file_id, num))
//! ```

use std::sync::Arc;

use binstore_backend::{Operation, Row, TableSchema, Value};
use binstore_protocol::{ChunkInfo, FileInfo};
use uuid::Uuid;

use crate::StoreError;

pub(crate) const FILES_TABLE: &str = "files";
pub(crate) const CHUNKS_TABLE: &str = "chunks";

/// Binds file and chunk records to backend operations for one keyspace.
#[derive(Debug, Clone)]
pub struct Statements {
    files: Arc<TableSchema>,
    chunks: Arc<TableSchema>,
}

impl Statements {
    pub fn new(keyspace: &str) -> Self {
        Self {
            files: Arc::new(TableSchema::new(keyspace, FILES_TABLE, &["id"])),
            chunks: Arc::new(TableSchema::new(keyspace, CHUNKS_TABLE, &["file_id", "num"])),
        }
    }

    pub fn files_table(&self) -> &TableSchema {
        &self.files
    }

    pub fn chunks_table(&self) -> &TableSchema {
        &self.chunks
    }

    pub fn store_file(&self, file: &FileInfo) -> Result<Operation, StoreError> {
        let length = i64::try_from(file.length).map_err(|_| {
            StoreError::InvalidFile(format!("length {} does not fit a bigint", file.length))
        })?;
        let chunk_size = i32::try_from(file.chunk_size).map_err(|_| {
            StoreError::InvalidFile(format!("chunk size {} does not fit an int", file.chunk_size))
        })?;
        let metadata = file
            .metadata
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let row = Row::new()
            .with("id", Value::Uuid(file.id))
            .with("length", Value::BigInt(length))
            .with("chunk_size", Value::Int(chunk_size))
            .with("upload_date", Value::BigInt(file.upload_date.timestamp_millis()))
            .with("file_name", Value::from(file.file_name.clone()))
            .with("content_type", Value::from(file.content_type.clone()))
            .with("metadata", Value::Map(metadata));

        Ok(Operation::Insert {
            table: Arc::clone(&self.files),
            row,
        })
    }

    pub fn load_file(&self, id: Uuid) -> Operation {
        Operation::Select {
            table: Arc::clone(&self.files),
            key: vec![Value::Uuid(id)],
        }
    }

    /// Binds a chunk insert. Takes the chunk by value so the payload is
    /// moved, not copied, into the row.
    pub fn store_chunk(&self, chunk: ChunkInfo) -> Result<Operation, StoreError> {
        let num = chunk_num(chunk.num)?;
        let row = Row::new()
            .with("file_id", Value::Uuid(chunk.file_id))
            .with("num", Value::Int(num))
            .with("data", Value::Blob(chunk.data));

        Ok(Operation::Insert {
            table: Arc::clone(&self.chunks),
            row,
        })
    }

    pub fn load_chunk(&self, file_id: Uuid, num: u32) -> Result<Operation, StoreError> {
        let num = chunk_num(num)?;
        Ok(Operation::Select {
            table: Arc::clone(&self.chunks),
            key: vec![Value::Uuid(file_id), Value::Int(num)],
        })
    }
}

fn chunk_num(num: u32) -> Result<i32, StoreError> {
    i32::try_from(num)
        .map_err(|_| StoreError::InvalidRange(format!("chunk number {num} does not fit an int")))
}
