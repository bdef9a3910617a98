//! Splitting a byte stream into chunk records.

use std::collections::HashMap;

use binstore_protocol::{ChunkInfo, FileInfo};
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};
use uuid::Uuid;

use crate::chunks::ChunkStore;
use crate::files::FileMetadataStore;
use crate::{MAX_CHUNK_NUM, StoreError};

/// Description of a file about to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub id: Uuid,
    /// Chunk size in bytes. 0 selects the store default.
    pub chunk_size: u32,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl NewFile {
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            chunk_size: 0,
            file_name: None,
            content_type: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u32) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Writes chunks `0..n` in ascending order, then the file record.
///
/// The file record goes last so a reader never finds metadata whose chunks
/// are still being written.
#[derive(Clone)]
pub struct FileWriter {
    files: FileMetadataStore,
    chunks: ChunkStore,
    default_chunk_size: u32,
}

impl FileWriter {
    pub fn new(files: FileMetadataStore, chunks: ChunkStore, default_chunk_size: u32) -> Self {
        Self {
            files,
            chunks,
            default_chunk_size,
        }
    }

    /// Consumes `source` to its end and stores it as file `new.id`.
    ///
    /// Fails with [`StoreError::InvalidFile`] for an empty source or a
    /// chunk size that does not fit the persisted schema. A failure part
    /// way through leaves the chunks written so far without a file record.
    pub async fn write<R>(&self, new: NewFile, mut source: R) -> Result<FileInfo, StoreError>
    where
        R: AsyncRead + Unpin,
    {
        let chunk_size = if new.chunk_size == 0 {
            self.default_chunk_size
        } else {
            new.chunk_size
        };
        if chunk_size == 0 || chunk_size > MAX_CHUNK_NUM {
            return Err(StoreError::InvalidFile(format!(
                "chunk size {chunk_size} out of range"
            )));
        }
        let chunk_len = chunk_size as usize;

        let mut length: u64 = 0;
        let mut num: u32 = 0;
        loop {
            let data = read_chunk(&mut source, chunk_len).await?;
            if data.is_empty() {
                break;
            }
            if num > MAX_CHUNK_NUM {
                return Err(StoreError::InvalidFile(format!(
                    "file {} needs more than {MAX_CHUNK_NUM} chunks",
                    new.id
                )));
            }

            let last = data.len() < chunk_len;
            length += data.len() as u64;
            self.chunks
                .store(ChunkInfo {
                    file_id: new.id,
                    num,
                    data,
                })
                .await?;
            num += 1;
            if last {
                break;
            }
        }

        if length == 0 {
            return Err(StoreError::InvalidFile(format!("file {} has no data", new.id)));
        }

        let mut file = FileInfo::new(new.id, length, chunk_size).with_metadata(new.metadata);
        file.file_name = new.file_name;
        file.content_type = new.content_type;
        self.files.store(&file).await?;

        info!(file_id = %file.id, length, chunks = num, chunk_size, "file written");
        Ok(file)
    }
}

/// Fills up to `chunk_len` bytes, stopping early only at end of input.
async fn read_chunk<R>(source: &mut R, chunk_len: usize) -> Result<Vec<u8>, StoreError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; chunk_len];
    let mut filled = 0;
    while filled < chunk_len {
        let n = source.read(&mut buf[filled..]).await?;
        if n == 0 {
            debug!(bytes = filled, "end of input");
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}
