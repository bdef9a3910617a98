use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored file: its identity, geometry, and descriptive metadata.
///
/// Created once and never mutated. The bytes live in separate
/// [`ChunkInfo`] records numbered `0..chunk_count()`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub id: Uuid,
    /// Total length in bytes.
    pub length: u64,
    /// Size of every chunk except possibly the last.
    pub chunk_size: u32,
    pub upload_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl FileInfo {
    /// Creates a record stamped with the current time.
    ///
    /// The timestamp is truncated to milliseconds, the precision the
    /// backend persists, so a stored record loads back equal.
    pub fn new(id: Uuid, length: u64, chunk_size: u32) -> Self {
        let now = Utc::now();
        let upload_date = DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now);
        Self {
            id,
            length,
            chunk_size,
            upload_date,
            file_name: None,
            content_type: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Number of chunks the file is split into: `ceil(length / chunk_size)`.
    ///
    /// Returns 0 for a zero chunk size rather than dividing by zero.
    pub fn chunk_count(&self) -> u64 {
        if self.chunk_size == 0 {
            return 0;
        }
        self.length.div_ceil(u64::from(self.chunk_size))
    }

    /// Expected byte length of chunk `num`, or `None` past the last chunk.
    pub fn expected_chunk_len(&self, num: u64) -> Option<u64> {
        let count = self.chunk_count();
        if num >= count {
            return None;
        }
        let chunk_size = u64::from(self.chunk_size);
        if num + 1 < count {
            Some(chunk_size)
        } else {
            Some(self.length - chunk_size * (count - 1))
        }
    }
}

/// One stored chunk of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkInfo {
    /// The owning file's id.
    pub file_id: Uuid,
    /// 0-based chunk index.
    pub num: u32,
    pub data: Vec<u8>,
}

/// Requested byte interval of a read, inclusive at both ends.
///
/// `to == None` reads through the end of the file, as in `bytes=100-`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRange {
    pub from: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<u64>,
}

impl ContentRange {
    pub fn new(from: u64, to: Option<u64>) -> Self {
        Self { from, to }
    }

    /// Builds a range from signed offsets where a negative `to` means
    /// "through end of file". A negative `from` is rejected.
    pub fn from_offsets(from: i64, to: i64) -> Result<Self, crate::RangeParseError> {
        let from = u64::try_from(from).map_err(|_| crate::RangeParseError::NegativeStart(from))?;
        let to = u64::try_from(to).ok();
        Ok(Self { from, to })
    }
}

/// The "file metadata available" event of a read.
///
/// For range reads `range` carries the resolved bounds, with `to`
/// clamped to the last byte of the file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReadInfo {
    pub file: FileInfo,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<ContentRange>,
}

impl FileReadInfo {
    /// Number of bytes the read delivers.
    pub fn content_length(&self) -> u64 {
        match self.range {
            Some(ContentRange { from, to: Some(to) }) => to - from + 1,
            Some(ContentRange { from, to: None }) => self.file.length.saturating_sub(from),
            None => self.file.length,
        }
    }

    /// `Content-Range` header value (`bytes 0-99/250`) for range reads.
    pub fn content_range_header(&self) -> Option<String> {
        let range = self.range?;
        let to = range.to.unwrap_or(self.file.length.saturating_sub(1));
        Some(format!("bytes {}-{}/{}", range.from, to, self.file.length))
    }
}

/// Terminal outcome of a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadResult {
    Ok,
    NotFound,
    Error,
}
