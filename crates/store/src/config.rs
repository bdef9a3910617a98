//! Store and reader configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_NUM, StoreError};

/// Default keyspace holding the `files` and `chunks` tables.
pub const DEFAULT_KEYSPACE: &str = "binarystore";

/// Default time a paused reader waits for resume: 5 minutes.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreConfig {
    pub keyspace: String,
    /// Chunk size for writes that do not choose one.
    pub default_chunk_size: u32,
    pub reader: ReaderConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            keyspace: DEFAULT_KEYSPACE.into(),
            default_chunk_size: DEFAULT_CHUNK_SIZE,
            reader: ReaderConfig::default(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.keyspace.is_empty()
            || !self
                .keyspace
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(StoreError::Config(format!(
                "keyspace {:?} must be non-empty [A-Za-z0-9_]",
                self.keyspace
            )));
        }
        if self.default_chunk_size == 0 || self.default_chunk_size > MAX_CHUNK_NUM {
            return Err(StoreError::Config(format!(
                "default chunk size {} out of range",
                self.default_chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReaderConfig {
    /// How long a paused reader waits for resume before failing.
    /// `None` waits forever.
    pub idle_timeout_secs: Option<u64>,
    /// Capacity of the event channel between producer and consumer.
    pub event_buffer: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: Some(DEFAULT_IDLE_TIMEOUT_SECS),
            event_buffer: 1,
        }
    }
}

impl ReaderConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_secs.map(Duration::from_secs)
    }

    pub(crate) fn channel_capacity(&self) -> usize {
        self.event_buffer.max(1)
    }
}
