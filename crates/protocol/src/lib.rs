//! Data model for the binstore chunked object store.
//!
//! Files are described by a [`FileInfo`] record and their bytes are split
//! into fixed-size [`ChunkInfo`] records. Reads may be restricted to an
//! inclusive [`ContentRange`], mirroring HTTP range requests.

mod range;
mod types;

pub use range::{RangeParseError, parse_range_header};
pub use types::{ChunkInfo, ContentRange, FileInfo, FileReadInfo, ReadResult};
