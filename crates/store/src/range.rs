//! Mapping of byte ranges onto chunk indices and intra-chunk offsets.

use std::ops::RangeInclusive;

use binstore_protocol::{ContentRange, FileInfo};

use crate::{MAX_CHUNK_NUM, StoreError};

/// A requested range resolved against a file's geometry.
///
/// Chunks `start_chunk..=end_chunk` cover the bytes `from..=to`. Within
/// the first chunk the range begins at `start_pos`; within the last it
/// ends (inclusive) at `end_pos`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeInfo {
    pub start_chunk: u32,
    pub end_chunk: u32,
    pub start_pos: usize,
    pub end_pos: usize,
    pub from: u64,
    pub to: u64,
}

impl RangeInfo {
    /// Resolves `range` against `file`.
    ///
    /// An open or overlong `to` is clamped to the last byte of the file.
    /// Fails with [`StoreError::InvalidRange`] for a zero chunk size, an
    /// empty file, a start past the resolved end, or chunk indices that
    /// do not fit the persisted chunk number.
    pub fn compute(range: &ContentRange, file: &FileInfo) -> Result<Self, StoreError> {
        if file.chunk_size == 0 {
            return Err(StoreError::InvalidRange(format!(
                "file {} has a zero chunk size",
                file.id
            )));
        }
        if file.length == 0 {
            return Err(StoreError::InvalidRange(format!("file {} is empty", file.id)));
        }

        let from = range.from;
        let mut to = file.length - 1;
        if let Some(requested) = range.to {
            if requested < to {
                to = requested;
            }
        }
        if from > to {
            return Err(StoreError::InvalidRange(format!(
                "start {from} is past end {to} (length {})",
                file.length
            )));
        }

        let chunk_size = u64::from(file.chunk_size);
        let start_chunk = chunk_index(from / chunk_size)?;
        let end_chunk = chunk_index(to / chunk_size)?;
        let start_pos = chunk_offset(from - u64::from(start_chunk) * chunk_size)?;
        let end_pos = chunk_offset(to - u64::from(end_chunk) * chunk_size)?;

        Ok(Self {
            start_chunk,
            end_chunk,
            start_pos,
            end_pos,
            from,
            to,
        })
    }

    /// The resolved range, with `to` made explicit.
    pub fn resolved(&self) -> ContentRange {
        ContentRange::new(self.from, Some(self.to))
    }

    /// Chunk numbers the range touches, ascending.
    pub fn chunks(&self) -> RangeInclusive<u32> {
        self.start_chunk..=self.end_chunk
    }

    /// Cuts the part of chunk `num` that lies inside the range.
    ///
    /// Rules, first match wins:
    /// 1. start chunk only: `[start_pos, len)`
    /// 2. end chunk only: `[0, end_pos]`
    /// 3. both start and end chunk: `[start_pos, end_pos]`
    /// 4. otherwise the whole chunk, untouched.
    ///
    /// A chunk too short for its rule is reported as a decode failure.
    pub fn extract_required_bytes(&self, num: u32, mut chunk: Vec<u8>) -> Result<Vec<u8>, StoreError> {
        let len = chunk.len();
        let is_start = num == self.start_chunk;
        let is_end = num == self.end_chunk;

        let (start, end) = match (is_start, is_end) {
            (true, false) => (self.start_pos, len),
            (false, true) => (0, self.end_pos + 1),
            (true, true) => (self.start_pos, self.end_pos + 1),
            (false, false) => return Ok(chunk),
        };

        if start > end || end > len {
            return Err(StoreError::decode(
                "chunk",
                format!("chunk {num} holds {len} bytes, range needs {start}..{end}"),
            ));
        }

        chunk.truncate(end);
        chunk.drain(..start);
        Ok(chunk)
    }
}

fn chunk_index(n: u64) -> Result<u32, StoreError> {
    u32::try_from(n)
        .ok()
        .filter(|n| *n <= MAX_CHUNK_NUM)
        .ok_or_else(|| StoreError::InvalidRange(format!("chunk index {n} out of bounds")))
}

fn chunk_offset(n: u64) -> Result<usize, StoreError> {
    usize::try_from(n).map_err(|_| StoreError::InvalidRange(format!("chunk offset {n} out of bounds")))
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;

    fn file(length: u64, chunk_size: u32) -> FileInfo {
        FileInfo::new(Uuid::new_v4(), length, chunk_size)
    }

    fn content(length: usize) -> Vec<u8> {
        (0..length).map(|i| (i % 251) as u8).collect()
    }

    fn chunk_of(content: &[u8], chunk_size: usize, num: u32) -> Vec<u8> {
        content
            .chunks(chunk_size)
            .nth(num as usize)
            .unwrap()
            .to_vec()
    }

    #[test]
    fn crosses_one_chunk_boundary() {
        let info = RangeInfo::compute(&ContentRange::new(50, Some(149)), &file(250, 100)).unwrap();
        assert_eq!(info.start_chunk, 0);
        assert_eq!(info.end_chunk, 1);
        assert_eq!(info.start_pos, 50);
        assert_eq!(info.end_pos, 49);
        assert_eq!(info.from, 50);
        assert_eq!(info.to, 149);
    }

    #[test]
    fn open_end_resolves_to_last_byte() {
        let info = RangeInfo::compute(&ContentRange::new(10, None), &file(250, 100)).unwrap();
        assert_eq!(info.to, 249);
        assert_eq!(info.end_chunk, 2);
        assert_eq!(info.end_pos, 49);
    }

    #[test]
    fn overlong_end_is_clamped() {
        for to in [249, 250, 10_000] {
            let info = RangeInfo::compute(&ContentRange::new(0, Some(to)), &file(250, 100)).unwrap();
            assert_eq!(info.to, 249, "to = {to}");
        }
    }

    #[test]
    fn resolved_range_is_explicit() {
        let info = RangeInfo::compute(&ContentRange::new(5, None), &file(20, 8)).unwrap();
        assert_eq!(info.resolved(), ContentRange::new(5, Some(19)));
        assert_eq!(info.chunks(), 0..=2);
    }

    #[test]
    fn zero_chunk_size_is_invalid() {
        let err = RangeInfo::compute(&ContentRange::new(0, None), &file(250, 0)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRange(_)));
    }

    #[test]
    fn start_past_end_is_invalid() {
        let err = RangeInfo::compute(&ContentRange::new(100, Some(50)), &file(250, 100)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRange(_)));

        let err = RangeInfo::compute(&ContentRange::new(250, None), &file(250, 100)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRange(_)));
    }

    #[test]
    fn empty_file_is_invalid() {
        let err = RangeInfo::compute(&ContentRange::new(0, None), &file(0, 100)).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRange(_)));
    }

    #[test]
    fn chunk_index_overflow_is_invalid() {
        let huge = file(u64::MAX, 1);
        let err = RangeInfo::compute(&ContentRange::new(u64::MAX - 10, None), &huge).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRange(_)));
    }

    #[test]
    fn middle_chunk_passes_through() {
        let info = RangeInfo::compute(&ContentRange::new(50, Some(249)), &file(300, 100)).unwrap();
        let middle = vec![7u8; 100];
        assert_eq!(info.extract_required_bytes(1, middle.clone()).unwrap(), middle);
    }

    #[test]
    fn single_chunk_range() {
        let data = content(100);
        let info = RangeInfo::compute(&ContentRange::new(10, Some(19)), &file(100, 100)).unwrap();
        let bytes = info.extract_required_bytes(0, data.clone()).unwrap();
        assert_eq!(bytes, &data[10..20]);
    }

    #[test]
    fn short_chunk_is_a_decode_failure() {
        let info = RangeInfo::compute(&ContentRange::new(10, Some(149)), &file(250, 100)).unwrap();
        let err = info.extract_required_bytes(1, vec![0u8; 20]).unwrap_err();
        assert!(matches!(err, StoreError::Decode { record: "chunk", .. }));

        let err = info.extract_required_bytes(0, vec![0u8; 5]).unwrap_err();
        assert!(matches!(err, StoreError::Decode { .. }));
    }

    /// Concatenating the extracted slices reproduces `content[from..=to]`
    /// for every range of every small file geometry.
    #[test]
    fn extraction_reassembles_every_range() {
        for length in 1..=23usize {
            let data = content(length);
            for chunk_size in 1..=9u32 {
                let f = file(length as u64, chunk_size);
                for from in 0..length as u64 {
                    for to in (from..length as u64 + 2).map(Some).chain([None]) {
                        let info = RangeInfo::compute(&ContentRange::new(from, to), &f).unwrap();
                        let mut out = Vec::new();
                        for num in info.chunks() {
                            let chunk = chunk_of(&data, chunk_size as usize, num);
                            out.extend(info.extract_required_bytes(num, chunk).unwrap());
                        }
                        let expected_to = to.unwrap_or(u64::MAX).min(length as u64 - 1) as usize;
                        assert_eq!(
                            out,
                            &data[from as usize..=expected_to],
                            "length={length} chunk_size={chunk_size} from={from} to={to:?}"
                        );
                    }
                }
            }
        }
    }
}
