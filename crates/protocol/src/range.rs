//! HTTP `Range` header parsing.
//!
//! Only single `bytes=from-to` and `bytes=from-` ranges map onto a
//! [`ContentRange`]; suffix ranges need the file length and multi-range
//! requests are not served.

use crate::ContentRange;

/// Errors from parsing a `Range` header value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeParseError {
    #[error("unsupported range unit: {0}")]
    UnsupportedUnit(String),

    #[error("malformed range: {0}")]
    Malformed(String),

    #[error("suffix ranges are not supported: {0}")]
    Suffix(String),

    #[error("multiple ranges are not supported")]
    MultipleRanges,

    #[error("range start must not be negative: {0}")]
    NegativeStart(i64),

    #[error("range end {to} precedes start {from}")]
    Inverted { from: u64, to: u64 },
}

/// Parses a `Range` header value such as `bytes=0-99` or `bytes=100-`.
pub fn parse_range_header(value: &str) -> Result<ContentRange, RangeParseError> {
    let value = value.trim();
    let Some((unit, spec)) = value.split_once('=') else {
        return Err(RangeParseError::Malformed(value.to_string()));
    };
    if !unit.trim().eq_ignore_ascii_case("bytes") {
        return Err(RangeParseError::UnsupportedUnit(unit.trim().to_string()));
    }

    let spec = spec.trim();
    if spec.contains(',') {
        return Err(RangeParseError::MultipleRanges);
    }

    let Some((start, end)) = spec.split_once('-') else {
        return Err(RangeParseError::Malformed(spec.to_string()));
    };
    let (start, end) = (start.trim(), end.trim());
    if start.is_empty() {
        return Err(RangeParseError::Suffix(spec.to_string()));
    }

    let from = parse_offset(start, spec)?;
    let to = if end.is_empty() {
        None
    } else {
        Some(parse_offset(end, spec)?)
    };

    if let Some(to) = to {
        if to < from {
            return Err(RangeParseError::Inverted { from, to });
        }
    }

    Ok(ContentRange { from, to })
}

fn parse_offset(digits: &str, spec: &str) -> Result<u64, RangeParseError> {
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(RangeParseError::Malformed(spec.to_string()));
    }
    digits
        .parse()
        .map_err(|_| RangeParseError::Malformed(spec.to_string()))
}
