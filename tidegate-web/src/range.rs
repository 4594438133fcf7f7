//! HTTP Range request handling for file streaming
//!
//! Implements the single-range subset of RFC 7233 byte ranges. Requests
//! naming several ranges are answered with the full representation.

use axum::http::HeaderMap;
use axum::http::header::RANGE;

/// Inclusive byte range inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes covered, never zero.
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value of the `Content-Range` header for a file of `total_size` bytes.
    pub fn content_range(&self, total_size: u64) -> String {
        format!("bytes {}-{}/{total_size}", self.start, self.end)
    }
}

/// How a request's Range header applies to a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No usable range: serve the whole file with 200.
    Full,
    /// Serve the given slice with 206.
    Partial(ByteRange),
    /// No byte of the range exists: answer 416.
    Unsatisfiable,
}

/// Extract the Range header value, if present and valid UTF-8.
pub fn extract_range_header(headers: &HeaderMap) -> Option<&str> {
    headers.get(RANGE).and_then(|range| range.to_str().ok())
}

/// Parse a Range header against a file of `total_size` bytes.
///
/// Handles `bytes=start-end`, `bytes=start-` and suffix `bytes=-n` forms.
/// Ends past the file are clamped. Malformed headers, other units and
/// multi-range requests fall back to [`RangeRequest::Full`].
///
/// # Examples
/// ```
/// use tidegate_web::range::{ByteRange, RangeRequest, parse_range_header};
/// let range = parse_range_header("bytes=100-199", 1000);
/// assert_eq!(range, RangeRequest::Partial(ByteRange { start: 100, end: 199 }));
/// ```
pub fn parse_range_header(range: &str, total_size: u64) -> RangeRequest {
    let Some(set) = range.trim().strip_prefix("bytes=") else {
        return RangeRequest::Full;
    };
    if set.contains(',') {
        return RangeRequest::Full;
    }
    let Some((start_str, end_str)) = set.trim().split_once('-') else {
        return RangeRequest::Full;
    };
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    if start_str.is_empty() {
        // Suffix range: the last n bytes
        let Ok(suffix) = end_str.parse::<u64>() else {
            return RangeRequest::Full;
        };
        if suffix == 0 || total_size == 0 {
            return RangeRequest::Unsatisfiable;
        }
        let start = total_size.saturating_sub(suffix);
        return RangeRequest::Partial(ByteRange {
            start,
            end: total_size - 1,
        });
    }

    let Ok(start) = start_str.parse::<u64>() else {
        return RangeRequest::Full;
    };
    let end = if end_str.is_empty() {
        total_size.saturating_sub(1)
    } else {
        match end_str.parse::<u64>() {
            Ok(end) if end >= start => end.min(total_size.saturating_sub(1)),
            _ => return RangeRequest::Full,
        }
    };

    validate_range_bounds(start, end, total_size)
}

/// Validate range request bounds against the file size.
///
/// A start at or past the end of the file cannot be satisfied.
pub fn validate_range_bounds(start: u64, end: u64, total_size: u64) -> RangeRequest {
    if start >= total_size {
        return RangeRequest::Unsatisfiable;
    }
    RangeRequest::Partial(ByteRange {
        start,
        end: end.min(total_size - 1),
    })
}
