//! File streaming with range and conditional request support.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::header::{
    ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, IF_MODIFIED_SINCE, IF_NONE_MATCH,
    IF_RANGE, LAST_MODIFIED,
};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use futures::stream;
use serde::Deserialize;
use tidegate_core::{FileReader, ProgressGuard, ProgressMonitor, TorrentFile, TorrentHandle};
use tracing::debug;

use crate::errors::ApiError;
use crate::range::{RangeRequest, extract_range_header, parse_range_header};
use crate::server::AppState;

/// Query parameters of `GET /stream`.
#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub magnet: String,
    #[serde(default)]
    pub path: String,
}

/// Streams one file of the torrent behind a magnet link.
///
/// Validation short-circuits in order: magnet present, path present,
/// torrent resolved, path found. Bytes that have not been downloaded yet are
/// waited for while the body is being sent.
///
/// # Errors
/// - 422 when the magnet link or path is empty, or the magnet is unparsable
/// - 404 when no file has exactly the requested path
/// - 5xx when the engine fails
pub async fn stream(
    State(state): State<AppState>,
    Query(query): Query<StreamQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    if query.magnet.is_empty() {
        return Err(ApiError::invalid_request(
            "could not work with empty magnet link",
        ));
    }
    if query.path.is_empty() {
        return Err(ApiError::invalid_request("could not work with empty path"));
    }

    debug!(magnet = %query.magnet, path = %query.path, "Getting stream");

    let torrent = state.resolver.resolve(&query.magnet).await?;
    let Some(file) = torrent.files().into_iter().find(|f| f.path() == query.path) else {
        return Err(ApiError::not_found("could not find path in torrent"));
    };
    let last_modified = torrent.metadata()?.created_at();

    debug!(magnet = %query.magnet, path = %query.path, "Got stream");

    serve_file(&state, &query.magnet, torrent, file, last_modified, &headers)
}

fn serve_file(
    state: &AppState,
    magnet: &str,
    torrent: Arc<dyn TorrentHandle>,
    file: Arc<dyn TorrentFile>,
    last_modified: DateTime<Utc>,
    headers: &HeaderMap,
) -> Result<Response, ApiError> {
    let size = file.length();
    // Epoch timestamps mean "unknown", as torrents without a creation date report 0
    let last_modified = (last_modified.timestamp() > 0).then_some(last_modified);

    if let Some(modified) = last_modified
        && not_modified(headers, modified)
    {
        return Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(LAST_MODIFIED, http_date(modified))
            .body(Body::empty())
            .map_err(|e| ApiError::internal(e.to_string()));
    }

    let range = if size == 0 || !if_range_matches(headers, last_modified) {
        RangeRequest::Full
    } else {
        extract_range_header(headers)
            .map(|r| parse_range_header(r, size))
            .unwrap_or(RangeRequest::Full)
    };

    let content_type = mime_guess::from_path(file.display_path()).first_or_octet_stream();
    let mut response = Response::builder()
        .header(ACCEPT_RANGES, "bytes")
        .header(CONTENT_TYPE, content_type.as_ref());
    if let Some(modified) = last_modified {
        response = response.header(LAST_MODIFIED, http_date(modified));
    }

    let (start, length) = match range {
        RangeRequest::Full => {
            response = response.status(StatusCode::OK);
            (0, size)
        }
        RangeRequest::Partial(range) => {
            response = response
                .status(StatusCode::PARTIAL_CONTENT)
                .header(CONTENT_RANGE, range.content_range(size));
            (range.start, range.length())
        }
        RangeRequest::Unsatisfiable => {
            return response
                .status(StatusCode::RANGE_NOT_SATISFIABLE)
                .header(CONTENT_RANGE, format!("bytes */{size}"))
                .body(Body::empty())
                .map_err(|e| ApiError::internal(e.to_string()));
        }
    };

    let guard = ProgressMonitor::new(
        magnet,
        torrent,
        Arc::clone(&file),
        state.streaming.progress_interval,
        Arc::clone(&state.on_progress),
    )
    .spawn();

    let body = Body::from_stream(file_stream(
        file.reader(),
        start,
        length,
        state.streaming.chunk_size,
        guard,
    ));

    response
        .header(CONTENT_LENGTH, length)
        .body(body)
        .map_err(|e| ApiError::internal(e.to_string()))
}

/// Reads `length` bytes from `start` in chunks.
///
/// The progress guard travels with the stream, so the monitor stops as soon
/// as the body is finished or dropped by a disconnecting client.
fn file_stream(
    reader: Arc<dyn FileReader>,
    start: u64,
    length: u64,
    chunk_size: usize,
    guard: ProgressGuard,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let end = start + length;
    let chunk_size = chunk_size.max(1) as u64;

    stream::unfold(Some((reader, start, guard)), move |state| async move {
        let (reader, offset, guard) = state?;
        if offset >= end {
            return None;
        }

        let chunk = (end - offset).min(chunk_size) as usize;
        match reader.read_at(offset, chunk).await {
            Ok(bytes) if !bytes.is_empty() => {
                let next = offset + bytes.len() as u64;
                Some((Ok(bytes), Some((reader, next, guard))))
            }
            Ok(_) => Some((
                Err(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "engine returned no data",
                )),
                None,
            )),
            Err(e) => {
                debug!(error = %e, offset, "Closed connection for client");
                Some((Err(std::io::Error::other(e)), None))
            }
        }
    })
}

/// Formats a timestamp as an HTTP date.
pub fn http_date(time: DateTime<Utc>) -> String {
    time.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value.trim())
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// `If-Modified-Since` check; ignored when `If-None-Match` is present.
fn not_modified(headers: &HeaderMap, modified: DateTime<Utc>) -> bool {
    if headers.contains_key(IF_NONE_MATCH) {
        return false;
    }
    headers
        .get(IF_MODIFIED_SINCE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_http_date)
        .is_some_and(|since| modified.timestamp() <= since.timestamp())
}

/// Whether a Range header may be honored under `If-Range`.
///
/// Only date validators are understood; anything else serves the full file.
fn if_range_matches(headers: &HeaderMap, modified: Option<DateTime<Utc>>) -> bool {
    let Some(value) = headers.get(IF_RANGE) else {
        return true;
    };
    let Some(modified) = modified else {
        return false;
    };
    value
        .to_str()
        .ok()
        .and_then(parse_http_date)
        .is_some_and(|since| since.timestamp() == modified.timestamp())
}
