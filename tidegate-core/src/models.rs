//! JSON payloads exchanged over the HTTP API.
//!
//! The same types are used by the gateway to render responses and by the
//! command line client to decode them.

use serde::{Deserialize, Serialize};

/// Response of `GET /info`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Info {
    pub name: String,
    #[serde(rename = "infohash")]
    pub info_hash: String,
    /// Full text of the first `.txt` file in the torrent, empty if none.
    pub description: String,
    /// Unix timestamp in seconds.
    pub creation_date: i64,
    pub files: Vec<FileInfo>,
}

/// File entry of an [`Info`] response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub length: u64,
}

/// Per-torrent record of `GET /metrics`, also used for progress reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentMetrics {
    pub magnet: String,
    #[serde(rename = "infohash")]
    pub info_hash: String,
    pub peers: usize,
    pub files: Vec<FileMetrics>,
}

/// Per-file download progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetrics {
    pub path: String,
    pub length: u64,
    pub completed: u64,
}
