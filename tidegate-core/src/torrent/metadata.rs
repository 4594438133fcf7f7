//! Decoded torrent metadata as surfaced by an engine.

use chrono::{DateTime, TimeZone, Utc};

use super::{InfoHash, MagnetLink};

/// Complete metadata for a torrent whose info dictionary has been obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentMetadata {
    pub info_hash: InfoHash,
    pub name: String,
    /// Unix timestamp in seconds, 0 when the torrent carries none.
    pub creation_date: i64,
    pub trackers: Vec<String>,
    pub files: Vec<FileLayout>,
}

/// Individual file within a torrent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLayout {
    /// Relative, slash-separated path inside the torrent.
    pub path: String,
    pub length: u64,
}

impl TorrentMetadata {
    /// Reconstructs a magnet link from the stored metadata.
    pub fn magnet(&self) -> MagnetLink {
        MagnetLink {
            info_hash: self.info_hash,
            display_name: Some(self.name.clone()),
            trackers: self.trackers.clone(),
        }
    }

    /// Creation date as a UTC timestamp, falling back to the epoch.
    pub fn created_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.creation_date, 0)
            .single()
            .unwrap_or(DateTime::UNIX_EPOCH)
    }
}
