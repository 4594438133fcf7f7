//! Torrent engine seam: identifiers, magnet links and engine traits.
//!
//! The gateway never speaks the BitTorrent protocol itself. Everything it
//! needs from a swarm goes through the traits in [`engine`], which an
//! external engine (or the simulated one) implements.

pub mod engine;
pub mod magnet;
pub mod metadata;

use std::fmt;

pub use engine::{
    EngineBuilder, EngineSettings, FileReader, TorrentEngine, TorrentFile, TorrentHandle,
    pick_free_port,
};
pub use magnet::MagnetLink;
pub use metadata::{FileLayout, TorrentMetadata};

/// SHA-1 hash identifying a unique torrent.
///
/// 20-byte SHA-1 hash of the info dictionary. Used as the identity of a
/// torrent everywhere in the gateway, including storage layout and dedup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InfoHash([u8; 20]);

impl InfoHash {
    /// Creates InfoHash from 20-byte SHA-1 hash.
    pub fn new(hash: [u8; 20]) -> Self {
        Self(hash)
    }

    /// Parses a 40 character hex string.
    ///
    /// # Errors
    /// - `EngineError::InvalidInfoHash` - Wrong length or non-hex characters
    pub fn from_hex(value: &str) -> Result<Self, EngineError> {
        let mut hash = [0u8; 20];
        hex::decode_to_slice(value, &mut hash).map_err(|e| EngineError::InvalidInfoHash {
            value: value.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self(hash))
    }

    /// Returns reference to underlying 20-byte hash.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for InfoHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Errors reported by a torrent engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Invalid info hash {value}: {reason}")]
    InvalidInfoHash { value: String, reason: String },

    #[error("Invalid magnet link: {reason}")]
    InvalidMagnetLink { reason: String },

    #[error("Could not add torrent {info_hash}: {reason}")]
    AddFailed { info_hash: InfoHash, reason: String },

    #[error("Metadata for {info_hash} is not available yet")]
    MetadataUnavailable { info_hash: InfoHash },

    #[error("Could not decode metadata for {info_hash}: {reason}")]
    MetadataDecode { info_hash: InfoHash, reason: String },

    #[error("Read of {length} bytes at offset {offset} exceeds file size {file_size}")]
    InvalidRange {
        offset: u64,
        length: usize,
        file_size: u64,
    },

    #[error("Could not select a listening port")]
    NoFreePort(#[source] std::io::Error),

    #[error("Engine has been shut down")]
    EngineShutdown,

    #[error("I/O error")]
    Io(#[from] std::io::Error),
}
