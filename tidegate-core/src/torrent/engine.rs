//! Engine-agnostic torrent interfaces.
//!
//! These traits are the whole contract between the gateway and a torrent
//! engine. The engine owns and synchronizes all swarm state (progress
//! counters, peer lists, the torrent registry); the gateway only reads
//! snapshots through these methods.

use std::net::{Ipv4Addr, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use super::{EngineError, InfoHash, MagnetLink, TorrentMetadata};

/// A running torrent engine.
#[async_trait]
pub trait TorrentEngine: Send + Sync {
    /// Adds a torrent from a magnet link, or returns the existing handle.
    ///
    /// Adding the same info hash twice must hand back the same underlying
    /// torrent rather than starting a second download.
    ///
    /// # Errors
    /// - `EngineError::AddFailed` - Engine refused the torrent
    /// - `EngineError::EngineShutdown` - Engine has been closed
    async fn add_magnet(&self, magnet: &MagnetLink) -> Result<Arc<dyn TorrentHandle>, EngineError>;

    /// Returns every torrent currently tracked, in no particular order.
    async fn torrents(&self) -> Vec<Arc<dyn TorrentHandle>>;

    /// Stops all torrents and releases their handles.
    ///
    /// Returns every error encountered while shutting down.
    async fn close(&self) -> Vec<EngineError>;
}

/// Reference to a torrent tracked by the engine.
#[async_trait]
pub trait TorrentHandle: Send + Sync {
    /// Identity of the torrent.
    fn info_hash(&self) -> InfoHash;

    /// Suspends until the engine has obtained the torrent's metadata.
    ///
    /// # Errors
    /// - `EngineError::EngineShutdown` - Engine closed while waiting
    async fn wait_for_metadata(&self) -> Result<(), EngineError>;

    /// Decodes the stored metadata.
    ///
    /// # Errors
    /// - `EngineError::MetadataUnavailable` - Metadata not obtained yet
    /// - `EngineError::MetadataDecode` - Stored metadata is malformed
    fn metadata(&self) -> Result<TorrentMetadata, EngineError>;

    /// Files of the torrent in enumeration order; empty before metadata.
    fn files(&self) -> Vec<Arc<dyn TorrentFile>>;

    /// Number of currently connected peers.
    fn peer_count(&self) -> usize;
}

/// A single file inside a torrent.
pub trait TorrentFile: Send + Sync {
    /// Relative, slash-separated path inside the torrent.
    fn path(&self) -> &str;

    /// Name used to infer the content type when serving the file.
    fn display_path(&self) -> &str {
        self.path()
    }

    /// Total length in bytes.
    fn length(&self) -> u64;

    /// Bytes downloaded and verified so far, never more than `length`.
    fn bytes_completed(&self) -> u64;

    /// Random-access reader over the file's content.
    fn reader(&self) -> Arc<dyn FileReader>;
}

/// Positional reader over possibly incomplete torrent data.
///
/// Reads of bytes that have not been downloaded yet suspend until the
/// engine delivers the covering pieces.
#[async_trait]
pub trait FileReader: Send + Sync {
    /// Reads `length` bytes starting at `offset`.
    ///
    /// # Errors
    /// - `EngineError::InvalidRange` - Range exceeds the file
    /// - `EngineError::EngineShutdown` - Engine closed while waiting
    async fn read_at(&self, offset: u64, length: usize) -> Result<Bytes, EngineError>;

    /// Total size of the file in bytes.
    fn size(&self) -> u64;
}

/// Settings handed to an engine at construction time.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Directory for downloaded data, keyed by info hash below it.
    pub storage_dir: PathBuf,
    /// Enables the engine's own debug output.
    pub debug: bool,
    /// Peer listening port chosen by the gateway.
    pub listen_port: u16,
}

/// Constructs engines for a gateway.
#[async_trait]
pub trait EngineBuilder: Send + Sync {
    /// Builds and starts an engine.
    ///
    /// # Errors
    /// Returns the engine's construction error; the gateway aborts opening.
    async fn build(&self, settings: EngineSettings) -> Result<Arc<dyn TorrentEngine>, EngineError>;
}

/// Picks a currently unused TCP port for the engine's peer listener.
///
/// # Errors
/// - `EngineError::NoFreePort` - The OS refused an ephemeral bind
pub fn pick_free_port() -> Result<u16, EngineError> {
    let listener =
        TcpListener::bind((Ipv4Addr::UNSPECIFIED, 0)).map_err(EngineError::NoFreePort)?;
    let port = listener
        .local_addr()
        .map_err(EngineError::NoFreePort)?
        .port();
    Ok(port)
}
