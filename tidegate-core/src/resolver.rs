//! Magnet link to torrent handle resolution.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace};

use crate::torrent::{EngineError, InfoHash, MagnetLink, TorrentEngine, TorrentHandle};

/// Errors returned while resolving a magnet link.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("Invalid magnet link: {reason}")]
    InvalidMagnet { reason: String },

    #[error("Timed out after {timeout:?} waiting for metadata of {info_hash}")]
    MetadataTimeout {
        info_hash: InfoHash,
        timeout: Duration,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Turns magnet links into handles with metadata available.
///
/// Resolution is idempotent: the engine hands back the existing torrent for
/// an info hash it already tracks, so concurrent resolutions of the same link
/// share one download.
#[derive(Clone)]
pub struct TorrentResolver {
    engine: Arc<dyn TorrentEngine>,
    metadata_timeout: Option<Duration>,
}

impl TorrentResolver {
    /// Creates a resolver. `None` waits for metadata indefinitely.
    pub fn new(engine: Arc<dyn TorrentEngine>, metadata_timeout: Option<Duration>) -> Self {
        Self {
            engine,
            metadata_timeout,
        }
    }

    /// Resolves a magnet link, suspending until metadata is available.
    ///
    /// # Errors
    /// - `ResolveError::InvalidMagnet` - Empty or unparsable link
    /// - `ResolveError::Engine` - Engine refused the torrent or shut down
    /// - `ResolveError::MetadataTimeout` - Configured metadata wait elapsed
    pub async fn resolve(&self, magnet_link: &str) -> Result<Arc<dyn TorrentHandle>, ResolveError> {
        let magnet = MagnetLink::parse(magnet_link).map_err(|e| match e {
            EngineError::InvalidMagnetLink { reason } => ResolveError::InvalidMagnet { reason },
            other => ResolveError::InvalidMagnet {
                reason: other.to_string(),
            },
        })?;

        let handle = self.engine.add_magnet(&magnet).await?;
        trace!(info_hash = %magnet.info_hash, "Waiting for metadata");

        match self.metadata_timeout {
            Some(timeout) => tokio::time::timeout(timeout, handle.wait_for_metadata())
                .await
                .map_err(|_| ResolveError::MetadataTimeout {
                    info_hash: magnet.info_hash,
                    timeout,
                })??,
            None => handle.wait_for_metadata().await?,
        }

        debug!(info_hash = %magnet.info_hash, "Got metadata");
        Ok(handle)
    }

    /// The engine this resolver adds torrents to.
    pub fn engine(&self) -> &Arc<dyn TorrentEngine> {
        &self.engine
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::test_mocks::{MockEngine, MockFile, MockTorrent};

    const HASH: &str = "0123456789abcdef0123456789abcdef01234567";

    fn magnet() -> String {
        format!("magnet:?xt=urn:btih:{HASH}&dn=Test")
    }

    fn engine_with_torrent() -> (Arc<MockEngine>, Arc<MockTorrent>) {
        let engine = Arc::new(MockEngine::default());
        let torrent = Arc::new(MockTorrent::pending(
            InfoHash::from_hex(HASH).unwrap(),
            "Test",
            vec![Arc::new(MockFile::new("a.mkv", vec![0u8; 16]))],
        ));
        engine.register(Arc::clone(&torrent));
        (engine, torrent)
    }

    #[tokio::test]
    async fn test_empty_magnet_is_rejected_before_engine() {
        let (engine, _) = engine_with_torrent();
        let resolver = TorrentResolver::new(engine.clone(), None);

        let result = resolver.resolve("").await;
        assert!(matches!(result, Err(ResolveError::InvalidMagnet { .. })));
        assert_eq!(engine.add_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_unparsable_magnet_is_rejected() {
        let (engine, _) = engine_with_torrent();
        let resolver = TorrentResolver::new(engine, None);

        let result = resolver.resolve("magnet:?xt=urn:btih:nothex").await;
        assert!(matches!(result, Err(ResolveError::InvalidMagnet { .. })));
    }

    #[tokio::test]
    async fn test_resolve_waits_for_metadata() {
        let (engine, torrent) = engine_with_torrent();
        let resolver = TorrentResolver::new(engine, None);

        let pending = tokio::spawn({
            let resolver = resolver.clone();
            async move { resolver.resolve(&magnet()).await.map(|h| h.files().len()) }
        });

        tokio::task::yield_now().await;
        assert!(!pending.is_finished());

        torrent.mark_ready();
        let files = pending.await.unwrap().unwrap();
        assert_eq!(files, 1);
    }

    #[tokio::test]
    async fn test_concurrent_resolution_shares_torrent() {
        let (engine, torrent) = engine_with_torrent();
        torrent.mark_ready();
        let resolver = TorrentResolver::new(engine.clone(), None);

        let link = magnet();
        let (first, second) = tokio::join!(resolver.resolve(&link), resolver.resolve(&link));
        let first = first.unwrap();
        let second = second.unwrap();

        assert_eq!(first.info_hash(), second.info_hash());
        assert_eq!(engine.torrents().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metadata_timeout() {
        let (engine, _) = engine_with_torrent();
        let resolver = TorrentResolver::new(engine, Some(Duration::from_secs(5)));

        let result = resolver.resolve(&magnet()).await;
        assert!(matches!(result, Err(ResolveError::MetadataTimeout { .. })));
    }

    #[tokio::test]
    async fn test_engine_failure_is_propagated() {
        let (engine, _) = engine_with_torrent();
        engine.fail_adds.store(true, Ordering::SeqCst);
        let resolver = TorrentResolver::new(engine, None);

        let result = resolver.resolve(&magnet()).await;
        assert!(matches!(
            result,
            Err(ResolveError::Engine(EngineError::AddFailed { .. }))
        ));
    }
}
