//! Snapshot of every torrent tracked by the engine.

use tracing::{debug, error};

use crate::models::{FileMetrics, TorrentMetrics};
use crate::torrent::TorrentEngine;

/// Collects one [`TorrentMetrics`] record per tracked torrent.
///
/// Torrents whose metadata cannot be decoded (including ones still waiting
/// for metadata) are logged and skipped so the rest of the report survives.
/// Records are ordered by info hash.
pub async fn collect_metrics(engine: &dyn TorrentEngine) -> Vec<TorrentMetrics> {
    let mut torrents = engine.torrents().await;
    torrents.sort_by_key(|t| t.info_hash());

    let mut report = Vec::with_capacity(torrents.len());
    for torrent in torrents {
        let metadata = match torrent.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                error!(info_hash = %torrent.info_hash(), error = %e, "Could not decode metadata");
                continue;
            }
        };

        let files = torrent
            .files()
            .iter()
            .map(|f| {
                let length = f.length();
                FileMetrics {
                    path: f.path().to_string(),
                    length,
                    completed: f.bytes_completed().min(length),
                }
            })
            .collect();

        report.push(TorrentMetrics {
            magnet: metadata.magnet().to_uri(),
            info_hash: metadata.info_hash.to_string(),
            peers: torrent.peer_count(),
            files,
        });
    }

    debug!(torrents = report.len(), "Collected metrics");
    report
}
