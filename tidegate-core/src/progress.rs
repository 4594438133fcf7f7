//! Download progress polling for streamed files.
//!
//! A monitor polls one file's completed byte count on a fixed tick and
//! reports changes through a callback. It stops by itself once the file is
//! complete, and is aborted when its [`ProgressGuard`] is dropped so that it
//! never outlives the response it belongs to.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::trace;

use crate::models::{FileMetrics, TorrentMetrics};
use crate::torrent::{TorrentFile, TorrentHandle};

/// Default polling interval.
pub const PROGRESS_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Receives progress reports. The torrent record carries magnet and peer
/// count with an empty file list; the file record carries the numbers.
pub type ProgressCallback = Arc<dyn Fn(&TorrentMetrics, &FileMetrics) + Send + Sync>;

/// Polls a single file and emits a report whenever its progress changes.
pub struct ProgressMonitor {
    magnet: String,
    torrent: Arc<dyn TorrentHandle>,
    file: Arc<dyn TorrentFile>,
    interval: Duration,
    callback: ProgressCallback,
}

impl ProgressMonitor {
    /// Creates a monitor for `file` of `torrent`.
    pub fn new(
        magnet: impl Into<String>,
        torrent: Arc<dyn TorrentHandle>,
        file: Arc<dyn TorrentFile>,
        interval: Duration,
        callback: ProgressCallback,
    ) -> Self {
        Self {
            magnet: magnet.into(),
            torrent,
            file,
            interval,
            callback,
        }
    }

    /// Spawns the monitor onto the runtime.
    pub fn spawn(self) -> ProgressGuard {
        ProgressGuard {
            task: tokio::spawn(self.run()),
        }
    }

    /// Polls until the file is complete.
    pub async fn run(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately; reports start one interval in.
        ticker.tick().await;

        let mut last_completed = 0u64;
        loop {
            ticker.tick().await;

            let length = self.file.length();
            let completed = self.file.bytes_completed().min(length);
            if completed >= length {
                trace!(path = self.file.path(), "File complete, stopping progress monitor");
                return;
            }

            if completed != last_completed {
                let torrent = TorrentMetrics {
                    magnet: self.magnet.clone(),
                    info_hash: self.torrent.info_hash().to_string(),
                    peers: self.torrent.peer_count(),
                    files: Vec::new(),
                };
                let file = FileMetrics {
                    path: self.file.path().to_string(),
                    length,
                    completed,
                };
                (self.callback)(&torrent, &file);
            }

            last_completed = completed;
        }
    }
}

/// Owns a running monitor; dropping it cancels the monitor.
#[derive(Debug)]
pub struct ProgressGuard {
    task: JoinHandle<()>,
}

impl ProgressGuard {
    /// Whether the monitor has stopped on its own.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ProgressGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}
