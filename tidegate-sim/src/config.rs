//! Tunables of the simulated swarm.

use std::time::Duration;

/// Controls how quickly and how realistically simulated torrents download.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Delay between adding a torrent and its metadata arriving
    pub metadata_delay: Duration,
    /// Size of one simulated piece in bytes
    pub piece_size: usize,
    /// Download speed in bytes per second (None = everything at once)
    pub download_rate: Option<u64>,
    /// Inclusive range of simulated peer counts
    pub peers: (usize, usize),
    /// Deterministic seed for reproducible peer counts
    pub deterministic_seed: Option<u64>,
    /// Start every download paused until resumed explicitly
    pub start_paused: bool,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            metadata_delay: Duration::from_millis(500),
            piece_size: 256 * 1024, // 256 KiB
            download_rate: Some(2_097_152), // 2 MB/s
            peers: (5, 40),
            deterministic_seed: None,
            start_paused: false,
        }
    }
}

impl SimulationConfig {
    /// Metadata and content are available immediately.
    pub fn instant() -> Self {
        Self {
            metadata_delay: Duration::ZERO,
            download_rate: None,
            deterministic_seed: Some(42),
            ..Self::default()
        }
    }

    /// Metadata arrives immediately but no content is downloaded until
    /// [`crate::SimulatedEngine::resume_downloads`] is called.
    pub fn paused() -> Self {
        Self {
            start_paused: true,
            ..Self::instant()
        }
    }

    /// Time needed to download `bytes` at the configured rate.
    pub fn transfer_time(&self, bytes: usize) -> Duration {
        match self.download_rate {
            Some(rate) if rate > 0 => Duration::from_secs_f64(bytes as f64 / rate as f64),
            _ => Duration::ZERO,
        }
    }
}
