//! Tidegate Core - torrent gateway building blocks
//!
//! Engine-facing traits and magnet parsing, magnet resolution, per-stream
//! progress monitoring, metrics aggregation, API authentication and
//! configuration. The HTTP surface lives in `tidegate-web`.

pub mod auth;
pub mod config;
pub mod info;
pub mod metrics;
pub mod models;
pub mod progress;
pub mod resolver;
pub mod torrent;
pub mod tracing_setup;

#[cfg(test)]
mod test_mocks;

// Re-export main types for convenient access
pub use auth::{AuthError, Authenticator};
pub use config::{AuthConfig, GatewayConfig};
pub use info::torrent_info;
pub use metrics::collect_metrics;
pub use models::{FileInfo, FileMetrics, Info, TorrentMetrics};
pub use progress::{ProgressCallback, ProgressGuard, ProgressMonitor};
pub use resolver::{ResolveError, TorrentResolver};
pub use torrent::{
    EngineBuilder, EngineError, EngineSettings, FileReader, InfoHash, MagnetLink, TorrentEngine,
    TorrentFile, TorrentHandle,
};
