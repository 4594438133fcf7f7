//! Centralized configuration for Tidegate.
//!
//! Defaults live here; the binary layers environment variables and command
//! line flags on top.

use std::path::PathBuf;
use std::time::Duration;

use crate::progress::PROGRESS_POLL_INTERVAL;

/// Default HTTP listen address, as accepted on the command line.
pub const DEFAULT_LISTEN_ADDRESS: &str = ":1337";

/// Default username for the static credential policy.
pub const DEFAULT_API_USERNAME: &str = "admin";

/// Central configuration for a gateway instance.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub torrent: TorrentConfig,
    pub auth: AuthConfig,
    pub streaming: StreamingConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen address; a bare `:port` binds every interface.
    pub listen_address: String,
    /// Upper bound for draining in-flight requests on shutdown
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: DEFAULT_LISTEN_ADDRESS.to_string(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl ServerConfig {
    /// Listen address in a form `TcpListener::bind` accepts.
    pub fn bind_address(&self) -> String {
        normalize_listen_address(&self.listen_address)
    }
}

/// Turns `:1337` into `0.0.0.0:1337`; other addresses pass through.
pub fn normalize_listen_address(address: &str) -> String {
    let address = address.trim();
    if address.starts_with(':') {
        format!("0.0.0.0{address}")
    } else {
        address.to_string()
    }
}

/// Torrent engine settings.
#[derive(Debug, Clone)]
pub struct TorrentConfig {
    /// Directory downloaded data is stored in
    pub storage_dir: PathBuf,
    /// Enables the engine's own debug output
    pub debug: bool,
    /// How long to wait for metadata before failing (None = forever)
    pub metadata_timeout: Option<Duration>,
}

impl Default for TorrentConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            debug: false,
            metadata_timeout: None,
        }
    }
}

/// `~/.local/share/tidegate/var/lib/tidegate/data`, relative to the working
/// directory when no home directory is known.
pub fn default_storage_dir() -> PathBuf {
    let home = std::env::var_os("HOME").map(PathBuf::from).unwrap_or_default();
    home.join(".local")
        .join("share")
        .join("tidegate")
        .join("var")
        .join("lib")
        .join("tidegate")
        .join("data")
}

/// Authentication policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthConfig {
    /// Compare against a fixed username and password.
    Static { username: String, password: String },
    /// Validate bearer tokens issued by an OpenID Connect provider.
    Oidc { issuer: String, client_id: String },
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::Static {
            username: DEFAULT_API_USERNAME.to_string(),
            password: String::new(),
        }
    }
}

impl AuthConfig {
    /// Chooses OIDC when either OIDC value is non-blank, static credentials
    /// otherwise.
    pub fn select(
        username: String,
        password: String,
        oidc_issuer: String,
        oidc_client_id: String,
    ) -> Self {
        if !oidc_issuer.trim().is_empty() || !oidc_client_id.trim().is_empty() {
            Self::Oidc {
                issuer: oidc_issuer,
                client_id: oidc_client_id,
            }
        } else {
            Self::Static { username, password }
        }
    }
}

/// Streaming behavior.
#[derive(Debug, Clone)]
pub struct StreamingConfig {
    /// Poll interval of the per-stream progress monitor
    pub progress_interval: Duration,
    /// Size of each read issued against the engine while streaming
    pub chunk_size: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            progress_interval: PROGRESS_POLL_INTERVAL,
            chunk_size: 256 * 1024, // 256 KiB
        }
    }
}
