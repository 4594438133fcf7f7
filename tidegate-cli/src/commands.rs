//! CLI command implementations

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, SecondsFormat};
use clap::{Args, Subcommand};
use regex::Regex;
use tidegate_core::config::{AuthConfig, DEFAULT_API_USERNAME, DEFAULT_LISTEN_ADDRESS, GatewayConfig};
use tidegate_core::{FileInfo, FileMetrics, Info, ProgressCallback, TorrentMetrics};
use tidegate_sim::{SeedCatalog, SimulatedEngineBuilder, SimulationConfig};
use tidegate_web::Gateway;
use tracing::{debug, info, warn};

use crate::client::GatewayClient;

const DEFAULT_REMOTE_ADDRESS: &str = "http://localhost:1337/";

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Start a gateway
    #[command(visible_alias = "g")]
    Gateway(GatewayArgs),
    /// Get streamable URLs from the gateway's info endpoint
    #[command(visible_alias = "i")]
    Info {
        #[command(flatten)]
        remote: RemoteArgs,
        /// Magnet link to get info for
        #[arg(short, long, env = "TIDEGATE_MAGNET", default_value = "")]
        magnet: String,
        /// Regex selecting the stream URL to print, i.e. `(.*).mkv$` for the
        /// first .mkv file; disables all other info
        #[arg(short = 'x', long, env = "TIDEGATE_EXPRESSION")]
        expression: Option<String>,
    },
    /// Get metrics from the gateway
    #[command(visible_alias = "m")]
    Metrics {
        #[command(flatten)]
        remote: RemoteArgs,
    },
}

/// Flags of the `gateway` command.
#[derive(Args, Debug)]
pub struct GatewayArgs {
    /// Path to store downloaded torrents in
    #[arg(short, long, env = "TIDEGATE_STORAGE")]
    pub storage: Option<PathBuf>,
    /// Listening address
    #[arg(short, long, env = "TIDEGATE_LADDR", default_value = DEFAULT_LISTEN_ADDRESS)]
    pub laddr: String,
    /// Username for the management API. Ignored if any of the OIDC parameters are set.
    #[arg(long, env = "TIDEGATE_API_USERNAME", default_value = DEFAULT_API_USERNAME)]
    pub api_username: String,
    /// Password for the management API. Ignored if any of the OIDC parameters are set.
    #[arg(long, env = "TIDEGATE_API_PASSWORD", default_value = "")]
    pub api_password: String,
    /// OIDC issuer (i.e. https://example.eu.auth0.com/)
    #[arg(long, env = "TIDEGATE_OIDC_ISSUER", default_value = "")]
    pub oidc_issuer: String,
    /// OIDC client ID
    #[arg(long, env = "TIDEGATE_OIDC_CLIENT_ID", default_value = "")]
    pub oidc_client_id: String,
    /// Seconds to wait for torrent metadata before failing a request (waits forever if unset)
    #[arg(long, env = "TIDEGATE_METADATA_TIMEOUT")]
    pub metadata_timeout: Option<u64>,
    /// Seconds to wait for open connections when shutting down
    #[arg(long, env = "TIDEGATE_SHUTDOWN_TIMEOUT", default_value_t = 30)]
    pub shutdown_timeout: u64,
    /// Directory whose entries are served as torrents by the simulated engine
    #[arg(long, env = "TIDEGATE_SEED_DIR")]
    pub seed_dir: Option<PathBuf>,
}

/// Flags shared by commands that talk to a running gateway.
#[derive(Args, Debug)]
pub struct RemoteArgs {
    /// Username for the gateway
    #[arg(short = 'u', long, env = "TIDEGATE_API_USERNAME", default_value = DEFAULT_API_USERNAME)]
    pub api_username: String,
    /// Password or OIDC access token for the gateway
    #[arg(short = 'p', long, env = "TIDEGATE_API_PASSWORD", default_value = "")]
    pub api_password: String,
    /// Remote address
    #[arg(short, long, env = "TIDEGATE_RADDR", default_value = DEFAULT_REMOTE_ADDRESS)]
    pub raddr: String,
}

/// Input problems detected before contacting the gateway.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("missing API password")]
    MissingApiPassword,

    #[error("missing API username")]
    MissingApiUsername,

    #[error("could not work with empty magnet link")]
    EmptyMagnetLink,

    #[error("could not find a path that matches the supplied expression")]
    NoPathMatchesExpression,
}

/// Handle the CLI command
///
/// # Errors
/// Returns the error of the command that failed
pub async fn handle_command(command: Commands, verbosity: u8) -> anyhow::Result<()> {
    match command {
        Commands::Gateway(args) => run_gateway(args, verbosity).await,
        Commands::Info {
            remote,
            magnet,
            expression,
        } => show_info(remote, magnet, expression).await,
        Commands::Metrics { remote } => show_metrics(remote).await,
    }
}

impl GatewayArgs {
    /// Layers the flags over the default configuration.
    pub fn into_config(self, verbosity: u8) -> GatewayConfig {
        let mut config = GatewayConfig::default();
        config.server.listen_address = self.laddr;
        config.server.shutdown_timeout = Duration::from_secs(self.shutdown_timeout);
        if let Some(storage) = self.storage {
            config.torrent.storage_dir = storage;
        }
        config.torrent.debug = verbosity > 5;
        config.torrent.metadata_timeout = self.metadata_timeout.map(Duration::from_secs);
        config.auth = AuthConfig::select(
            self.api_username,
            self.api_password,
            self.oidc_issuer,
            self.oidc_client_id,
        );
        config
    }
}

/// Runs a gateway until it fails or the process is signalled.
///
/// The first signal closes the gateway gracefully; a second one while it is
/// closing terminates the process.
///
/// # Errors
/// - Gateway failed to open, failed while serving, or did not close cleanly
pub async fn run_gateway(args: GatewayArgs, verbosity: u8) -> anyhow::Result<()> {
    let catalog = SeedCatalog::new();
    if let Some(dir) = &args.seed_dir {
        let magnets = catalog
            .seed_directory(dir)
            .await
            .with_context(|| format!("could not seed {}", dir.display()))?;
        for magnet in magnets {
            info!(magnet = %magnet.to_uri(), "Seeding");
        }
    }

    let config = args.into_config(verbosity);
    let shutdown_timeout = config.server.shutdown_timeout;
    let builder = Arc::new(SimulatedEngineBuilder::new(
        catalog,
        SimulationConfig::default(),
    ));
    let gateway = Gateway::new(config, builder, Arc::new(log_progress) as ProgressCallback);

    gateway.open().await?;

    tokio::select! {
        result = gateway.wait() => {
            let closed = gateway.close(shutdown_timeout).await;
            result?;
            closed?;
        }
        _ = shutdown_signal() => {
            info!("Gracefully shutting down");
            tokio::select! {
                result = gateway.close(shutdown_timeout) => result?,
                _ = shutdown_signal() => {
                    warn!("Forcing shutdown");
                    std::process::exit(1);
                }
            }
        }
    }

    Ok(())
}

fn log_progress(torrent: &TorrentMetrics, file: &FileMetrics) {
    debug!(
        peers = torrent.peers,
        completed = file.completed,
        total = file.length,
        path = %file.path,
        "Streaming"
    );
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Could not listen for interrupt");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Could not listen for termination");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

fn connect(remote: RemoteArgs) -> anyhow::Result<GatewayClient> {
    if remote.api_password.trim().is_empty() {
        return Err(CommandError::MissingApiPassword.into());
    }
    if remote.api_username.trim().is_empty() {
        return Err(CommandError::MissingApiUsername.into());
    }
    Ok(GatewayClient::new(
        &remote.raddr,
        remote.api_username,
        remote.api_password,
    )?)
}

/// Prints the files of a torrent with their stream URLs.
///
/// # Errors
/// - Missing credentials or magnet link, invalid expression
/// - Gateway unreachable or refused the request
/// - No path matches the expression
pub async fn show_info(
    remote: RemoteArgs,
    magnet: String,
    expression: Option<String>,
) -> anyhow::Result<()> {
    let client = connect(remote)?;
    if magnet.trim().is_empty() {
        return Err(CommandError::EmptyMagnetLink.into());
    }
    let expression = expression
        .filter(|e| !e.trim().is_empty())
        .map(|e| Regex::new(&e))
        .transpose()
        .context("invalid expression")?;

    let info = client.info(&magnet).await?;

    match expression {
        None => print!("{}", info_csv(&client, &magnet, &info)),
        Some(expression) => {
            let file = first_match(&info, &expression)
                .ok_or(CommandError::NoPathMatchesExpression)?;
            println!("{}", client.stream_url(&magnet, &file.path));
        }
    }
    Ok(())
}

/// Prints the gateway's metrics as JSON.
///
/// # Errors
/// - Missing credentials
/// - Gateway unreachable or refused the request
pub async fn show_metrics(remote: RemoteArgs) -> anyhow::Result<()> {
    let client = connect(remote)?;
    let metrics = client.metrics().await?;
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

fn first_match<'a>(info: &'a Info, expression: &Regex) -> Option<&'a FileInfo> {
    info.files.iter().find(|f| expression.is_match(&f.path))
}

fn info_csv(client: &GatewayClient, magnet: &str, info: &Info) -> String {
    let created = DateTime::from_timestamp(info.creation_date, 0)
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
        .unwrap_or_default();

    let mut out = String::from("path,length,creationTime,streamURL\n");
    for file in &info.files {
        let stream_url = client.stream_url(magnet, &file.path);
        let row = [
            csv_field(&file.path),
            file.length.to_string(),
            created.clone(),
            csv_field(stream_url.as_str()),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) || value.starts_with(' ') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
