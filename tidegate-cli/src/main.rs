//! Tidegate CLI - HTTP to BitTorrent gateway with seeking support
//!
//! Runs the gateway and talks to a running one.

mod client;
mod commands;

use std::path::PathBuf;

use clap::Parser;
use tidegate_core::tracing_setup::{DEFAULT_VERBOSITY, init_tracing};

#[derive(Parser)]
#[command(name = "tidegate")]
#[command(about = "HTTP to BitTorrent gateway with seeking support")]
#[command(version)]
struct Cli {
    /// Verbosity level (0 is disabled, default is info, 7 is trace)
    #[arg(short, long, global = true, env = "TIDEGATE_VERBOSE", default_value_t = DEFAULT_VERBOSITY)]
    verbose: u8,

    /// Directory receiving a full trace log of the run
    #[arg(long, global = true, env = "TIDEGATE_LOGS_DIR")]
    logs_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: commands::Commands,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.logs_dir.as_deref())?;

    commands::handle_command(cli.command, cli.verbose).await
}
