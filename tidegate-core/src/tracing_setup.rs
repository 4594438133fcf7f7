//! Tracing setup for Tidegate
//!
//! Console output follows the user's verbosity; an optional log directory
//! receives a full trace of the run.

use std::fs::{File, create_dir_all};
use std::path::Path;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

/// Verbosity used when none is given.
pub const DEFAULT_VERBOSITY: u8 = 5;

/// Maps the 0-7 verbosity scale to a level filter.
///
/// 0 disables logging, 1-3 error, 4 warn, 5 info, 6 debug, 7 and above trace.
pub fn verbosity_filter(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::OFF,
        1..=3 => LevelFilter::ERROR,
        4 => LevelFilter::WARN,
        5 => LevelFilter::INFO,
        6 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

/// Initialize tracing for the process.
///
/// `RUST_LOG` overrides the console filter when set. With `logs_dir`, a
/// `tidegate-last-run.log` file in that directory captures everything at
/// trace level, overwriting the previous run.
///
/// # Errors
///
/// - `std::io::Error` - If the logs directory or log file cannot be created
pub fn init_tracing(verbosity: u8, logs_dir: Option<&Path>) -> Result<(), std::io::Error> {
    let level = verbosity_filter(verbosity);
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let file_layer = match logs_dir {
        Some(dir) => {
            create_dir_all(dir)?;
            let log_file = File::create(dir.join("tidegate-last-run.log"))?;
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false)
                    .with_writer(log_file)
                    .with_filter(EnvFilter::new("trace")),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::debug!(console = %level, "Tracing initialized");

    Ok(())
}
