//! Shared logging utilities for dbwatch.
//!
//! Console modes log to stderr; the long-running service can be pointed at an
//! append-only log file instead.

use crate::Result;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

/// Maps the CLI verbosity flags onto a tracing level.
pub(crate) const fn level_for(verbose: u8, quiet: bool) -> tracing::Level {
    match (quiet, verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::INFO,
        (false, 1) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    }
}

/// Initializes structured logging based on verbosity level.
///
/// # Arguments
/// * `verbose` - Verbosity level (0=INFO, 1=DEBUG, 2+=TRACE)
/// * `quiet` - If true, only show ERROR level logs
/// * `log_file` - Append to this file instead of writing to stderr
///
/// # Example
/// ```rust,no_run
/// use dbwatch_core::logging::init_logging;
///
/// init_logging(1, false, None).expect("Failed to initialize logging");
/// ```
pub fn init_logging(verbose: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let level = level_for(verbose, quiet);

    let builder = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    let initialized = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    crate::error::DbWatchError::io(
                        format!("Failed to create log directory {}", parent.display()),
                        e,
                    )
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    crate::error::DbWatchError::io(
                        format!("Failed to open log file {}", path.display()),
                        e,
                    )
                })?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };

    initialized.map_err(|e| {
        crate::error::DbWatchError::configuration(format!("Failed to initialize logging: {}", e))
    })
}
