//! Tracing subscriber setup
//!
//! Logs go to stdout and, when enabled, to a plain-text log file at the same
//! time. `RUST_LOG` takes precedence over the configured level.

use std::fs::{self, OpenOptions};
use std::sync::Mutex;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{BotError, BotResult};

/// Resolve the filter: `RUST_LOG`, then `--verbose`, then the configured level
pub fn build_filter(config: &LoggingConfig, verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { config.level.as_str() };
        EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"))
    })
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_logging(config: &LoggingConfig, verbose: bool) -> BotResult<()> {
    let filter = build_filter(config, verbose);
    let stdout_layer = fmt::layer().with_target(false);

    let file_layer = if config.log_to_file {
        if let Some(parent) = config.log_file.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                BotError::FileWrite(format!("{}: {}", parent.display(), e))
            })?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.log_file)
            .map_err(|e| BotError::FileWrite(format!("{}: {}", config.log_file.display(), e)))?;

        Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_writer(Mutex::new(file)),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .ok();

    Ok(())
}
