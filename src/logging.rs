//! Tracing subscriber setup
//!
//! `RUST_LOG` always overrides the configured default filter.

use crate::config::LoggingSettings;
use crate::error::{QuarkyError, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Build the filter from `RUST_LOG`, falling back to `default_filter`
pub fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install the global subscriber
///
/// Returns the guard of the file writer when a log file is configured; it
/// must be kept alive for buffered lines to reach the file.
pub fn init_logging(settings: &LoggingSettings) -> Result<Option<WorkerGuard>> {
    let console = if settings.json {
        fmt::layer().json().boxed()
    } else {
        fmt::layer().boxed()
    };

    let (file_layer, guard) = match &settings.log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let file_name = path.file_name().ok_or_else(|| {
                QuarkyError::Config(format!("Log file {:?} has no file name", path))
            })?;
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .with(env_filter(&settings.default_filter))
        .try_init()
        .map_err(|e| QuarkyError::Config(format!("Failed to install logger: {}", e)))?;

    Ok(guard)
}
