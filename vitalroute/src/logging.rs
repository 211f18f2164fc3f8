//! Tracing subscriber setup.
//!
//! Console output goes to stderr with local RFC 3339 timestamps. When a log
//! directory is configured, a second non-ANSI layer writes daily rolling
//! files through a background worker; keep the returned [`LoggingGuard`]
//! alive until exit so buffered lines are flushed.
//!
//! `RUST_LOG` overrides the configured level.
//!
//! ```ignore
//! let config = ConfigFile::load().unwrap_or_default();
//! let _guard = logging::init_logging(&config.logging)?;
//! tracing::info!("started");
//! ```

use std::path::Path;

use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSettings;

/// Rolling file name prefix; the date is appended.
pub const LOG_FILE_PREFIX: &str = "vitalroute.log";

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{directive}': {reason}")]
    Filter { directive: String, reason: String },

    #[error("Failed to create log directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("A global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Flushes file logging on drop.
#[derive(Debug)]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Parses a filter directive such as `info` or `vitalroute=debug,warn`.
pub fn filter_from(directive: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(directive).map_err(|e| LoggingError::Filter {
        directive: directive.to_string(),
        reason: e.to_string(),
    })
}

/// `RUST_LOG` when set and valid, otherwise `directive`.
pub fn build_filter(directive: &str) -> Result<EnvFilter, LoggingError> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => filter_from(directive),
    }
}

/// Local-offset timer.
///
/// The local offset can only be read reliably before other threads exist,
/// so this should run before the Tokio runtime starts; otherwise UTC is used.
fn local_timer() -> OffsetTime<Rfc3339> {
    let offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

/// Installs the global subscriber.
pub fn init_logging(settings: &LoggingSettings) -> Result<LoggingGuard, LoggingError> {
    let filter = build_filter(&settings.level)?;
    let timer = local_timer();

    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(timer.clone())
        .with_target(false);

    let (file_layer, file_guard) = match &settings.directory {
        Some(dir) => {
            let (writer, guard) = file_writer(dir)?;
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_timer(timer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    if let Some(dir) = &settings.directory {
        tracing::debug!(directory = %dir.display(), "File logging enabled");
    }

    Ok(LoggingGuard { _file: file_guard })
}

fn file_writer(
    dir: &Path,
) -> Result<(tracing_appender::non_blocking::NonBlocking, WorkerGuard), LoggingError> {
    std::fs::create_dir_all(dir)?;
    let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
    Ok(tracing_appender::non_blocking(appender))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_filter_directives() {
        assert!(filter_from("info").is_ok());
        assert!(filter_from("vitalroute=debug,warn").is_ok());
        assert!(matches!(
            filter_from("vitalroute=loudest"),
            Err(LoggingError::Filter { .. })
        ));
    }

    #[test]
    fn test_file_writer_creates_directory() {
        let dir = TempDir::new().unwrap();
        let logs = dir.path().join("logs");
        let (_writer, _guard) = file_writer(&logs).unwrap();
        assert!(logs.is_dir());
    }
}
