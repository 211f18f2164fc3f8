//! CLI error type.

use thiserror::Error;
use vitalroute::config::ConfigError;
use vitalroute::logging::LoggingError;
use vitalroute::routing::RouteError;
use vitalroute::EngineError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("{0}")]
    Config(String),

    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] ConfigError),

    #[error("Failed to initialize logging: {0}")]
    Logging(#[from] LoggingError),

    #[error("Failed to start engine: {0}")]
    Engine(#[from] EngineError),

    #[error("{0}")]
    Route(#[from] RouteError),

    #[error("Invalid point '{input}': {reason}")]
    InvalidPoint { input: String, reason: String },

    #[error("{path}:{line}: {reason}")]
    Track {
        path: String,
        line: usize,
        reason: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Interrupted")]
    Interrupted,
}
