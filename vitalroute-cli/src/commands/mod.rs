//! CLI command implementations.
//!
//! `config` works on the settings file alone. Every other command starts an
//! [`Engine`], runs until done or Ctrl-C, then shuts the engine down so the
//! suggestion cache is flushed.

pub mod config;
pub mod geocode;
pub mod route;
pub mod track;

use std::future::Future;
use std::sync::Arc;

use vitalroute::advisory::Advisory;
use vitalroute::config::ConfigFile;
use vitalroute::geo::Coordinate;
use vitalroute::{Engine, EngineConfig};

use crate::error::CliError;

/// Starts the engine, runs `command` against it and shuts it down.
pub async fn with_engine<F, Fut>(config: &ConfigFile, command: F) -> Result<(), CliError>
where
    F: FnOnce(Arc<Engine>) -> Fut,
    Fut: Future<Output = Result<(), CliError>>,
{
    let engine = Arc::new(Engine::start(EngineConfig::from(config)).await?);

    let result = tokio::select! {
        result = command(Arc::clone(&engine)) => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl-C, shutting down");
            Err(CliError::Interrupted)
        }
    };

    report_advisories(&engine);
    engine.shutdown().await;
    result
}

fn report_advisories(engine: &Engine) {
    for advisory in [Advisory::GeocodingDegraded, Advisory::GeocodingUnavailable] {
        if engine.advisories().was_raised(advisory) {
            eprintln!("Warning: {}", advisory);
        }
    }
}

/// Parses `lat,lon`; anything else is not a point.
pub fn parse_point(input: &str) -> Option<Result<Coordinate, CliError>> {
    let (lat, lon) = input.split_once(',')?;
    let lat: f64 = lat.trim().parse().ok()?;
    let lon: f64 = lon.trim().parse().ok()?;
    Some(Coordinate::new(lat, lon).map_err(|e| CliError::InvalidPoint {
        input: input.to_string(),
        reason: e.to_string(),
    }))
}

/// A literal `lat,lon` point, or an address resolved through the engine.
pub async fn locate(engine: &Engine, input: &str) -> Result<Coordinate, CliError> {
    match parse_point(input) {
        Some(point) => point,
        None => Ok(engine.resolver().resolve(input).await),
    }
}

pub fn format_point(coordinate: Coordinate) -> String {
    format!("{:.6}, {:.6}", coordinate.latitude(), coordinate.longitude())
}
