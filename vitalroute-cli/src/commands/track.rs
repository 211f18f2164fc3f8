//! `track`: replay a recorded drive against a headless map surface.
//!
//! The input is JSON lines, one position per line, in any shape the device
//! loggers produce:
//!
//! ```text
//! {"latitude": -22.0175, "longitude": -47.8908, "heading": 90, "timestamp": 1709560800000}
//! {"coords": {"lat": -22.0176, "lng": -47.8902}}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. A line without a
//! timestamp is stamped one second after the previous sample.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use vitalroute::bridge::{LayerGeometry, RenderSurface, ROUTE_LAYER};
use vitalroute::engine::SurfaceLink;
use vitalroute::tracking::{PositionSample, SessionEvent};
use vitalroute::Engine;

use super::{format_point, locate};
use crate::error::CliError;

const SAMPLE_SPACING_MS: i64 = 1_000;

/// Replay options.
#[derive(Debug, Clone)]
pub struct TrackOptions {
    pub file: PathBuf,
    pub destination: String,
    /// Pause between samples.
    pub interval: Duration,
    /// Quiet period to wait for late routes after the last sample.
    pub settle: Duration,
}

pub async fn run(engine: Arc<Engine>, options: TrackOptions) -> Result<(), CliError> {
    let text = tokio::fs::read_to_string(&options.file).await?;
    let samples = parse_samples(&options.file, &text)?;
    let destination = locate(&engine, &options.destination).await?;

    println!(
        "Replaying {} positions toward {}",
        samples.len(),
        format_point(destination)
    );

    let SurfaceLink {
        mut session,
        bridge,
        outbound,
    } = engine.tracking_session(destination);
    let mut events = session.events();

    let (positions_tx, positions_rx) = mpsc::channel(samples.len().max(1));
    let (inbound_tx, inbound_rx) = mpsc::channel(8);
    let session_task = tokio::spawn(session.run(positions_rx, inbound_rx));
    let surface_task = tokio::spawn(render(outbound));

    if inbound_tx.send(RenderSurface::ready_message()).await.is_err() {
        tracing::warn!("Tracking session ended before the surface was ready");
    }

    for sample in samples {
        if positions_tx.send(sample).await.is_err() {
            break;
        }
        while let Ok(event) = events.try_recv() {
            print_event(&event);
        }
        if !options.interval.is_zero() {
            tokio::time::sleep(options.interval).await;
        }
    }

    while let Ok(Some(event)) = tokio::time::timeout(options.settle, events.recv()).await {
        print_event(&event);
    }

    drop(positions_tx);
    drop(inbound_tx);
    let summary = session_task.await?;
    while let Ok(event) = events.try_recv() {
        print_event(&event);
    }

    drop(bridge);
    let surface = surface_task.await?;

    println!();
    println!("Positions:        {}", summary.positions);
    println!("Routes requested: {}", summary.routes_requested);
    println!("Routes computed:  {}", summary.routes_succeeded);
    println!("Routes failed:    {}", summary.routes_failed);
    println!("Surface layers:   {}", surface.layer_count());
    if let Some(layer) = surface.layer(ROUTE_LAYER) {
        if let LayerGeometry::Line(points) = &layer.geometry {
            println!("Route on map:     {} points", points.len());
        }
    }
    println!("Camera commands:  {}", surface.camera_commands().len());

    Ok(())
}

async fn render(mut outbound: mpsc::Receiver<String>) -> RenderSurface {
    let mut surface = RenderSurface::new();
    while let Some(text) = outbound.recv().await {
        if !surface.apply(&text) {
            tracing::warn!(message = %text, "Surface ignored message");
        }
    }
    surface
}

fn print_event(event: &SessionEvent) {
    match event {
        SessionEvent::RouteUpdated(route) => {
            println!(
                "Route: {} km, {} min ({} points)",
                route.distance_label(),
                route.duration_min,
                route.polyline.len()
            );
        }
        SessionEvent::RouteUnavailable { estimate, error } => {
            println!(
                "Route unavailable ({}); straight line {} km, {} min",
                error,
                estimate.distance_label(),
                estimate.duration_min
            );
        }
    }
}

/// Parses a JSON-lines recording.
pub fn parse_samples(path: &Path, text: &str) -> Result<Vec<PositionSample>, CliError> {
    let mut samples: Vec<PositionSample> = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let error = |reason: String| CliError::Track {
            path: path.display().to_string(),
            line: index + 1,
            reason,
        };

        let value: serde_json::Value =
            serde_json::from_str(line).map_err(|e| error(e.to_string()))?;
        let next_timestamp = samples
            .last()
            .map(|s| s.timestamp_ms + SAMPLE_SPACING_MS)
            .unwrap_or(0);
        let sample = PositionSample::from_value(&value, next_timestamp)
            .ok_or_else(|| error("no usable coordinate".to_string()))?;
        samples.push(sample);
    }

    Ok(samples)
}
