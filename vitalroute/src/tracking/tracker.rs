//! Consumer side of the position stream: heading resolution and route drift.

use std::time::Duration;

use super::heading::HeadingHistory;
use super::sample::PositionSample;
use crate::geo::{degree_distance, Coordinate};

/// Movement from the last route origin that warrants a new route.
pub const DEFAULT_DRIFT_THRESHOLD_DEG: f64 = 0.0005;

/// Minimum time between route recomputations.
pub const DEFAULT_RECOMPUTE_INTERVAL: Duration = Duration::from_secs(10);

/// Decides when the vehicle has drifted far enough from the last route
/// origin to ask for a new route.
#[derive(Debug, Clone)]
pub struct DriftDetector {
    threshold_deg: f64,
    interval_ms: i64,
    last_request: Option<(Coordinate, i64)>,
}

impl Default for DriftDetector {
    fn default() -> Self {
        Self::new(DEFAULT_DRIFT_THRESHOLD_DEG, DEFAULT_RECOMPUTE_INTERVAL)
    }
}

impl DriftDetector {
    pub fn new(threshold_deg: f64, interval: Duration) -> Self {
        Self {
            threshold_deg,
            interval_ms: i64::try_from(interval.as_millis()).unwrap_or(i64::MAX),
            last_request: None,
        }
    }

    /// Whether a route should be requested from `position` at `now_ms`.
    pub fn should_recompute(&self, position: Coordinate, now_ms: i64) -> bool {
        match self.last_request {
            None => true,
            Some((origin, requested_at)) => {
                degree_distance(origin, position) > self.threshold_deg
                    && now_ms.saturating_sub(requested_at) >= self.interval_ms
            }
        }
    }

    /// Records that a route was requested from `origin`.
    pub fn mark_requested(&mut self, origin: Coordinate, now_ms: i64) {
        self.last_request = Some((origin, now_ms));
    }

    /// Origin of the last requested route.
    pub fn last_origin(&self) -> Option<Coordinate> {
        self.last_request.map(|(origin, _)| origin)
    }

    /// Forgets the last request so the next sample triggers one.
    pub fn reset(&mut self) {
        self.last_request = None;
    }
}

/// A sample after heading resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackedPosition {
    pub coordinate: Coordinate,
    pub heading: f64,
    /// A new route should be requested from here.
    pub recompute_route: bool,
}

/// Applies samples in arrival order.
#[derive(Debug, Default)]
pub struct PositionTracker {
    history: HeadingHistory,
    last_heading: Option<f64>,
    drift: DriftDetector,
}

impl PositionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_drift(mut self, drift: DriftDetector) -> Self {
        self.drift = drift;
        self
    }

    /// Resolves heading and drift for `sample`.
    ///
    /// Heading is the sensor value when finite and non-negative, else the
    /// one derived from movement, else the last known one, else 0. When
    /// `recompute_route` is set the request is already marked as made.
    pub fn apply(&mut self, sample: &PositionSample) -> TrackedPosition {
        self.history.record(sample.coordinate);

        let heading = sample
            .heading
            .filter(|h| h.is_finite() && *h >= 0.0)
            .map(|h| h % 360.0)
            .or_else(|| self.history.derived_heading())
            .or(self.last_heading)
            .unwrap_or(0.0);
        self.last_heading = Some(heading);

        let recompute_route = self
            .drift
            .should_recompute(sample.coordinate, sample.timestamp_ms);
        if recompute_route {
            self.drift
                .mark_requested(sample.coordinate, sample.timestamp_ms);
        }

        TrackedPosition {
            coordinate: sample.coordinate,
            heading,
            recompute_route,
        }
    }

    pub fn last_heading(&self) -> Option<f64> {
        self.last_heading
    }

    pub fn last_route_origin(&self) -> Option<Coordinate> {
        self.drift.last_origin()
    }

    /// Clears history so the next sample starts fresh.
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_heading = None;
        self.drift.reset();
    }
}
