//! Route types shared by providers, the cache and the calculator.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::geo::{haversine_distance_km, Coordinate};
use crate::provider::ProviderError;

/// Speed assumed for straight-line arrival estimates.
pub const STRAIGHT_LINE_SPEED_KMH: f64 = 50.0;

/// Errors from a route request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteError {
    /// Network failure, non-2xx status, timeout or unreadable body.
    #[error("Routing request failed: {0}")]
    Transport(#[from] ProviderError),

    /// The service answered but found no route.
    #[error("No route between the given points")]
    NoRoute,

    /// The request was superseded or shut down. Never reported as a failure.
    #[error("Route request cancelled")]
    Cancelled,
}

impl RouteError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, RouteError::Transport(_))
    }
}

/// A computed driving route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteResult {
    /// Route geometry in `(lat, lon)` order.
    pub polyline: Vec<Coordinate>,
    /// Kilometres, rounded to one decimal.
    pub distance_km: f64,
    /// Whole minutes, rounded up.
    pub duration_min: u32,
}

impl RouteResult {
    /// Builds a result from raw metres and seconds.
    pub fn from_raw(polyline: Vec<Coordinate>, meters: f64, seconds: f64) -> Self {
        Self {
            polyline,
            distance_km: round_one_decimal(meters / 1000.0),
            duration_min: (seconds.max(0.0) / 60.0).ceil() as u32,
        }
    }

    /// Distance formatted with one decimal, e.g. `"15.0"`.
    pub fn distance_label(&self) -> String {
        format!("{:.1}", self.distance_km)
    }
}

/// Outcome of [`RouteCalculator::compute_route`](super::RouteCalculator::compute_route).
#[derive(Debug, Clone, PartialEq)]
pub enum RouteOutcome {
    Succeeded(RouteResult),
    /// Superseded by a newer pair or shut down. Carries no result.
    Cancelled,
    Failed(RouteError),
}

impl RouteOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RouteOutcome::Cancelled)
    }
}

/// Observable calculator state.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RouteState {
    #[default]
    Idle,
    Debouncing,
    Requesting {
        attempt: u32,
    },
    Retrying {
        attempt: u32,
        delay: Duration,
    },
    Succeeded,
    Cancelled,
    Failed(RouteError),
}

/// Straight-line distance and time, shown when routing fails.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouteEstimate {
    pub distance_km: f64,
    pub duration_min: u32,
}

impl RouteEstimate {
    /// Haversine distance at [`STRAIGHT_LINE_SPEED_KMH`], at least one minute.
    pub fn straight_line(from: Coordinate, to: Coordinate) -> Self {
        let km = haversine_distance_km(from, to);
        let minutes = (km / STRAIGHT_LINE_SPEED_KMH * 60.0).ceil().max(1.0);
        Self {
            distance_km: round_one_decimal(km),
            duration_min: minutes as u32,
        }
    }

    pub fn distance_label(&self) -> String {
        format!("{:.1}", self.distance_km)
    }
}

fn round_one_decimal(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Boxed future returned by [`RouteProvider::route`].
pub type RouteFuture<'a> = Pin<Box<dyn Future<Output = Result<RouteResult, RouteError>> + Send + 'a>>;

/// A driving-route backend.
pub trait RouteProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Requests a route. Must honour `token` and report a timeout as
    /// [`RouteError::Transport`].
    fn route<'a>(
        &'a self,
        origin: Coordinate,
        destination: Coordinate,
        token: &'a CancellationToken,
    ) -> RouteFuture<'a>;
}
