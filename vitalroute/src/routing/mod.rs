//! Driving routes between an origin and a destination.
//!
//! [`RouteCalculator`] debounces coordinate changes, asks a
//! [`RouteProvider`] (OSRM by default) with retry and backoff, and publishes
//! its progress on a watch channel. [`RouteEstimate`] gives a straight-line
//! fallback for when no route can be had.
//!
//! ```ignore
//! let osrm = OsrmProvider::new(http, OsrmConfig::default());
//! let calculator = RouteCalculator::new(Arc::new(osrm), RouteCalculatorConfig::default())
//!     .with_cache(RouteCache::new(store, clock));
//!
//! match calculator.compute_route(ambulance, hospital).await {
//!     RouteOutcome::Succeeded(route) => show(route.distance_label(), route.duration_min),
//!     RouteOutcome::Failed(_) => show_estimate(RouteEstimate::straight_line(ambulance, hospital)),
//!     RouteOutcome::Cancelled => {}
//! }
//! ```

mod cache;
mod calculator;
mod osrm;
mod policy;
mod types;

pub use cache::{route_cache_key, RouteCache, DEFAULT_ROUTE_CACHE_DAYS};
pub use calculator::{RouteCalculator, RouteCalculatorConfig, DEFAULT_ROUTE_DEBOUNCE};
pub use osrm::{OsrmConfig, OsrmProvider, DEFAULT_OSRM_BASE_URL};
#[cfg(test)]
pub(crate) use osrm::tests::sample_route_body;
pub use policy::{
    RetryMode, RetryPolicy, DEFAULT_BACKOFF_MULTIPLIER, DEFAULT_INITIAL_DELAY_MS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_DELAY_SECS,
};
pub use types::{
    RouteError, RouteEstimate, RouteFuture, RouteOutcome, RouteProvider, RouteResult, RouteState,
    STRAIGHT_LINE_SPEED_KMH,
};
