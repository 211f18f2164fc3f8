//! Live vehicle tracking.
//!
//! - [`PositionSample`]: one device reading
//! - [`HeadingHistory`]: heading derived from recent movement
//! - [`PositionTracker`] / [`DriftDetector`]: heading resolution and the
//!   decision to re-route
//! - [`TrackingSession`]: the loop that ties positions, routing and the map
//!   bridge together

mod heading;
mod sample;
mod session;
mod tracker;

pub use heading::{HeadingConfig, HeadingHistory};
pub use sample::PositionSample;
pub use session::{SessionEvent, SessionSummary, TrackingSession};
pub use tracker::{
    DriftDetector, PositionTracker, TrackedPosition, DEFAULT_DRIFT_THRESHOLD_DEG,
    DEFAULT_RECOMPUTE_INTERVAL,
};
