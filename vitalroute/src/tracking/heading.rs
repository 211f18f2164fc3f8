//! Position history and derived heading.
//!
//! Many devices report no heading, or a negative one while stationary. The
//! history keeps the last few positions so a heading can be derived from
//! movement instead.
//!
//! # Design
//!
//! - Stores the last 10 positions
//! - Heading is the initial bearing from the oldest to the newest position
//! - No heading is derived until the vehicle has moved more than ~0.0001°
//!   (about 11 m), below which GPS jitter dominates

use std::collections::VecDeque;

use crate::geo::{degree_distance, initial_bearing_deg, Coordinate};

/// Default maximum positions to retain.
const DEFAULT_MAX_SAMPLES: usize = 10;

/// Minimum movement (in degrees) before a heading is derived.
const MIN_MOVEMENT_FOR_HEADING_DEG: f64 = 0.0001;

/// Configuration for [`HeadingHistory`].
#[derive(Debug, Clone)]
pub struct HeadingConfig {
    /// Maximum positions to retain.
    pub max_samples: usize,
    /// Minimum oldest-to-newest distance for a heading.
    pub min_movement_deg: f64,
}

impl Default for HeadingConfig {
    fn default() -> Self {
        Self {
            max_samples: DEFAULT_MAX_SAMPLES,
            min_movement_deg: MIN_MOVEMENT_FOR_HEADING_DEG,
        }
    }
}

/// Recent positions, oldest first.
///
/// ```ignore
/// let mut history = HeadingHistory::new();
/// history.record(position);
/// if let Some(heading) = history.derived_heading() {
///     println!("Derived heading: {:.1}°", heading);
/// }
/// ```
#[derive(Debug)]
pub struct HeadingHistory {
    samples: VecDeque<Coordinate>,
    config: HeadingConfig,
}

impl Default for HeadingHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadingHistory {
    pub fn new() -> Self {
        Self::with_config(HeadingConfig::default())
    }

    pub fn with_config(config: HeadingConfig) -> Self {
        Self {
            samples: VecDeque::with_capacity(config.max_samples),
            config,
        }
    }

    /// Appends a position, dropping the oldest beyond capacity.
    pub fn record(&mut self, position: Coordinate) {
        self.samples.push_back(position);
        while self.samples.len() > self.config.max_samples.max(2) {
            self.samples.pop_front();
        }
    }

    /// Bearing from the oldest to the newest position, in [0, 360).
    ///
    /// `None` with fewer than two samples or too little movement.
    pub fn derived_heading(&self) -> Option<f64> {
        if self.samples.len() < 2 {
            return None;
        }
        let oldest = *self.samples.front()?;
        let newest = *self.samples.back()?;

        if degree_distance(oldest, newest) <= self.config.min_movement_deg {
            return None;
        }
        Some(initial_bearing_deg(oldest, newest))
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn latest_position(&self) -> Option<Coordinate> {
        self.samples.back().copied()
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }
}
