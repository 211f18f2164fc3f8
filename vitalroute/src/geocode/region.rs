//! Service region the resolver is tuned for.

use crate::geo::{Coordinate, GeoBounds};

/// Default region center (São Carlos, SP).
pub const DEFAULT_CENTER: Coordinate = Coordinate::from_constants(-22.0086, -47.8908);

/// Default bounded-search box as `(min_lat, min_lon, max_lat, max_lon)`.
pub const DEFAULT_BOUNDS: (f64, f64, f64, f64) = (-22.0470, -47.9530, -21.9706, -47.8298);

/// Degree distance from the center beyond which candidates are penalised.
pub const DEFAULT_FAR_THRESHOLD_DEG: f64 = 0.15;

/// A service region: its name, bounding box and fallback center.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Lowercase city name as it appears in addresses.
    pub name: String,
    /// Lowercase state abbreviation.
    pub state: String,
    /// Returned when nothing better is found.
    pub center: Coordinate,
    /// Box used to bound provider searches.
    pub bounds: GeoBounds,
    /// Candidates farther than this (in degrees) lose points.
    pub far_threshold_deg: f64,
}

impl Default for Region {
    fn default() -> Self {
        let (min_lat, min_lon, max_lat, max_lon) = DEFAULT_BOUNDS;
        Self {
            name: "são carlos".to_string(),
            state: "sp".to_string(),
            center: DEFAULT_CENTER,
            bounds: GeoBounds::new(min_lat, min_lon, max_lat, max_lon),
            far_threshold_deg: DEFAULT_FAR_THRESHOLD_DEG,
        }
    }
}

impl Region {
    /// `"<name>, <state>"`, appended to addresses missing the city.
    pub fn suffix(&self) -> String {
        format!("{}, {}", self.name, self.state)
    }
}
