//! Core geographic types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Minimum valid latitude in degrees.
pub const MIN_LAT: f64 = -90.0;

/// Maximum valid latitude in degrees.
pub const MAX_LAT: f64 = 90.0;

/// Minimum valid longitude in degrees.
pub const MIN_LON: f64 = -180.0;

/// Maximum valid longitude in degrees.
pub const MAX_LON: f64 = 180.0;

/// Errors raised when constructing a coordinate from raw values.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CoordError {
    #[error("Invalid latitude: {0} (must be finite and within -90..=90)")]
    InvalidLatitude(f64),

    #[error("Invalid longitude: {0} (must be finite and within -180..=180)")]
    InvalidLongitude(f64),
}

/// A validated WGS84 position.
///
/// Both components are finite and within range. The only ways to obtain one
/// are [`Coordinate::new`], deserialization (which runs the same checks) and
/// the normalization functions in [`crate::geo`].
///
/// Serializes as `{"latitude": .., "longitude": ..}`, which is also the shape
/// the map surface protocol uses.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = CoordError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Coordinate::new(raw.latitude, raw.longitude)
    }
}

impl Coordinate {
    /// Creates a coordinate after validating both components.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordError> {
        if !latitude.is_finite() || !(MIN_LAT..=MAX_LAT).contains(&latitude) {
            return Err(CoordError::InvalidLatitude(latitude));
        }
        if !longitude.is_finite() || !(MIN_LON..=MAX_LON).contains(&longitude) {
            return Err(CoordError::InvalidLongitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Builds a coordinate from compile-time constants already known to be valid.
    pub(crate) const fn from_constants(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Creates a coordinate from a GeoJSON-ordered `(lon, lat)` pair.
    pub fn from_lon_lat(longitude: f64, latitude: f64) -> Result<Self, CoordError> {
        Self::new(latitude, longitude)
    }

    /// Latitude in degrees.
    #[inline]
    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    /// Longitude in degrees.
    #[inline]
    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Returns `(lat, lon)`.
    #[inline]
    pub fn lat_lon(&self) -> (f64, f64) {
        (self.latitude, self.longitude)
    }

    /// Key with both components rounded to `decimals` places.
    ///
    /// Used for de-duplicating candidates and building cache keys.
    pub fn rounded_key(&self, decimals: usize) -> String {
        format!(
            "{:.*},{:.*}",
            decimals, self.latitude, decimals, self.longitude
        )
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

/// Axis-aligned geographic bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    pub min_lat: f64,
    pub min_lon: f64,
    pub max_lat: f64,
    pub max_lon: f64,
}

impl GeoBounds {
    /// Creates bounds from explicit edges.
    pub fn new(min_lat: f64, min_lon: f64, max_lat: f64, max_lon: f64) -> Self {
        Self {
            min_lat,
            min_lon,
            max_lat,
            max_lon,
        }
    }

    /// Smallest bounds containing every coordinate, or `None` if empty.
    pub fn from_coordinates<'a, I>(coords: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Coordinate>,
    {
        let mut iter = coords.into_iter();
        let first = iter.next()?;
        let mut bounds = Self::new(
            first.latitude(),
            first.longitude(),
            first.latitude(),
            first.longitude(),
        );
        for coord in iter {
            bounds.extend(coord);
        }
        Some(bounds)
    }

    /// Grows the bounds to include `coord`.
    pub fn extend(&mut self, coord: &Coordinate) {
        self.min_lat = self.min_lat.min(coord.latitude());
        self.min_lon = self.min_lon.min(coord.longitude());
        self.max_lat = self.max_lat.max(coord.latitude());
        self.max_lon = self.max_lon.max(coord.longitude());
    }

    /// Whether `coord` lies inside (edges inclusive).
    pub fn contains(&self, coord: &Coordinate) -> bool {
        (self.min_lat..=self.max_lat).contains(&coord.latitude())
            && (self.min_lon..=self.max_lon).contains(&coord.longitude())
    }

    /// Center point of the bounds, or `None` when the edges are not valid
    /// coordinates.
    pub fn center(&self) -> Option<Coordinate> {
        Coordinate::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lon + self.max_lon) / 2.0,
        )
        .ok()
    }

    /// `west,south,east,north` string as used by geocoder viewbox filters.
    pub fn to_viewbox(&self) -> String {
        format!(
            "{:.4},{:.4},{:.4},{:.4}",
            self.min_lon, self.min_lat, self.max_lon, self.max_lat
        )
    }
}
