//! Geospatial math and coordinate handling.
//!
//! Pure functions only. Nothing in here touches the network or the clock.
//!
//! # Distances
//!
//! Two Earth models are used on purpose, matching what the map surface and
//! the routing estimates expect:
//!
//! - [`haversine_distance_km`] uses a mean radius of 6371 km
//! - [`destination_point`] projects on a sphere of radius 6378137 m
//!   (WGS84 equatorial), the same one the rendering surface uses for its
//!   camera look-ahead
//!
//! # Example
//!
//! ```ignore
//! use vitalroute::geo::{destination_point, haversine_distance_km, Coordinate};
//!
//! let a = Coordinate::new(-22.0086, -47.8908)?;
//! let ahead = destination_point(a, 90.0, 140.0);
//! let km = haversine_distance_km(a, ahead);
//! ```

mod normalize;
mod types;

pub use normalize::{normalize_coordinate, normalize_coordinates, normalize_lon_lat};
pub use types::{CoordError, Coordinate, GeoBounds, MAX_LAT, MAX_LON, MIN_LAT, MIN_LON};

/// Mean Earth radius used for haversine distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Sphere radius used for forward projection.
pub const PROJECTION_RADIUS_M: f64 = 6_378_137.0;

/// Great-circle distance between two coordinates in kilometers.
///
/// Symmetric, non-negative, zero for identical points.
#[inline]
pub fn haversine_distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude().to_radians();
    let lat2 = b.latitude().to_radians();
    let dlat = (b.latitude() - a.latitude()).to_radians();
    let dlon = (b.longitude() - a.longitude()).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points.
    let c = 2.0 * h.clamp(0.0, 1.0).sqrt().asin();
    EARTH_RADIUS_KM * c
}

/// Projects `distance_m` meters from `origin` along `bearing_deg`.
///
/// Bearing 0 is north, increasing clockwise. The resulting longitude is
/// wrapped into [-180, 180]. Non-finite bearing or distance returns the
/// origin unchanged.
///
/// # Arguments
///
/// * `origin` - Start point
/// * `bearing_deg` - Direction of travel in degrees
/// * `distance_m` - Distance in meters
pub fn destination_point(origin: Coordinate, bearing_deg: f64, distance_m: f64) -> Coordinate {
    if !bearing_deg.is_finite() || !distance_m.is_finite() {
        return origin;
    }

    let angular = distance_m / PROJECTION_RADIUS_M;
    let bearing = bearing_deg.to_radians();
    let lat1 = origin.latitude().to_radians();
    let lon1 = origin.longitude().to_radians();

    let sin_lat2 =
        lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos();
    let lat2 = sin_lat2.clamp(-1.0, 1.0).asin();
    let lon2 = lon1
        + (bearing.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * sin_lat2);

    let lat_deg = lat2.to_degrees().clamp(MIN_LAT, MAX_LAT);
    let lon_deg = wrap_longitude(lon2.to_degrees());

    Coordinate::new(lat_deg, lon_deg).unwrap_or(origin)
}

/// Initial great-circle bearing from `from` to `to`, in [0, 360).
///
/// Identical points yield 0.
pub fn initial_bearing_deg(from: Coordinate, to: Coordinate) -> f64 {
    let lat1 = from.latitude().to_radians();
    let lat2 = to.latitude().to_radians();
    let dlon = (to.longitude() - from.longitude()).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    let bearing = y.atan2(x).to_degrees();
    let normalized = bearing.rem_euclid(360.0);
    // rem_euclid can return exactly 360.0 for tiny negative inputs.
    if normalized >= 360.0 {
        0.0
    } else {
        normalized
    }
}

/// Euclidean distance in raw degrees.
///
/// Not a real distance. Used only for the coarse thresholds the resolver and
/// drift detector are tuned against.
#[inline]
pub fn degree_distance(a: Coordinate, b: Coordinate) -> f64 {
    let dlat = a.latitude() - b.latitude();
    let dlon = a.longitude() - b.longitude();
    (dlat * dlat + dlon * dlon).sqrt()
}

fn wrap_longitude(lon: f64) -> f64 {
    let wrapped = (lon + 540.0).rem_euclid(360.0) - 180.0;
    wrapped.clamp(MIN_LON, MAX_LON)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    #[test]
    fn test_haversine_zero_for_same_point() {
        let a = coord(-22.0086, -47.8908);
        assert_eq!(haversine_distance_km(a, a), 0.0);
    }

    #[test]
    fn test_haversine_known_distance() {
        // São Carlos to Araraquara, roughly 35 km apart.
        let sao_carlos = coord(-22.0086, -47.8908);
        let araraquara = coord(-21.7845, -48.1780);
        let km = haversine_distance_km(sao_carlos, araraquara);
        assert!((30.0..40.0).contains(&km), "got {} km", km);
    }

    #[test]
    fn test_haversine_one_degree_latitude() {
        let km = haversine_distance_km(coord(0.0, 0.0), coord(1.0, 0.0));
        assert!((km - 111.19).abs() < 0.01, "got {} km", km);
    }

    #[test]
    fn test_destination_point_north() {
        let origin = coord(-22.0, -47.9);
        let moved = destination_point(origin, 0.0, 1000.0);

        assert!((moved.longitude() - origin.longitude()).abs() < 1e-9);
        let expected_dlat = (1000.0 / PROJECTION_RADIUS_M).to_degrees();
        assert!((moved.latitude() - origin.latitude() - expected_dlat).abs() < 1e-9);
    }

    #[test]
    fn test_destination_point_east_keeps_latitude_close() {
        let origin = coord(-22.0, -47.9);
        let moved = destination_point(origin, 90.0, 140.0);
        assert!(moved.longitude() > origin.longitude());
        assert!((moved.latitude() - origin.latitude()).abs() < 1e-6);
    }

    #[test]
    fn test_destination_point_wraps_antimeridian() {
        let origin = coord(0.0, 179.9999);
        let moved = destination_point(origin, 90.0, 1000.0);
        assert!(moved.longitude() < 0.0, "got {}", moved.longitude());
        assert!(moved.longitude() >= -180.0);
    }

    #[test]
    fn test_destination_point_non_finite_inputs() {
        let origin = coord(-22.0, -47.9);
        assert_eq!(destination_point(origin, f64::NAN, 100.0), origin);
        assert_eq!(destination_point(origin, 45.0, f64::INFINITY), origin);
    }

    #[test]
    fn test_initial_bearing_cardinal() {
        let origin = coord(-22.0, -47.9);
        let north = initial_bearing_deg(origin, coord(-21.9, -47.9));
        let east = initial_bearing_deg(origin, coord(-22.0, -47.8));
        let south = initial_bearing_deg(origin, coord(-22.1, -47.9));
        let west = initial_bearing_deg(origin, coord(-22.0, -48.0));

        assert!(north.abs() < 0.01 || (north - 360.0).abs() < 0.01);
        assert!((east - 90.0).abs() < 0.1, "east = {}", east);
        assert!((south - 180.0).abs() < 0.01);
        assert!((west - 270.0).abs() < 0.1, "west = {}", west);
    }

    #[test]
    fn test_initial_bearing_same_point() {
        let a = coord(10.0, 10.0);
        assert_eq!(initial_bearing_deg(a, a), 0.0);
    }

    #[test]
    fn test_degree_distance() {
        let d = degree_distance(coord(0.0, 0.0), coord(0.3, 0.4));
        assert!((d - 0.5).abs() < 1e-12);
    }

    proptest! {
        #[test]
        fn prop_haversine_symmetric_non_negative(
            lat1 in -90.0f64..=90.0, lon1 in -180.0f64..=180.0,
            lat2 in -90.0f64..=90.0, lon2 in -180.0f64..=180.0,
        ) {
            let a = coord(lat1, lon1);
            let b = coord(lat2, lon2);
            let ab = haversine_distance_km(a, b);
            let ba = haversine_distance_km(b, a);
            prop_assert!(ab >= 0.0);
            prop_assert!((ab - ba).abs() < 1e-9);
        }

        #[test]
        fn prop_destination_point_always_valid(
            lat in -89.0f64..=89.0, lon in -180.0f64..=180.0,
            bearing in -720.0f64..720.0, distance in 0.0f64..50_000.0,
        ) {
            let moved = destination_point(coord(lat, lon), bearing, distance);
            prop_assert!((-180.0..=180.0).contains(&moved.longitude()));
            prop_assert!((-90.0..=90.0).contains(&moved.latitude()));
        }

        #[test]
        fn prop_bearing_in_range(
            lat1 in -80.0f64..=80.0, lon1 in -179.0f64..=179.0,
            lat2 in -80.0f64..=80.0, lon2 in -179.0f64..=179.0,
        ) {
            let bearing = initial_bearing_deg(coord(lat1, lon1), coord(lat2, lon2));
            prop_assert!((0.0..360.0).contains(&bearing));
        }
    }
}
