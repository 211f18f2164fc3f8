//! Coordinate normalization from loosely-typed JSON shapes.
//!
//! Positions reach the engine from several producers (geocoders, the routing
//! provider, the device, the map surface) and each has its own idea of what a
//! point looks like. Everything funnels through here so that the rest of the
//! crate only ever sees a validated [`Coordinate`].
//!
//! Accepted shapes:
//!
//! - `[lat, lon]` two-element arrays
//! - objects keyed by `latitude`/`lat`/`y` and `longitude`/`lng`/`lon`/`x`
//! - GeoJSON points `{"type": "Point", "coordinates": [lon, lat]}`
//! - `[lon, lat]` arrays, only through [`normalize_lon_lat`]
//!
//! Numeric strings are coerced. Anything else, including an object that gives
//! two different values for the same axis, yields `None`.

use serde_json::{Map, Value};

use super::Coordinate;

const LATITUDE_KEYS: &[&str] = &["latitude", "lat", "y"];
const LONGITUDE_KEYS: &[&str] = &["longitude", "lng", "lon", "x"];

/// Normalizes an arbitrary JSON value into a coordinate.
///
/// Two-element arrays are read in `[lat, lon]` order. Never panics.
pub fn normalize_coordinate(value: &Value) -> Option<Coordinate> {
    match value {
        Value::Array(items) => pair(items).and_then(|(lat, lon)| Coordinate::new(lat, lon).ok()),
        Value::Object(map) => from_object(map),
        _ => None,
    }
}

/// Normalizes a GeoJSON-ordered `[lon, lat]` array.
pub fn normalize_lon_lat(value: &Value) -> Option<Coordinate> {
    match value {
        Value::Array(items) => {
            pair(items).and_then(|(lon, lat)| Coordinate::from_lon_lat(lon, lat).ok())
        }
        _ => None,
    }
}

/// Normalizes every element, dropping the ones that do not parse.
pub fn normalize_coordinates(values: &[Value]) -> Vec<Coordinate> {
    values.iter().filter_map(normalize_coordinate).collect()
}

fn pair(items: &[Value]) -> Option<(f64, f64)> {
    match items {
        [first, second] => Some((coerce(first)?, coerce(second)?)),
        _ => None,
    }
}

fn from_object(map: &Map<String, Value>) -> Option<Coordinate> {
    if map.get("type").and_then(Value::as_str) == Some("Point") {
        return map.get("coordinates").and_then(normalize_lon_lat);
    }

    let latitude = axis(map, LATITUDE_KEYS)?;
    let longitude = axis(map, LONGITUDE_KEYS)?;
    Coordinate::new(latitude, longitude).ok()
}

/// Reads one axis through its aliases.
///
/// A present alias that does not coerce, or two aliases that disagree, make
/// the whole object ambiguous.
fn axis(map: &Map<String, Value>, aliases: &[&str]) -> Option<f64> {
    let mut found: Option<f64> = None;
    for alias in aliases {
        let Some(raw) = map.get(*alias) else {
            continue;
        };
        let value = coerce(raw)?;
        match found {
            Some(previous) if previous != value => return None,
            _ => found = Some(value),
        }
    }
    found
}

fn coerce(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}
