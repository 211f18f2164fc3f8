//! Device position samples.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::geo::{normalize_coordinate, Coordinate};

/// One reading from the vehicle's location source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionSample {
    pub coordinate: Coordinate,
    /// Sensor heading in degrees, when the device reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heading: Option<f64>,
    /// Horizontal accuracy in metres.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    /// ms since the Unix epoch.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: i64,
}

impl PositionSample {
    pub fn new(coordinate: Coordinate, timestamp_ms: i64) -> Self {
        Self {
            coordinate,
            heading: None,
            accuracy: None,
            timestamp_ms,
        }
    }

    pub fn with_heading(mut self, heading: f64) -> Self {
        self.heading = Some(heading);
        self
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Reads a loosely shaped sample, as written by device loggers.
    ///
    /// The position may sit under `coordinate`, `coords` or `position`, or
    /// be spread over the object itself with any accepted alias. `heading`
    /// and `accuracy` are optional; non-numeric values are dropped. A
    /// missing timestamp reads as `default_timestamp_ms`.
    pub fn from_value(value: &Value, default_timestamp_ms: i64) -> Option<Self> {
        let coordinate = ["coordinate", "coords", "position"]
            .iter()
            .find_map(|key| value.get(key))
            .and_then(normalize_coordinate)
            .or_else(|| normalize_coordinate(value))?;

        let number = |key: &str| value.get(key).and_then(Value::as_f64).filter(|v| v.is_finite());

        Some(Self {
            coordinate,
            heading: number("heading"),
            accuracy: number("accuracy"),
            timestamp_ms: value
                .get("timestamp")
                .and_then(Value::as_i64)
                .unwrap_or(default_timestamp_ms),
        })
    }
}
