//! Wire messages between the engine and the rendering surface.
//!
//! Every message is a JSON object `{"type": ..., "data": {...}}`:
//!
//! ```text
//! engine ──► surface   UPDATE        partial state, absent keys unchanged
//!                      CENTER_ROUTE  one-shot camera fit
//! surface ──► engine   READY         surface loaded, sent once
//!                      FOLLOW_CAMERA user toggled camera follow
//! ```

use serde::{Deserialize, Deserializer, Serialize};

use crate::geo::Coordinate;

/// Engine to surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboundMessage {
    Update(UpdatePayload),
    CenterRoute(CenterRoutePayload),
}

impl OutboundMessage {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Surface to engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InboundMessage {
    Ready,
    FollowCamera(FollowCameraPayload),
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowCameraPayload {
    pub follow_camera: bool,
}

/// Vehicle marker position and orientation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleMarker {
    pub latitude: f64,
    pub longitude: f64,
    pub heading: f64,
}

impl VehicleMarker {
    pub fn new(coordinate: Coordinate, heading: f64) -> Self {
        Self {
            latitude: coordinate.latitude(),
            longitude: coordinate.longitude(),
            heading,
        }
    }
}

/// Partial surface state.
///
/// The route-related fields distinguish an absent key (`None`, state left
/// alone) from an explicit `null` (`Some(None)`, cleared).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_camera: Option<bool>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub route: Option<Option<Vec<Coordinate>>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub origin: Option<Option<Coordinate>>,
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub destination: Option<Option<Coordinate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vehicle: Option<VehicleMarker>,
}

impl UpdatePayload {
    /// Whether the surface must re-derive route geometry.
    pub fn touches_route(&self) -> bool {
        self.route.is_some() || self.origin.is_some() || self.destination.is_some()
    }
}

/// Camera fit request. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CenterRoutePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<Vec<Coordinate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Coordinate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<Coordinate>,
}

/// Present-but-null deserializes to `Some(None)`; `default` covers absence.
fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
