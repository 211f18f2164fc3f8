//! Headless rendering surface.
//!
//! Implements the surface side of the protocol without drawing anything:
//! layers are kept as geometry and camera moves are recorded as commands.
//! The CLI replays position logs against it and tests assert on it.
//!
//! Parsing is deliberately lenient. Route points and endpoints go through
//! [`normalize_coordinate`], so any accepted coordinate shape works and
//! unusable points are skipped instead of failing the whole message.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::{Map, Value};

use super::protocol::{FollowCameraPayload, InboundMessage};
use crate::geo::{destination_point, normalize_coordinate, Coordinate, GeoBounds};

pub const ROUTE_LAYER: &str = "route-line";
pub const ORIGIN_LAYER: &str = "origin-marker";
pub const DESTINATION_LAYER: &str = "destination-marker";
pub const VEHICLE_LAYER: &str = "vehicle-marker";

const ROUTE_LAYERS: [&str; 3] = [ROUTE_LAYER, ORIGIN_LAYER, DESTINATION_LAYER];

/// Camera look-ahead along the vehicle heading.
pub const FOLLOW_LOOK_AHEAD_M: f64 = 140.0;
/// Lowest zoom while following.
pub const FOLLOW_MIN_ZOOM: f64 = 16.5;
pub const FOLLOW_TRANSITION: Duration = Duration::from_millis(500);
/// Zoom used when a fit has a single point.
pub const SINGLE_POINT_ZOOM: f64 = 15.0;
/// Fit padding as (sides, bottom) pixels; the bottom leaves room for the
/// status panel.
pub const FIT_PADDING: (u32, u32) = (80, 160);

const INITIAL_ZOOM: f64 = 13.0;

#[derive(Debug, Clone, PartialEq)]
pub enum LayerGeometry {
    Line(Vec<Coordinate>),
    Point {
        coordinate: Coordinate,
        heading: Option<f64>,
    },
}

/// A drawn layer. Re-setting geometry keeps the layer and bumps `revision`.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer {
    pub geometry: LayerGeometry,
    pub revision: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CameraCommand {
    FlyTo {
        center: Coordinate,
        zoom: f64,
        duration: Duration,
    },
    FitBounds {
        bounds: GeoBounds,
        padding: (u32, u32),
    },
    SetView {
        center: Coordinate,
        zoom: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraState {
    pub center: Option<Coordinate>,
    pub zoom: f64,
}

/// In-memory stand-in for the map page.
#[derive(Debug)]
pub struct RenderSurface {
    layers: HashMap<&'static str, Layer>,
    camera: CameraState,
    commands: Vec<CameraCommand>,
    follow_camera: bool,
    route: Vec<Coordinate>,
    origin: Option<Coordinate>,
    destination: Option<Coordinate>,
    layers_created: u64,
}

impl Default for RenderSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderSurface {
    pub fn new() -> Self {
        Self {
            layers: HashMap::new(),
            camera: CameraState {
                center: None,
                zoom: INITIAL_ZOOM,
            },
            commands: Vec::new(),
            follow_camera: true,
            route: Vec::new(),
            origin: None,
            destination: None,
            layers_created: 0,
        }
    }

    /// The message a freshly loaded surface sends.
    pub fn ready_message() -> String {
        encode(&InboundMessage::Ready)
    }

    /// The user dragged the map: stop following and tell the engine.
    pub fn take_manual_control(&mut self) -> String {
        self.set_follow(false)
    }

    /// Re-enables camera follow and tells the engine.
    pub fn resume_follow(&mut self) -> String {
        self.set_follow(true)
    }

    fn set_follow(&mut self, follow: bool) -> String {
        self.follow_camera = follow;
        encode(&InboundMessage::FollowCamera(FollowCameraPayload {
            follow_camera: follow,
        }))
    }

    pub fn layer(&self, id: &str) -> Option<&Layer> {
        self.layers.get(id)
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Layers ever created; upserts do not count.
    pub fn layers_created(&self) -> u64 {
        self.layers_created
    }

    pub fn has_route_layers(&self) -> bool {
        ROUTE_LAYERS.iter().any(|id| self.layers.contains_key(id))
    }

    pub fn camera(&self) -> CameraState {
        self.camera
    }

    pub fn follow_camera(&self) -> bool {
        self.follow_camera
    }

    /// Camera commands issued so far, oldest first.
    pub fn camera_commands(&self) -> &[CameraCommand] {
        &self.commands
    }

    pub fn last_camera_command(&self) -> Option<&CameraCommand> {
        self.commands.last()
    }

    /// Applies one engine message. Returns false when it was ignored.
    pub fn apply(&mut self, text: &str) -> bool {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "Surface ignoring malformed message");
                return false;
            }
        };
        let empty = Map::new();
        let data = value.get("data").and_then(Value::as_object).unwrap_or(&empty);

        match value.get("type").and_then(Value::as_str) {
            Some("UPDATE") => {
                self.apply_update(data);
                true
            }
            Some("CENTER_ROUTE") => {
                self.center_route(data);
                true
            }
            other => {
                tracing::debug!(kind = ?other, "Surface ignoring unknown message");
                false
            }
        }
    }

    fn apply_update(&mut self, data: &Map<String, Value>) {
        if let Some(follow) = data.get("followCamera").and_then(Value::as_bool) {
            self.follow_camera = follow;
        }

        let touches_route = ["route", "origin", "destination"]
            .iter()
            .any(|key| data.contains_key(*key));
        if touches_route {
            if let Some(route) = data.get("route") {
                self.route = parse_points(route);
            }
            if let Some(origin) = data.get("origin") {
                self.origin = normalize_coordinate(origin);
            }
            if let Some(destination) = data.get("destination") {
                self.destination = normalize_coordinate(destination);
            }
            self.derive_route_geometry();
        }

        if let Some(vehicle) = data.get("vehicle") {
            self.move_vehicle(vehicle);
        }
    }

    /// Route points if usable, else the endpoint pair, else nothing.
    fn derive_route_geometry(&mut self) {
        if self.route.len() >= 2 {
            let line = self.route.clone();
            let origin = self.origin.or_else(|| line.first().copied());
            let destination = self.destination.or_else(|| line.last().copied());
            self.upsert(ROUTE_LAYER, LayerGeometry::Line(line));
            self.upsert_marker(ORIGIN_LAYER, origin);
            self.upsert_marker(DESTINATION_LAYER, destination);
        } else if let (Some(origin), Some(destination)) = (self.origin, self.destination) {
            self.upsert(ROUTE_LAYER, LayerGeometry::Line(vec![origin, destination]));
            self.upsert_marker(ORIGIN_LAYER, Some(origin));
            self.upsert_marker(DESTINATION_LAYER, Some(destination));
        } else {
            for id in ROUTE_LAYERS {
                self.layers.remove(id);
            }
        }
    }

    fn move_vehicle(&mut self, vehicle: &Value) {
        let Some(position) = normalize_coordinate(vehicle) else {
            tracing::debug!("Surface ignoring unusable vehicle position");
            return;
        };
        let heading = vehicle
            .get("heading")
            .and_then(Value::as_f64)
            .filter(|h| h.is_finite())
            .unwrap_or(0.0);

        self.upsert(
            VEHICLE_LAYER,
            LayerGeometry::Point {
                coordinate: position,
                heading: Some(heading),
            },
        );

        if self.follow_camera {
            let center = destination_point(position, heading, FOLLOW_LOOK_AHEAD_M);
            let zoom = self.camera.zoom.max(FOLLOW_MIN_ZOOM);
            self.issue(CameraCommand::FlyTo {
                center,
                zoom,
                duration: FOLLOW_TRANSITION,
            });
        }
    }

    /// Explicit route, last route, endpoint pair, single point, nothing.
    fn center_route(&mut self, data: &Map<String, Value>) {
        let explicit = data.get("route").map(parse_points).unwrap_or_default();
        let origin = data.get("origin").and_then(normalize_coordinate).or(self.origin);
        let destination = data
            .get("destination")
            .and_then(normalize_coordinate)
            .or(self.destination);

        let points: Vec<Coordinate> = if explicit.len() >= 2 {
            explicit
        } else if self.route.len() >= 2 {
            self.route.clone()
        } else {
            origin.into_iter().chain(destination).collect()
        };

        match points.as_slice() {
            [] => tracing::debug!("Nothing to center on"),
            [single] => self.issue(CameraCommand::SetView {
                center: *single,
                zoom: SINGLE_POINT_ZOOM,
            }),
            many => {
                if let Some(bounds) = GeoBounds::from_coordinates(many) {
                    self.issue(CameraCommand::FitBounds {
                        bounds,
                        padding: FIT_PADDING,
                    });
                }
            }
        }
    }

    fn issue(&mut self, command: CameraCommand) {
        match &command {
            CameraCommand::FlyTo { center, zoom, .. } | CameraCommand::SetView { center, zoom } => {
                self.camera.center = Some(*center);
                self.camera.zoom = *zoom;
            }
            CameraCommand::FitBounds { bounds, .. } => {
                if let Some(center) = bounds.center() {
                    self.camera.center = Some(center);
                }
            }
        }
        self.commands.push(command);
    }

    fn upsert_marker(&mut self, id: &'static str, at: Option<Coordinate>) {
        match at {
            Some(coordinate) => self.upsert(
                id,
                LayerGeometry::Point {
                    coordinate,
                    heading: None,
                },
            ),
            None => {
                self.layers.remove(id);
            }
        }
    }

    fn upsert(&mut self, id: &'static str, geometry: LayerGeometry) {
        match self.layers.get_mut(id) {
            Some(layer) => {
                layer.geometry = geometry;
                layer.revision += 1;
            }
            None => {
                self.layers_created += 1;
                self.layers.insert(
                    id,
                    Layer {
                        geometry,
                        revision: 0,
                    },
                );
            }
        }
    }
}

fn parse_points(value: &Value) -> Vec<Coordinate> {
    value
        .as_array()
        .map(|points| points.iter().filter_map(normalize_coordinate).collect())
        .unwrap_or_default()
}

fn encode(message: &InboundMessage) -> String {
    // Unit and bool payloads always serialize.
    message.to_json().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    fn update(data: Value) -> String {
        json!({"type": "UPDATE", "data": data}).to_string()
    }

    fn center(data: Value) -> String {
        json!({"type": "CENTER_ROUTE", "data": data}).to_string()
    }

    fn route_json() -> Value {
        json!([
            {"latitude": -22.0, "longitude": -47.9},
            {"latitude": -22.05, "longitude": -47.95}
        ])
    }

    #[test]
    fn test_route_update_draws_layers() {
        let mut surface = RenderSurface::new();
        assert!(surface.apply(&update(json!({"route": route_json()}))));

        let Some(Layer {
            geometry: LayerGeometry::Line(points),
            ..
        }) = surface.layer(ROUTE_LAYER)
        else {
            panic!("route line missing");
        };
        assert_eq!(points.len(), 2);
        // Markers fall back to the line ends.
        assert!(surface.layer(ORIGIN_LAYER).is_some());
        assert!(surface.layer(DESTINATION_LAYER).is_some());
    }

    #[test]
    fn test_empty_route_removes_layers() {
        let mut surface = RenderSurface::new();
        surface.apply(&update(json!({
            "route": route_json(),
            "origin": {"latitude": -22.0, "longitude": -47.9},
            "destination": {"latitude": -22.05, "longitude": -47.95}
        })));
        assert!(surface.has_route_layers());

        surface.apply(&update(json!({"route": [], "origin": null, "destination": null})));
        assert!(!surface.has_route_layers());
    }

    #[test]
    fn test_pair_used_when_route_unusable() {
        let mut surface = RenderSurface::new();
        surface.apply(&update(json!({
            "route": [{"latitude": "bad"}],
            "origin": {"lat": -22.0, "lng": -47.9},
            "destination": [-22.05, -47.95]
        })));

        let layer = surface.layer(ROUTE_LAYER).unwrap();
        assert_eq!(
            layer.geometry,
            LayerGeometry::Line(vec![coord(-22.0, -47.9), coord(-22.05, -47.95)])
        );
    }

    #[test]
    fn test_upsert_reuses_layers() {
        let mut surface = RenderSurface::new();
        surface.apply(&update(json!({"route": route_json()})));
        let created = surface.layers_created();

        surface.apply(&update(json!({"route": route_json()})));
        assert_eq!(surface.layers_created(), created);
        assert_eq!(surface.layer(ROUTE_LAYER).unwrap().revision, 1);
    }

    #[test]
    fn test_absent_keys_leave_route_alone() {
        let mut surface = RenderSurface::new();
        surface.apply(&update(json!({"route": route_json()})));
        surface.apply(&update(json!({"followCamera": false})));
        assert_eq!(surface.layer(ROUTE_LAYER).unwrap().revision, 0);
        assert!(!surface.follow_camera());
    }

    #[test]
    fn test_follow_camera_looks_ahead() {
        let mut surface = RenderSurface::new();
        surface.apply(&update(json!({
            "vehicle": {"latitude": -22.0, "longitude": -47.9, "heading": 0.0}
        })));

        let Some(CameraCommand::FlyTo {
            center,
            zoom,
            duration,
        }) = surface.last_camera_command()
        else {
            panic!("expected fly-to");
        };
        assert!(center.latitude() > -22.0);
        assert!((center.longitude() - -47.9).abs() < 1e-9);
        let km = crate::geo::haversine_distance_km(coord(-22.0, -47.9), *center);
        assert!((km - 0.14).abs() < 0.002, "look-ahead {} km", km);
        assert_eq!(*zoom, FOLLOW_MIN_ZOOM);
        assert_eq!(*duration, FOLLOW_TRANSITION);
    }

    #[test]
    fn test_follow_keeps_higher_zoom() {
        let mut surface = RenderSurface::new();
        surface.camera.zoom = 18.0;
        surface.apply(&update(json!({
            "vehicle": {"latitude": -22.0, "longitude": -47.9, "heading": 90.0}
        })));
        assert_eq!(surface.camera().zoom, 18.0);
    }

    #[test]
    fn test_no_follow_moves_marker_only() {
        let mut surface = RenderSurface::new();
        let message = surface.take_manual_control();
        assert!(message.contains("FOLLOW_CAMERA"));

        surface.apply(&update(json!({
            "vehicle": {"latitude": -22.0, "longitude": -47.9, "heading": 0.0}
        })));
        assert!(surface.layer(VEHICLE_LAYER).is_some());
        assert!(surface.camera_commands().is_empty());
    }

    #[test]
    fn test_center_route_fallbacks() {
        let mut surface = RenderSurface::new();

        // Nothing known.
        surface.apply(&center(json!({})));
        assert!(surface.camera_commands().is_empty());

        // Single point.
        surface.apply(&center(json!({"origin": {"latitude": -22.0, "longitude": -47.9}})));
        assert_eq!(
            surface.last_camera_command(),
            Some(&CameraCommand::SetView {
                center: coord(-22.0, -47.9),
                zoom: SINGLE_POINT_ZOOM
            })
        );

        // Last known route wins over the payload endpoints.
        surface.apply(&update(json!({"route": route_json()})));
        surface.apply(&center(json!({"origin": {"latitude": -21.0, "longitude": -47.0}})));
        let Some(CameraCommand::FitBounds { bounds, padding }) = surface.last_camera_command()
        else {
            panic!("expected fit");
        };
        assert_eq!(*padding, FIT_PADDING);
        assert_eq!(bounds.max_lat, -22.0);
        assert_eq!(bounds.min_lat, -22.05);
    }

    #[test]
    fn test_ignores_unknown_and_malformed() {
        let mut surface = RenderSurface::new();
        assert!(!surface.apply("nope"));
        assert!(!surface.apply(r#"{"type":"PAN"}"#));
        assert_eq!(surface.layer_count(), 0);
    }

    #[test]
    fn test_ready_message() {
        assert_eq!(RenderSurface::ready_message(), r#"{"type":"READY"}"#);
    }
}
