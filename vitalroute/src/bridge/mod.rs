//! Engine side of the map surface link.
//!
//! The surface is driven purely by messages (see [`protocol`]). The bridge
//! keeps a [`TrackingState`] mirror of what the surface should show and
//! gates outbound traffic on the surface's `READY`.
//!
//! # Before READY
//!
//! With [`PrereadyPolicy::Coalesce`] (the default) pushes only mutate the
//! mirror. When `READY` arrives the bridge sends one full `UPDATE` snapshot,
//! followed by a `CENTER_ROUTE` if a fit was requested in the meantime.
//! [`PrereadyPolicy::Drop`] discards everything sent before `READY`.
//!
//! # Backpressure
//!
//! The outbound channel is bounded. Post-READY `UPDATE`s are deltas, so a
//! message that does not fit marks the mirror for resync instead of being
//! retried. The next dispatch sends one full snapshot of the mirror (route,
//! endpoints, vehicle and camera mode) in place of its delta, followed by
//! any `CENTER_ROUTE` that was dropped.
//!
//! ```ignore
//! let (bridge, mut outbound) = MapSyncBridge::new(BridgeConfig::default());
//! bridge.push_position(ambulance, 90.0);
//! bridge.handle_inbound(r#"{"type":"READY"}"#);
//! let snapshot = outbound.recv().await;
//! ```

pub mod protocol;
mod surface;

pub use protocol::{
    CenterRoutePayload, FollowCameraPayload, InboundMessage, OutboundMessage, UpdatePayload,
    VehicleMarker,
};
pub use surface::{
    CameraCommand, CameraState, Layer, LayerGeometry, RenderSurface, DESTINATION_LAYER,
    FIT_PADDING, FOLLOW_LOOK_AHEAD_M, FOLLOW_MIN_ZOOM, FOLLOW_TRANSITION, ORIGIN_LAYER,
    ROUTE_LAYER, SINGLE_POINT_ZOOM, VEHICLE_LAYER,
};

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::geo::Coordinate;
use crate::routing::RouteResult;

/// Default outbound channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// What happens to pushes made before the surface is ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrereadyPolicy {
    /// Keep the latest state and send it as one snapshot on `READY`.
    #[default]
    Coalesce,
    /// Discard.
    Drop,
}

/// Bridge configuration.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    pub channel_capacity: usize,
    pub preready: PrereadyPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            preready: PrereadyPolicy::default(),
        }
    }
}

impl BridgeConfig {
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    pub fn with_preready(mut self, policy: PrereadyPolicy) -> Self {
        self.preready = policy;
        self
    }
}

/// Engine-side mirror of the surface.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingState {
    pub follow_camera: bool,
    pub last_route: Option<Vec<Coordinate>>,
    pub last_position: Option<VehicleMarker>,
    pub origin: Option<Coordinate>,
    pub destination: Option<Coordinate>,
    pub renderer_ready: bool,
    /// A camera fit is owed to the surface once it is ready.
    pub fit_requested: bool,
    /// A message was dropped; the surface needs a full snapshot.
    pub resync_pending: bool,
}

impl Default for TrackingState {
    fn default() -> Self {
        Self {
            follow_camera: true,
            last_route: None,
            last_position: None,
            origin: None,
            destination: None,
            renderer_ready: false,
            fit_requested: false,
            resync_pending: false,
        }
    }
}

impl TrackingState {
    fn snapshot(&self) -> UpdatePayload {
        let has_route_state =
            self.last_route.is_some() || self.origin.is_some() || self.destination.is_some();
        UpdatePayload {
            follow_camera: Some(self.follow_camera),
            route: has_route_state.then(|| self.last_route.clone()),
            origin: has_route_state.then_some(self.origin),
            destination: has_route_state.then_some(self.destination),
            vehicle: self.last_position,
        }
    }

    /// Snapshot that also clears route layers the surface may still show.
    fn resync_payload(&self) -> UpdatePayload {
        UpdatePayload {
            follow_camera: Some(self.follow_camera),
            route: Some(self.last_route.clone()),
            origin: Some(self.origin),
            destination: Some(self.destination),
            vehicle: self.last_position,
        }
    }

    fn fit_payload(&self) -> CenterRoutePayload {
        CenterRoutePayload {
            route: self.last_route.clone(),
            origin: self.origin,
            destination: self.destination,
        }
    }
}

/// Sends engine state to the surface and interprets its replies.
#[derive(Debug)]
pub struct MapSyncBridge {
    state: Mutex<TrackingState>,
    outbound: mpsc::Sender<String>,
    preready: PrereadyPolicy,
}

impl MapSyncBridge {
    /// Creates a bridge and the receiving end of its outbound channel.
    pub fn new(config: BridgeConfig) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let bridge = Self {
            state: Mutex::new(TrackingState::default()),
            outbound: tx,
            preready: config.preready,
        };
        (bridge, rx)
    }

    pub fn is_ready(&self) -> bool {
        self.state.lock().renderer_ready
    }

    /// Copy of the current mirror.
    pub fn state(&self) -> TrackingState {
        self.state.lock().clone()
    }

    /// Moves the vehicle marker.
    pub fn push_position(&self, coordinate: Coordinate, heading: f64) {
        let marker = VehicleMarker::new(coordinate, heading);
        let payload = {
            let mut state = self.state.lock();
            state.last_position = Some(marker);
            UpdatePayload {
                follow_camera: Some(state.follow_camera),
                vehicle: Some(marker),
                ..Default::default()
            }
        };
        self.dispatch(OutboundMessage::Update(payload));
    }

    /// Shows a computed route between its endpoints.
    pub fn push_route(&self, route: &RouteResult, origin: Coordinate, destination: Coordinate) {
        let payload = {
            let mut state = self.state.lock();
            state.last_route = Some(route.polyline.clone());
            state.origin = Some(origin);
            state.destination = Some(destination);
            UpdatePayload {
                route: Some(Some(route.polyline.clone())),
                origin: Some(Some(origin)),
                destination: Some(Some(destination)),
                ..Default::default()
            }
        };
        self.dispatch(OutboundMessage::Update(payload));
    }

    /// Shows the endpoints without route geometry.
    pub fn set_endpoints(&self, origin: Coordinate, destination: Coordinate) {
        let payload = {
            let mut state = self.state.lock();
            state.last_route = None;
            state.origin = Some(origin);
            state.destination = Some(destination);
            UpdatePayload {
                route: Some(None),
                origin: Some(Some(origin)),
                destination: Some(Some(destination)),
                ..Default::default()
            }
        };
        self.dispatch(OutboundMessage::Update(payload));
    }

    /// Removes every route layer from the surface.
    pub fn clear_route(&self) {
        {
            let mut state = self.state.lock();
            state.last_route = None;
            state.origin = None;
            state.destination = None;
            state.fit_requested = false;
        }
        self.dispatch(OutboundMessage::Update(UpdatePayload {
            route: Some(Some(Vec::new())),
            origin: Some(None),
            destination: Some(None),
            ..Default::default()
        }));
    }

    pub fn set_follow_camera(&self, follow: bool) {
        self.state.lock().follow_camera = follow;
        self.dispatch(OutboundMessage::Update(UpdatePayload {
            follow_camera: Some(follow),
            ..Default::default()
        }));
    }

    /// Asks the surface to fit the camera around the current route.
    pub fn request_fit(&self) {
        let payload = {
            let mut state = self.state.lock();
            if !state.renderer_ready {
                if self.preready == PrereadyPolicy::Coalesce {
                    state.fit_requested = true;
                }
                return;
            }
            state.fit_payload()
        };
        self.dispatch(OutboundMessage::CenterRoute(payload));
    }

    /// Interprets one message from the surface.
    ///
    /// Malformed messages are logged and ignored.
    pub fn handle_inbound(&self, text: &str) -> Option<InboundMessage> {
        let message = match InboundMessage::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring malformed surface message");
                return None;
            }
        };

        match &message {
            InboundMessage::Ready => self.on_ready(),
            InboundMessage::FollowCamera(payload) => {
                self.state.lock().follow_camera = payload.follow_camera;
                tracing::debug!(follow = payload.follow_camera, "Surface changed camera follow");
            }
        }
        Some(message)
    }

    fn on_ready(&self) {
        let pending = {
            let mut state = self.state.lock();
            if state.renderer_ready {
                tracing::debug!("Duplicate READY ignored");
                return;
            }
            state.renderer_ready = true;
            match self.preready {
                PrereadyPolicy::Coalesce => {
                    let fit = std::mem::take(&mut state.fit_requested).then(|| state.fit_payload());
                    Some((state.snapshot(), fit))
                }
                PrereadyPolicy::Drop => None,
            }
        };

        tracing::info!("Rendering surface ready");
        if let Some((snapshot, fit)) = pending {
            self.send(&OutboundMessage::Update(snapshot));
            if let Some(fit) = fit {
                self.send(&OutboundMessage::CenterRoute(fit));
            }
        }
    }

    /// Sends when ready; before that the mirror already holds the change.
    ///
    /// After a dropped message the mirror snapshot replaces `message`.
    fn dispatch(&self, message: OutboundMessage) {
        let resync = {
            let mut state = self.state.lock();
            if !state.renderer_ready {
                tracing::trace!(policy = ?self.preready, "Surface not ready, holding message");
                return;
            }
            if state.resync_pending {
                state.resync_pending = false;
                let wants_fit = std::mem::take(&mut state.fit_requested)
                    || matches!(message, OutboundMessage::CenterRoute(_));
                Some((state.resync_payload(), wants_fit.then(|| state.fit_payload())))
            } else {
                None
            }
        };

        let Some((snapshot, fit)) = resync else {
            self.send(&message);
            return;
        };

        tracing::debug!("Resynchronizing surface after dropped messages");
        if self.send(&OutboundMessage::Update(snapshot)) {
            if let Some(fit) = fit {
                self.send(&OutboundMessage::CenterRoute(fit));
            }
        } else if fit.is_some() {
            self.state.lock().fit_requested = true;
        }
    }

    /// Returns whether the message was queued.
    fn send(&self, message: &OutboundMessage) -> bool {
        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode surface message");
                return false;
            }
        };
        match self.outbound.try_send(text) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!("Surface channel full, resynchronizing on next send");
                let mut state = self.state.lock();
                state.resync_pending = true;
                if matches!(message, OutboundMessage::CenterRoute(_)) {
                    state.fit_requested = true;
                }
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::debug!("Surface channel closed");
                false
            }
        }
    }
}
