//! Live tracking loop.
//!
//! Joins the position stream, the route calculator and the map bridge:
//!
//! ```text
//!  positions ──► PositionTracker ──► bridge.push_position   (every sample)
//!                      │
//!                      └─ drifted? ──► spawn compute_route ──┐
//!                                                            │
//!  route results ◄───────────────────────────────────────────┘
//!      ├─ Succeeded ──► bridge.push_route + request_fit
//!      ├─ Failed    ──► SessionEvent::RouteUnavailable { estimate }
//!      └─ Cancelled ──► ignored
//!
//!  surface messages ──► bridge.handle_inbound
//! ```
//!
//! Route work runs on its own task so positions are never held up by a slow
//! or retrying routing provider.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

use super::sample::PositionSample;
use super::tracker::{PositionTracker, TrackedPosition};
use crate::bridge::MapSyncBridge;
use crate::geo::Coordinate;
use crate::routing::{RouteCalculator, RouteError, RouteEstimate, RouteOutcome, RouteResult};

/// Capacity of the session's internal and event channels.
const CHANNEL_CAPACITY: usize = 16;

/// Something a caller may want to show beyond the map.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    RouteUpdated(RouteResult),
    RouteUnavailable {
        estimate: RouteEstimate,
        error: RouteError,
    },
}

/// Counters reported when the session ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub positions: u64,
    pub routes_requested: u64,
    pub routes_succeeded: u64,
    pub routes_failed: u64,
}

struct RouteReply {
    origin: Coordinate,
    outcome: RouteOutcome,
}

/// Tracks one vehicle toward one destination.
pub struct TrackingSession {
    calculator: Arc<RouteCalculator>,
    bridge: Arc<MapSyncBridge>,
    destination: Coordinate,
    tracker: PositionTracker,
    events: Option<mpsc::Sender<SessionEvent>>,
    shutdown: CancellationToken,
}

impl TrackingSession {
    pub fn new(
        calculator: Arc<RouteCalculator>,
        bridge: Arc<MapSyncBridge>,
        destination: Coordinate,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            calculator,
            bridge,
            destination,
            tracker: PositionTracker::new(),
            events: None,
            shutdown,
        }
    }

    pub fn with_tracker(mut self, tracker: PositionTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// Subscribes to session events.
    pub fn events(&mut self) -> mpsc::Receiver<SessionEvent> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        self.events = Some(tx);
        rx
    }

    /// Runs until shutdown or until the position stream closes.
    ///
    /// A closed inbound stream only stops inbound handling.
    pub async fn run(
        mut self,
        mut positions: mpsc::Receiver<PositionSample>,
        mut inbound: mpsc::Receiver<String>,
    ) -> SessionSummary {
        let (route_tx, mut route_rx) = mpsc::channel::<RouteReply>(CHANNEL_CAPACITY);
        let mut summary = SessionSummary::default();
        let mut inbound_open = true;

        tracing::info!(destination = %self.destination, "Tracking session started");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    tracing::debug!("Tracking session shutting down");
                    break;
                }

                Some(reply) = route_rx.recv() => {
                    self.on_route(reply, &mut summary);
                }

                message = inbound.recv(), if inbound_open => match message {
                    Some(text) => {
                        self.bridge.handle_inbound(&text);
                    }
                    None => inbound_open = false,
                },

                sample = positions.recv() => match sample {
                    Some(sample) => {
                        summary.positions += 1;
                        let tracked = self.tracker.apply(&sample);
                        self.bridge.push_position(tracked.coordinate, tracked.heading);
                        if tracked.recompute_route {
                            summary.routes_requested += 1;
                            self.spawn_route(tracked, route_tx.clone());
                        }
                    }
                    None => {
                        tracing::debug!("Position stream closed");
                        break;
                    }
                },
            }
        }

        self.calculator.cancel();
        tracing::info!(
            positions = summary.positions,
            routes_requested = summary.routes_requested,
            routes_succeeded = summary.routes_succeeded,
            routes_failed = summary.routes_failed,
            "Tracking session ended"
        );
        summary
    }

    fn spawn_route(&self, tracked: TrackedPosition, reply_tx: mpsc::Sender<RouteReply>) {
        let calculator = Arc::clone(&self.calculator);
        let origin = tracked.coordinate;
        let destination = self.destination;
        tokio::spawn(async move {
            let outcome = calculator.compute_route(origin, destination).await;
            // The session may already be gone.
            let _ = reply_tx.send(RouteReply { origin, outcome }).await;
        });
    }

    fn on_route(&self, reply: RouteReply, summary: &mut SessionSummary) {
        match reply.outcome {
            RouteOutcome::Succeeded(route) => {
                summary.routes_succeeded += 1;
                tracing::debug!(
                    distance_km = route.distance_km,
                    duration_min = route.duration_min,
                    "Route updated"
                );
                self.bridge.push_route(&route, reply.origin, self.destination);
                self.bridge.request_fit();
                self.emit(SessionEvent::RouteUpdated(route));
            }
            RouteOutcome::Failed(error) => {
                summary.routes_failed += 1;
                let estimate = RouteEstimate::straight_line(reply.origin, self.destination);
                tracing::warn!(
                    error = %error,
                    estimate_km = estimate.distance_km,
                    "Route unavailable, showing straight-line estimate"
                );
                self.bridge.set_endpoints(reply.origin, self.destination);
                self.emit(SessionEvent::RouteUnavailable { estimate, error });
            }
            RouteOutcome::Cancelled => {}
        }
    }

    fn emit(&self, event: SessionEvent) {
        let Some(events) = &self.events else {
            return;
        };
        if let Err(TrySendError::Full(_)) = events.try_send(event) {
            tracing::warn!("Session event channel full, dropping event");
        }
    }
}
