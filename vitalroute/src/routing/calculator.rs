//! Debounced, retrying route computation.
//!
//! # State Machine
//!
//! ```text
//!  Idle ──► Debouncing ──► Requesting ──► Succeeded
//!               ▲              │  ▲
//!               │              ▼  │
//!               │           Retrying ──(attempts exhausted)──► Failed
//!               │
//!        new pair (previous request ──► Cancelled)
//! ```
//!
//! Only the newest origin/destination pair is ever computed: a call made
//! while another is debouncing, requesting or backing off cancels it, and the
//! cancelled call returns [`RouteOutcome::Cancelled`]. A result that arrives
//! after its call was superseded is discarded.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::cache::RouteCache;
use super::policy::RetryPolicy;
use super::types::{RouteError, RouteOutcome, RouteProvider, RouteState};
use crate::geo::Coordinate;
use crate::http::{RequestSlots, SlotTicket};

/// Quiet period after the last coordinate change.
pub const DEFAULT_ROUTE_DEBOUNCE: Duration = Duration::from_millis(500);

/// The calculator keeps a single slot: one pair at a time.
const ROUTE_SLOT: &str = "route";

/// Calculator configuration.
#[derive(Debug, Clone)]
pub struct RouteCalculatorConfig {
    pub debounce: Duration,
    pub retry: RetryPolicy,
}

impl Default for RouteCalculatorConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_ROUTE_DEBOUNCE,
            retry: RetryPolicy::default(),
        }
    }
}

impl RouteCalculatorConfig {
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Computes routes for the latest origin/destination pair.
pub struct RouteCalculator {
    provider: Arc<dyn RouteProvider>,
    cache: Option<RouteCache>,
    config: RouteCalculatorConfig,
    slots: RequestSlots,
    state: watch::Sender<RouteState>,
}

impl std::fmt::Debug for RouteCalculator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteCalculator")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl RouteCalculator {
    pub fn new(provider: Arc<dyn RouteProvider>, config: RouteCalculatorConfig) -> Self {
        Self::with_shutdown(provider, config, CancellationToken::new())
    }

    /// Like [`new`](Self::new), with in-flight work tied to `shutdown`.
    pub fn with_shutdown(
        provider: Arc<dyn RouteProvider>,
        config: RouteCalculatorConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let (state, _) = watch::channel(RouteState::Idle);
        Self {
            provider,
            cache: None,
            config,
            slots: RequestSlots::new(shutdown),
            state,
        }
    }

    /// Consults `cache` before requesting and fills it on success.
    pub fn with_cache(mut self, cache: RouteCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Current state.
    pub fn state(&self) -> RouteState {
        self.state.borrow().clone()
    }

    /// Receiver observing state changes.
    pub fn subscribe(&self) -> watch::Receiver<RouteState> {
        self.state.subscribe()
    }

    /// Cancels whatever is pending.
    pub fn cancel(&self) {
        if self.slots.active_count() > 0 {
            self.slots.cancel(ROUTE_SLOT);
            self.state.send_replace(RouteState::Cancelled);
        }
    }

    /// Computes the route from `origin` to `destination`.
    pub async fn compute_route(&self, origin: Coordinate, destination: Coordinate) -> RouteOutcome {
        let superseding = self.slots.active_count() > 0;
        let ticket = self.slots.begin(ROUTE_SLOT);
        if superseding {
            self.state.send_replace(RouteState::Cancelled);
        }
        self.state.send_replace(RouteState::Debouncing);

        let outcome = self.run(&ticket, origin, destination).await;
        self.slots.finish(&ticket);

        if outcome.is_cancelled() {
            tracing::debug!(origin = %origin, destination = %destination, "Route request superseded");
        }
        outcome
    }

    async fn run(
        &self,
        ticket: &SlotTicket,
        origin: Coordinate,
        destination: Coordinate,
    ) -> RouteOutcome {
        let token = ticket.token();

        if !sleep_or_cancel(token, self.config.debounce).await {
            return RouteOutcome::Cancelled;
        }

        if let Some(cache) = &self.cache {
            if let Some(route) = cache.get(origin, destination).await {
                if token.is_cancelled() {
                    return RouteOutcome::Cancelled;
                }
                self.publish(ticket, RouteState::Succeeded);
                return RouteOutcome::Succeeded(route);
            }
        }

        let mut attempt = 1;
        loop {
            self.publish(ticket, RouteState::Requesting { attempt });
            tracing::debug!(
                provider = self.provider.name(),
                attempt,
                origin = %origin,
                destination = %destination,
                "Requesting route"
            );

            match self.provider.route(origin, destination, token).await {
                Ok(route) => {
                    if token.is_cancelled() {
                        return RouteOutcome::Cancelled;
                    }
                    tracing::info!(
                        distance_km = route.distance_km,
                        duration_min = route.duration_min,
                        attempt,
                        "Route computed"
                    );
                    if let Some(cache) = &self.cache {
                        cache.put(origin, destination, &route).await;
                    }
                    self.publish(ticket, RouteState::Succeeded);
                    return RouteOutcome::Succeeded(route);
                }
                Err(RouteError::Cancelled) => return RouteOutcome::Cancelled,
                Err(e) if e.is_retryable() => match self.config.retry.delay_for_attempt(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "Route request failed, retrying"
                        );
                        self.publish(ticket, RouteState::Retrying { attempt, delay });
                        if !sleep_or_cancel(token, delay).await {
                            return RouteOutcome::Cancelled;
                        }
                        attempt += 1;
                    }
                    None => return self.fail(ticket, e),
                },
                Err(e) => return self.fail(ticket, e),
            }
        }
    }

    fn fail(&self, ticket: &SlotTicket, error: RouteError) -> RouteOutcome {
        tracing::warn!(error = %error, "Route unavailable");
        self.publish(ticket, RouteState::Failed(error.clone()));
        RouteOutcome::Failed(error)
    }

    /// Publishes `state` unless `ticket` was superseded.
    fn publish(&self, ticket: &SlotTicket, state: RouteState) {
        if self.slots.is_current(ticket) {
            self.state.send_replace(state);
        }
    }
}

/// Sleeps for `duration`. Returns `false` if `token` fired first.
async fn sleep_or_cancel(token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        biased;
        _ = token.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::http::tests::{MockHttpClient, MockReply};
    use crate::routing::osrm::tests::sample_route_body;
    use crate::routing::{OsrmConfig, OsrmProvider};
    use crate::store::MemoryStore;
    use chrono::Utc;
    use serde_json::json;
    use tokio::time::Instant;

    fn calculator(mock: Arc<MockHttpClient>) -> Arc<RouteCalculator> {
        let provider = OsrmProvider::new(mock, OsrmConfig::default().with_base_url("http://osrm.test"));
        Arc::new(RouteCalculator::new(
            Arc::new(provider),
            RouteCalculatorConfig::default(),
        ))
    }

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_debounce() {
        let mock = Arc::new(
            MockHttpClient::new().on("/route", MockReply::Json(200, sample_route_body())),
        );
        let calc = calculator(mock.clone());
        let start = Instant::now();

        let outcome = calc
            .compute_route(coord(-22.0, -47.9), coord(-22.05, -47.95))
            .await;

        let RouteOutcome::Succeeded(route) = outcome else {
            panic!("expected a route");
        };
        assert_eq!(route.distance_label(), "15.0");
        assert_eq!(route.duration_min, 20);
        assert!(start.elapsed() >= DEFAULT_ROUTE_DEBOUNCE);
        assert_eq!(calc.state(), RouteState::Succeeded);
        assert_eq!(mock.request_count("/route"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rapid_changes_issue_one_request() {
        let mock = Arc::new(
            MockHttpClient::new().on("/route", MockReply::Json(200, sample_route_body())),
        );
        let calc = calculator(mock.clone());

        let mut superseded = Vec::new();
        for i in 0..4 {
            let calc = calc.clone();
            let origin = coord(-22.0 + i as f64 * 0.001, -47.9);
            superseded.push(tokio::spawn(async move {
                calc.compute_route(origin, coord(-22.05, -47.95)).await
            }));
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        let last = calc
            .compute_route(coord(-21.99, -47.9), coord(-22.05, -47.95))
            .await;

        for handle in superseded {
            assert_eq!(handle.await.unwrap(), RouteOutcome::Cancelled);
        }
        assert!(matches!(last, RouteOutcome::Succeeded(_)));

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].url.contains("-47.9,-21.99;"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fail_succeed_waits_one_then_two_seconds() {
        let mock = Arc::new(
            MockHttpClient::new()
                .on("/route", MockReply::Status(502))
                .on("/route", MockReply::Status(502))
                .on("/route", MockReply::Json(200, sample_route_body())),
        );
        let calc = calculator(mock.clone());
        let mut states = calc.subscribe();
        let start = Instant::now();

        let outcome = calc
            .compute_route(coord(-22.0, -47.9), coord(-22.05, -47.95))
            .await;

        assert!(matches!(outcome, RouteOutcome::Succeeded(_)));
        assert_eq!(mock.request_count("/route"), 3);
        let elapsed = start.elapsed();
        // 500 ms debounce + 1 s + 2 s of backoff.
        assert!(elapsed >= Duration::from_millis(3500), "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(3600), "elapsed {:?}", elapsed);
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), RouteState::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_fail() {
        let mock = Arc::new(MockHttpClient::new().on("/route", MockReply::Status(500)));
        let calc = calculator(mock.clone());

        let outcome = calc
            .compute_route(coord(-22.0, -47.9), coord(-22.05, -47.95))
            .await;

        assert!(matches!(outcome, RouteOutcome::Failed(RouteError::Transport(_))));
        assert_eq!(mock.request_count("/route"), 3);
        assert!(matches!(calc.state(), RouteState::Failed(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_retries_instead_of_hanging() {
        let mock = Arc::new(
            MockHttpClient::new()
                .on("/route", MockReply::Hang)
                .on("/route", MockReply::Json(200, sample_route_body())),
        );
        let calc = calculator(mock.clone());

        let outcome = calc
            .compute_route(coord(-22.0, -47.9), coord(-22.05, -47.95))
            .await;

        assert!(matches!(outcome, RouteOutcome::Succeeded(_)));
        assert_eq!(mock.request_count("/route"), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_route_does_not_retry() {
        let mock = Arc::new(
            MockHttpClient::new().on("/route", MockReply::Json(200, json!({"code": "Ok", "routes": []}))),
        );
        let calc = calculator(mock.clone());

        let outcome = calc
            .compute_route(coord(-22.0, -47.9), coord(-22.05, -47.95))
            .await;

        assert_eq!(outcome, RouteOutcome::Failed(RouteError::NoRoute));
        assert_eq!(mock.request_count("/route"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_superseded_during_backoff_discards_result() {
        let mock = Arc::new(
            MockHttpClient::new()
                .on("/route", MockReply::Status(502))
                .on("/route", MockReply::Json(200, sample_route_body())),
        );
        let calc = calculator(mock.clone());

        let first = {
            let calc = calc.clone();
            tokio::spawn(async move {
                calc.compute_route(coord(-22.0, -47.9), coord(-22.05, -47.95))
                    .await
            })
        };
        // Past the debounce and first failure, inside the 1 s backoff.
        tokio::time::sleep(Duration::from_millis(800)).await;
        let second = calc
            .compute_route(coord(-22.01, -47.9), coord(-22.05, -47.95))
            .await;

        assert_eq!(first.await.unwrap(), RouteOutcome::Cancelled);
        assert!(matches!(second, RouteOutcome::Succeeded(_)));
        assert_eq!(calc.state(), RouteState::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_consulted_first() {
        let mock = Arc::new(
            MockHttpClient::new().on("/route", MockReply::Json(200, sample_route_body())),
        );
        let provider = OsrmProvider::new(mock.clone(), OsrmConfig::default().with_base_url("http://osrm.test"));
        let cache = RouteCache::new(
            Arc::new(MemoryStore::new()),
            Arc::new(ManualClock::new(Utc::now())),
        );
        let calc = RouteCalculator::new(Arc::new(provider), RouteCalculatorConfig::default())
            .with_cache(cache);
        let (a, b) = (coord(-22.0, -47.9), coord(-22.05, -47.95));

        let first = calc.compute_route(a, b).await;
        let second = calc.compute_route(a, b).await;

        assert_eq!(first, second);
        assert_eq!(mock.request_count("/route"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_pending() {
        let mock = Arc::new(
            MockHttpClient::new().on("/route", MockReply::Json(200, sample_route_body())),
        );
        let calc = calculator(mock.clone());

        let pending = {
            let calc = calc.clone();
            tokio::spawn(async move {
                calc.compute_route(coord(-22.0, -47.9), coord(-22.05, -47.95))
                    .await
            })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        calc.cancel();

        assert_eq!(pending.await.unwrap(), RouteOutcome::Cancelled);
        assert_eq!(calc.state(), RouteState::Cancelled);
        assert_eq!(mock.request_count("/route"), 0);
    }
}
