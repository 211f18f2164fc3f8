//! HTTP client abstraction and request cancellation.
//!
//! Every outbound call in the engine goes through [`AsyncHttpClient`] so that
//! providers can be exercised against scripted clients in tests.
//!
//! Two helpers sit on top of the client:
//!
//! - [`guarded`] races a request against a cancellation token and a timeout
//! - [`RequestSlots`] keeps at most one live request per named slot; starting
//!   a new request in a slot cancels the one before it
//!
//! ```text
//!   suggest("origin", "rua a")  ──► slot "origin" ─ token #1 ─┐
//!   suggest("origin", "rua ab") ──► slot "origin" ─ token #2  │ cancels #1
//!                                                             ▼
//!                                                      request #1 → Cancelled
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Default per-request timeout for provider calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

/// Outer timeout configured on the underlying reqwest client.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport-level failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HttpError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Failed to read response body: {0}")]
    Body(String),
}

/// A GET request description.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct HttpRequest {
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// Creates a GET request for `url`.
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Appends a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Appends a header.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// Looks up a query parameter by name.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Looks up a header by name (case-insensitive).
    pub fn header_value(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }
}

/// A received response. Non-2xx statuses are not errors at this layer.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Decodes the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Async HTTP client used by every provider.
pub trait AsyncHttpClient: Send + Sync {
    /// Performs a GET request.
    fn get(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, HttpError>> + Send;
}

impl<T: AsyncHttpClient> AsyncHttpClient for Arc<T> {
    fn get(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, HttpError>> + Send {
        (**self).get(request)
    }
}

/// Real HTTP client backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Creates a client sending `user_agent` on every request.
    pub fn new(user_agent: &str) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(CLIENT_TIMEOUT)
            .build()
            .map_err(|e| HttpError::Connection(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

impl AsyncHttpClient for ReqwestClient {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let mut builder = self.client.get(&request.url).query(&request.query);
        for (key, value) in &request.headers {
            builder = builder.header(key.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                HttpError::Timeout(CLIENT_TIMEOUT)
            } else {
                HttpError::Connection(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| HttpError::Body(e.to_string()))?
            .to_vec();

        tracing::trace!(url = %request.url, status, bytes = body.len(), "HTTP response");
        Ok(HttpResponse { status, body })
    }
}

/// Runs `request` until it completes, `token` is cancelled, or `timeout`
/// elapses, whichever comes first.
///
/// Cancellation wins ties so a superseded caller never sees a late result.
pub async fn guarded<F, T>(
    token: &CancellationToken,
    timeout: Duration,
    request: F,
) -> Result<T, HttpError>
where
    F: Future<Output = Result<T, HttpError>>,
{
    tokio::select! {
        biased;

        _ = token.cancelled() => Err(HttpError::Cancelled),

        result = tokio::time::timeout(timeout, request) => match result {
            Ok(inner) => inner,
            Err(_) => Err(HttpError::Timeout(timeout)),
        },
    }
}

/// Handle for one request occupying a slot.
#[derive(Debug, Clone)]
pub struct SlotTicket {
    slot: String,
    id: u64,
    token: CancellationToken,
}

impl SlotTicket {
    /// Slot name.
    pub fn slot(&self) -> &str {
        &self.slot
    }

    /// Token cancelled when the request is superseded or shut down.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Whether a newer request replaced this one.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Registry enforcing at most one in-flight request per slot.
#[derive(Debug)]
pub struct RequestSlots {
    parent: CancellationToken,
    active: Mutex<HashMap<String, (u64, CancellationToken)>>,
    next_id: AtomicU64,
}

impl Default for RequestSlots {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl RequestSlots {
    /// Creates a registry whose tokens are children of `parent`.
    ///
    /// Cancelling `parent` cancels every request started through it.
    pub fn new(parent: CancellationToken) -> Self {
        Self {
            parent,
            active: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Starts a request in `slot`, cancelling the previous one first.
    pub fn begin(&self, slot: &str) -> SlotTicket {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.parent.child_token();

        let previous = self
            .active
            .lock()
            .insert(slot.to_string(), (id, token.clone()));
        if let Some((previous_id, previous_token)) = previous {
            tracing::trace!(slot, previous_id, id, "Superseding in-flight request");
            previous_token.cancel();
        }

        SlotTicket {
            slot: slot.to_string(),
            id,
            token,
        }
    }

    /// Cancels whatever is running in `slot`.
    pub fn cancel(&self, slot: &str) {
        if let Some((_, token)) = self.active.lock().remove(slot) {
            token.cancel();
        }
    }

    /// Releases the slot if `ticket` still owns it.
    pub fn finish(&self, ticket: &SlotTicket) {
        let mut active = self.active.lock();
        if matches!(active.get(&ticket.slot), Some((id, _)) if *id == ticket.id) {
            active.remove(&ticket.slot);
        }
    }

    /// Whether `ticket` is still the newest request for its slot.
    pub fn is_current(&self, ticket: &SlotTicket) -> bool {
        !ticket.is_cancelled()
            && matches!(self.active.lock().get(&ticket.slot), Some((id, _)) if *id == ticket.id)
    }

    /// Number of slots with a live request.
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Cancels every slot.
    pub fn cancel_all(&self) {
        for (_, (_, token)) in self.active.lock().drain() {
            token.cancel();
        }
    }
}
