//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};

use vitalroute::clock::ManualClock;
use vitalroute::geo::Coordinate;
use vitalroute::http::{AsyncHttpClient, HttpError, HttpRequest, HttpResponse};
use vitalroute::routing::{RetryPolicy, RouteCalculatorConfig};
use vitalroute::store::MemoryStore;
use vitalroute::{Engine, EngineConfig};

pub const GEOAPIFY: &str = "http://geoapify.test";
pub const NOMINATIM: &str = "http://nominatim.test";
pub const OSRM: &str = "http://osrm.test";

/// Scripted reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(u16, Value),
    Status(u16),
    Fail,
}

#[derive(Debug, Default)]
struct Script {
    routes: Vec<(String, VecDeque<Reply>)>,
    requests: Vec<HttpRequest>,
}

/// HTTP client answering by URL fragment.
///
/// Each fragment holds a queue; its last reply repeats. Clones share the
/// script and the request log.
#[derive(Debug, Clone, Default)]
pub struct ScriptedHttp {
    script: Arc<Mutex<Script>>,
}

impl ScriptedHttp {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(self, fragment: &str, replies: Vec<Reply>) -> Self {
        self.script
            .lock()
            .routes
            .push((fragment.to_string(), replies.into()));
        self
    }

    pub fn requests(&self, fragment: &str) -> Vec<HttpRequest> {
        self.script
            .lock()
            .requests
            .iter()
            .filter(|r| r.url.contains(fragment))
            .cloned()
            .collect()
    }

    pub fn count(&self, fragment: &str) -> usize {
        self.requests(fragment).len()
    }

    fn next_reply(&self, request: HttpRequest) -> Reply {
        let mut script = self.script.lock();
        let reply = match script
            .routes
            .iter_mut()
            .find(|(fragment, _)| request.url.contains(fragment.as_str()))
        {
            Some((_, queue)) if queue.len() > 1 => queue.pop_front().unwrap_or(Reply::Status(500)),
            Some((_, queue)) => queue.front().cloned().unwrap_or(Reply::Status(500)),
            None => Reply::Status(404),
        };
        script.requests.push(request);
        reply
    }
}

impl AsyncHttpClient for ScriptedHttp {
    async fn get(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        match self.next_reply(request) {
            Reply::Json(status, value) => Ok(HttpResponse {
                status,
                body: serde_json::to_vec(&value).unwrap_or_default(),
            }),
            Reply::Status(status) => Ok(HttpResponse {
                status,
                body: Vec::new(),
            }),
            Reply::Fail => Err(HttpError::Connection("connection refused".to_string())),
        }
    }
}

pub fn coord(lat: f64, lon: f64) -> Coordinate {
    Coordinate::new(lat, lon).expect("valid test coordinate")
}

/// One Geoapify search/autocomplete feature.
pub fn geoapify_feature(name: &str, kind: &str, lat: f64, lon: f64) -> Value {
    json!({"properties": {
        "formatted": name, "result_type": kind, "lat": lat, "lon": lon,
        "rank": {"importance": 0.5}
    }})
}

/// OSRM body for a 15 km, 20 minute route.
pub fn osrm_route_body() -> Value {
    json!({
        "code": "Ok",
        "routes": [{
            "distance": 15000.0,
            "duration": 1200.0,
            "geometry": {
                "type": "LineString",
                "coordinates": [[-47.9, -22.0], [-47.95, -22.05]]
            }
        }]
    })
}

pub fn test_config() -> EngineConfig {
    EngineConfig::default()
        .with_geoapify_api_key("test-key")
        .with_geoapify_url(GEOAPIFY)
        .with_nominatim_url(NOMINATIM)
        .with_osrm_url(OSRM)
        .with_route_cache_days(None)
}

pub fn no_retry() -> RouteCalculatorConfig {
    RouteCalculatorConfig::default().with_retry(RetryPolicy::None)
}

/// Engine on a Monday noon with an in-memory store.
pub async fn engine_with(config: EngineConfig, http: ScriptedHttp) -> (Engine, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap(),
    ));
    let engine = Engine::with_parts(config, http, Arc::new(MemoryStore::new()), clock.clone()).await;
    (engine, clock)
}

pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
