//! OSRM driving-route provider.
//!
//! `GET {base}/route/v1/driving/{lon1},{lat1};{lon2},{lat2}?overview=full&geometries=geojson`
//!
//! OSRM speaks GeoJSON order; the geometry is flipped to `(lat, lon)` on the
//! way in.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::types::{RouteError, RouteFuture, RouteProvider, RouteResult};
use crate::geo::{normalize_lon_lat, Coordinate};
use crate::http::{guarded, AsyncHttpClient, HttpError, HttpRequest, DEFAULT_REQUEST_TIMEOUT};
use crate::provider::ProviderError;

/// Public OSRM demo server.
pub const DEFAULT_OSRM_BASE_URL: &str = "https://router.project-osrm.org";

/// Configuration for [`OsrmProvider`].
#[derive(Debug, Clone)]
pub struct OsrmConfig {
    pub base_url: String,
    /// Per-attempt timeout.
    pub timeout: Duration,
}

impl Default for OsrmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OSRM_BASE_URL.to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl OsrmConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// OSRM provider, generic over the HTTP client.
pub struct OsrmProvider<C: AsyncHttpClient> {
    http_client: C,
    config: OsrmConfig,
}

impl<C: AsyncHttpClient> OsrmProvider<C> {
    pub fn new(http_client: C, config: OsrmConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    fn route_url(&self, origin: Coordinate, destination: Coordinate) -> String {
        format!(
            "{}/route/v1/driving/{},{};{},{}",
            self.config.base_url.trim_end_matches('/'),
            origin.longitude(),
            origin.latitude(),
            destination.longitude(),
            destination.latitude()
        )
    }
}

impl<C: AsyncHttpClient> RouteProvider for OsrmProvider<C> {
    fn name(&self) -> &str {
        "osrm"
    }

    fn route<'a>(
        &'a self,
        origin: Coordinate,
        destination: Coordinate,
        token: &'a CancellationToken,
    ) -> RouteFuture<'a> {
        let request = HttpRequest::get(self.route_url(origin, destination))
            .query("overview", "full")
            .query("geometries", "geojson");

        Box::pin(async move {
            tracing::debug!(provider = "osrm", url = %request.url, "Route request");
            let response = match guarded(token, self.config.timeout, self.http_client.get(request)).await
            {
                Ok(response) => response,
                Err(HttpError::Cancelled) => return Err(RouteError::Cancelled),
                Err(e) => return Err(RouteError::Transport(e.into())),
            };

            // OSRM answers "no route" with a 400 and a code; read the body first.
            let body: RouteResponse = match response.json() {
                Ok(body) => body,
                Err(_) if !response.is_success() => {
                    return Err(ProviderError::Status(response.status).into())
                }
                Err(e) => return Err(ProviderError::Decode(e.to_string()).into()),
            };

            if body.code.as_deref() == Some("NoRoute") {
                return Err(RouteError::NoRoute);
            }
            if !response.is_success() {
                return Err(ProviderError::Status(response.status).into());
            }

            let route = body.routes.into_iter().next().ok_or(RouteError::NoRoute)?;
            let polyline: Vec<Coordinate> = route
                .geometry
                .coordinates
                .iter()
                .filter_map(normalize_lon_lat)
                .collect();

            let result = RouteResult::from_raw(polyline, route.distance, route.duration);
            tracing::debug!(
                distance_km = result.distance_km,
                duration_min = result.duration_min,
                points = result.polyline.len(),
                "Route received"
            );
            Ok(result)
        })
    }
}

// =============================================================================
// Response model
// =============================================================================

#[derive(Debug, Deserialize)]
struct RouteResponse {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Debug, Deserialize)]
struct OsrmRoute {
    #[serde(default)]
    distance: f64,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    geometry: Geometry,
}

#[derive(Debug, Default, Deserialize)]
struct Geometry {
    #[serde(default)]
    coordinates: Vec<Value>,
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::http::tests::{MockHttpClient, MockReply};
    use serde_json::json;

    /// Body of a successful 15 km, 20 minute route.
    pub fn sample_route_body() -> Value {
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

    fn provider(mock: MockHttpClient) -> OsrmProvider<MockHttpClient> {
        OsrmProvider::new(mock, OsrmConfig::default().with_base_url("http://osrm.test/"))
    }

    fn pair() -> (Coordinate, Coordinate) {
        (
            Coordinate::new(-22.0, -47.9).unwrap(),
            Coordinate::new(-22.05, -47.95).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_route_parsed_and_reordered() {
        let provider = provider(
            MockHttpClient::new().on("/route/v1/driving", MockReply::Json(200, sample_route_body())),
        );
        let (a, b) = pair();
        let route = provider.route(a, b, &CancellationToken::new()).await.unwrap();

        assert_eq!(route.distance_label(), "15.0");
        assert_eq!(route.duration_min, 20);
        let points: Vec<(f64, f64)> = route.polyline.iter().map(Coordinate::lat_lon).collect();
        assert_eq!(points, vec![(-22.0, -47.9), (-22.05, -47.95)]);

        let request = &provider.http_client.requests()[0];
        assert_eq!(
            request.url,
            "http://osrm.test/route/v1/driving/-47.9,-22;-47.95,-22.05"
        );
        assert_eq!(request.query_value("overview"), Some("full"));
        assert_eq!(request.query_value("geometries"), Some("geojson"));
    }

    #[tokio::test]
    async fn test_empty_routes_is_no_route() {
        let provider = provider(
            MockHttpClient::new().on("/route", MockReply::Json(200, json!({"code": "Ok", "routes": []}))),
        );
        let (a, b) = pair();
        let result = provider.route(a, b, &CancellationToken::new()).await;
        assert_eq!(result, Err(RouteError::NoRoute));
    }

    #[tokio::test]
    async fn test_no_route_code_with_400() {
        let provider = provider(
            MockHttpClient::new().on("/route", MockReply::Json(400, json!({"code": "NoRoute"}))),
        );
        let (a, b) = pair();
        let result = provider.route(a, b, &CancellationToken::new()).await;
        assert_eq!(result, Err(RouteError::NoRoute));
    }

    #[tokio::test]
    async fn test_server_error_is_transport() {
        let provider = provider(MockHttpClient::new().on("/route", MockReply::Status(503)));
        let (a, b) = pair();
        let result = provider.route(a, b, &CancellationToken::new()).await;
        assert_eq!(
            result,
            Err(RouteError::Transport(ProviderError::Status(503)))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_hang_times_out_as_transport() {
        let provider = provider(MockHttpClient::new().on("/route", MockReply::Hang));
        let (a, b) = pair();
        let result = provider.route(a, b, &CancellationToken::new()).await;
        assert!(matches!(
            result,
            Err(RouteError::Transport(ProviderError::Http(HttpError::Timeout(_))))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_token() {
        let provider = provider(MockHttpClient::new().on("/route", MockReply::Hang));
        let (a, b) = pair();
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(provider.route(a, b, &token).await, Err(RouteError::Cancelled));
    }
}
