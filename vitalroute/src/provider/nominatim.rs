//! Nominatim (OpenStreetMap) geocoding provider (fallback).
//!
//! Nominatim's usage policy requires an identifying `User-Agent`, which is
//! sent on every request. Coordinates come back as strings and are coerced
//! through the normal normalization path.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::types::{
    GeocodeCandidate, GeocodeProvider, PlaceKind, ProviderError, ProviderFuture, ProviderOutcome,
    ReversePlace, SearchQuery, Suggestion,
};
use crate::geo::{normalize_coordinate, Coordinate};
use crate::http::{guarded, AsyncHttpClient, HttpRequest, HttpResponse, DEFAULT_REQUEST_TIMEOUT};

/// Default public endpoint.
pub const DEFAULT_NOMINATIM_BASE_URL: &str = "https://nominatim.openstreetmap.org";

/// Default identifying user agent.
pub const DEFAULT_USER_AGENT: &str = concat!("vitalroute/", env!("CARGO_PKG_VERSION"));

/// Label parts kept for reverse labels from this provider.
const NOMINATIM_LABEL_PARTS: usize = 4;

/// Configuration for [`NominatimProvider`].
#[derive(Debug, Clone)]
pub struct NominatimConfig {
    pub base_url: String,
    pub user_agent: String,
    /// Country name appended to free-text autocomplete queries.
    pub country_name: String,
    /// Country codes filter for bounded searches.
    pub country_codes: String,
    pub language: String,
    pub timeout: Duration,
}

impl Default for NominatimConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_NOMINATIM_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            country_name: "Brazil".to_string(),
            country_codes: "br".to_string(),
            language: "pt-BR".to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl NominatimConfig {
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = agent.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Nominatim provider, generic over the HTTP client.
pub struct NominatimProvider<C: AsyncHttpClient> {
    http_client: C,
    config: NominatimConfig,
}

impl<C: AsyncHttpClient> NominatimProvider<C> {
    pub fn new(http_client: C, config: NominatimConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    fn request(&self, path: &str) -> HttpRequest {
        HttpRequest::get(format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            path
        ))
        .header("User-Agent", self.config.user_agent.as_str())
        .query("format", "json")
        .query("accept-language", self.config.language.as_str())
    }

    async fn fetch<T, F>(
        &self,
        request: HttpRequest,
        token: &CancellationToken,
        decode: F,
    ) -> ProviderOutcome<T>
    where
        F: FnOnce(&HttpResponse) -> Result<T, ProviderError>,
    {
        tracing::debug!(provider = "nominatim", url = %request.url, "Geocoding request");
        let result = guarded(token, self.config.timeout, self.http_client.get(request)).await;
        ProviderOutcome::from_response(result, decode)
    }
}

impl<C: AsyncHttpClient> GeocodeProvider for NominatimProvider<C> {
    fn name(&self) -> &str {
        "nominatim"
    }

    fn search<'a>(
        &'a self,
        query: &'a SearchQuery,
        token: &'a CancellationToken,
    ) -> ProviderFuture<'a, Vec<GeocodeCandidate>> {
        let mut request = self
            .request("/search")
            .query("q", query.text.as_str())
            .query("countrycodes", self.config.country_codes.as_str())
            .query("addressdetails", "1")
            .query("limit", query.limit.to_string());
        if let Some(bounds) = query.bounds {
            request = request
                .query("viewbox", bounds.to_viewbox())
                .query("bounded", "1");
        }

        Box::pin(async move {
            self.fetch(request, token, |response| {
                Ok(decode_places(response)?
                    .iter()
                    .filter_map(Place::to_candidate)
                    .collect())
            })
            .await
        })
    }

    fn autocomplete<'a>(
        &'a self,
        text: &'a str,
        token: &'a CancellationToken,
    ) -> ProviderFuture<'a, Vec<Suggestion>> {
        let request = self
            .request("/search")
            .query("q", format!("{},{}", text, self.config.country_name))
            .query("addressdetails", "1")
            .query("limit", "10");

        Box::pin(async move {
            self.fetch(request, token, |response| {
                Ok(decode_places(response)?
                    .iter()
                    .filter_map(Place::to_suggestion)
                    .collect())
            })
            .await
        })
    }

    fn reverse<'a>(
        &'a self,
        coordinate: Coordinate,
        token: &'a CancellationToken,
    ) -> ProviderFuture<'a, Vec<ReversePlace>> {
        let request = self
            .request("/reverse")
            .query("lat", coordinate.latitude().to_string())
            .query("lon", coordinate.longitude().to_string())
            .query("zoom", "18");

        Box::pin(async move {
            self.fetch(request, token, |response| {
                let place: ReverseResponse = response
                    .json()
                    .map_err(|e| ProviderError::Decode(e.to_string()))?;
                Ok(place.into_places())
            })
            .await
        })
    }

    fn max_label_parts(&self) -> usize {
        NOMINATIM_LABEL_PARTS
    }
}

// =============================================================================
// Response model
// =============================================================================

#[derive(Debug, Deserialize)]
struct Place {
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    lat: Value,
    #[serde(default)]
    lon: Value,
    #[serde(default)]
    class: Option<String>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    importance: Value,
}

fn decode_places(response: &HttpResponse) -> Result<Vec<Place>, ProviderError> {
    response
        .json::<Vec<Place>>()
        .map_err(|e| ProviderError::Decode(e.to_string()))
}

impl Place {
    fn coordinate(&self) -> Option<Coordinate> {
        normalize_coordinate(&Value::Array(vec![self.lat.clone(), self.lon.clone()]))
    }

    fn label(&self) -> Option<String> {
        self.display_name
            .clone()
            .filter(|name| !name.trim().is_empty())
    }

    fn to_candidate(&self) -> Option<GeocodeCandidate> {
        let kind = PlaceKind::from_osm(
            self.class.as_deref().unwrap_or_default(),
            self.kind.as_deref().unwrap_or_default(),
        );
        let importance = match &self.importance {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::String(s) => s.parse().unwrap_or(0.0),
            _ => 0.0,
        };
        Some(GeocodeCandidate {
            display_name: self.label()?,
            kind,
            importance: if importance.is_finite() { importance } else { 0.0 },
            coordinate: self.coordinate()?,
        })
    }

    fn to_suggestion(&self) -> Option<Suggestion> {
        Some(Suggestion {
            label: self.label()?,
            coordinate: self.coordinate()?,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReverseResponse {
    name: Option<String>,
    address: Option<ReverseAddress>,
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ReverseAddress {
    amenity: Option<String>,
    building: Option<String>,
    name: Option<String>,
    road: Option<String>,
    suburb: Option<String>,
    neighbourhood: Option<String>,
    district: Option<String>,
    quarter: Option<String>,
    city: Option<String>,
    town: Option<String>,
    municipality: Option<String>,
}

impl ReverseResponse {
    fn into_places(self) -> Vec<ReversePlace> {
        if self.error.is_some() {
            return Vec::new();
        }
        let address = self.address.unwrap_or_default();
        let is_amenity = address.amenity.is_some();
        let name = address
            .amenity
            .or(address.building.clone())
            .or(address.name)
            .or(self.name);

        vec![ReversePlace {
            name,
            street: address.road,
            locality: address
                .suburb
                .or(address.neighbourhood)
                .or(address.district)
                .or(address.quarter),
            city: address.city.or(address.town).or(address.municipality),
            state: None,
            is_amenity,
            building: address.building,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoBounds;
    use crate::http::tests::{MockHttpClient, MockReply};
    use serde_json::json;

    fn provider(mock: MockHttpClient) -> NominatimProvider<MockHttpClient> {
        NominatimProvider::new(
            mock,
            NominatimConfig::default().with_base_url("http://nominatim.test"),
        )
    }

    #[tokio::test]
    async fn test_autocomplete_appends_country_and_user_agent() {
        let mock = MockHttpClient::new().on(
            "/search",
            MockReply::Json(
                200,
                json!([{"display_name": "Rua XV de Novembro, São Carlos", "lat": "-22.017", "lon": "-47.891"}]),
            ),
        );
        let provider = provider(mock);
        let token = CancellationToken::new();

        let outcome = provider.autocomplete("rua xv", &token).await;
        let ProviderOutcome::Found(suggestions) = outcome else {
            panic!("expected suggestions");
        };
        assert_eq!(suggestions[0].coordinate.lat_lon(), (-22.017, -47.891));

        let sent = &provider.http_client.requests()[0];
        assert_eq!(sent.query_value("q"), Some("rua xv,Brazil"));
        assert_eq!(sent.query_value("format"), Some("json"));
        assert_eq!(sent.query_value("addressdetails"), Some("1"));
        assert_eq!(sent.query_value("accept-language"), Some("pt-BR"));
        assert!(sent.header_value("User-Agent").is_some());
    }

    #[tokio::test]
    async fn test_bounded_search() {
        let mock = MockHttpClient::new().on(
            "/search",
            MockReply::Json(
                200,
                json!([{
                    "display_name": "Santa Casa, São Carlos",
                    "lat": "-22.02", "lon": "-47.89",
                    "class": "amenity", "type": "hospital",
                    "importance": 0.45
                }]),
            ),
        );
        let provider = provider(mock);
        let token = CancellationToken::new();
        let query = SearchQuery::new("santa casa")
            .bounded(GeoBounds::new(-22.0470, -47.9530, -21.9706, -47.8298));

        let ProviderOutcome::Found(candidates) = provider.search(&query, &token).await else {
            panic!("expected candidates");
        };
        assert_eq!(candidates[0].kind, PlaceKind::Amenity);
        assert_eq!(candidates[0].importance, 0.45);

        let sent = &provider.http_client.requests()[0];
        assert_eq!(sent.query_value("bounded"), Some("1"));
        assert_eq!(
            sent.query_value("viewbox"),
            Some("-47.9530,-22.0470,-47.8298,-21.9706")
        );
    }

    #[tokio::test]
    async fn test_server_error_is_transport_error() {
        let mock = MockHttpClient::new().on("/search", MockReply::Status(502));
        let provider = provider(mock);
        let token = CancellationToken::new();

        let outcome = provider.autocomplete("rua xv", &token).await;
        assert_eq!(
            outcome,
            ProviderOutcome::TransportError(ProviderError::Status(502))
        );
    }

    #[tokio::test]
    async fn test_reverse_prefers_amenity_name() {
        let mock = MockHttpClient::new().on(
            "/reverse",
            MockReply::Json(
                200,
                json!({
                    "display_name": "...",
                    "address": {
                        "amenity": "UPA Vila Prado",
                        "road": "Rua Antônio Blanco",
                        "suburb": "Vila Prado",
                        "town": "São Carlos"
                    }
                }),
            ),
        );
        let provider = provider(mock);
        let token = CancellationToken::new();
        let coord = Coordinate::new(-22.03, -47.90).unwrap();

        let ProviderOutcome::Found(places) = provider.reverse(coord, &token).await else {
            panic!("expected place");
        };
        assert_eq!(places[0].name.as_deref(), Some("UPA Vila Prado"));
        assert_eq!(places[0].city.as_deref(), Some("São Carlos"));
        assert!(places[0].is_amenity);
        assert_eq!(provider.max_label_parts(), 4);

        let sent = &provider.http_client.requests()[0];
        assert_eq!(sent.query_value("zoom"), Some("18"));
    }

    #[tokio::test]
    async fn test_reverse_error_body_yields_no_places() {
        let mock = MockHttpClient::new().on(
            "/reverse",
            MockReply::Json(200, json!({"error": "Unable to geocode"})),
        );
        let provider = provider(mock);
        let token = CancellationToken::new();
        let coord = Coordinate::new(0.0, 0.0).unwrap();

        assert_eq!(
            provider.reverse(coord, &token).await,
            ProviderOutcome::Found(Vec::new())
        );
    }
}
