//! Geoapify geocoding provider (primary).
//!
//! Uses the GeoJSON responses of the search, autocomplete and reverse
//! endpoints. An API key is required; without one every call reports a
//! transport error so the chain moves on to the fallback.

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

/// Default API base URL.
pub const DEFAULT_GEOAPIFY_BASE_URL: &str = "https://api.geoapify.com";

/// Default proximity bias (São Carlos) as `lon, lat`.
pub const DEFAULT_BIAS_LON: f64 = -47.890;
pub const DEFAULT_BIAS_LAT: f64 = -21.988;

/// Configuration for [`GeoapifyProvider`].
#[derive(Debug, Clone)]
pub struct GeoapifyConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// ISO country code for the autocomplete filter.
    pub country_code: String,
    /// Proximity bias for ranking, `(lon, lat)`.
    pub bias: (f64, f64),
    /// Language for search and reverse results.
    pub language: String,
    pub timeout: Duration,
}

impl Default for GeoapifyConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GEOAPIFY_BASE_URL.to_string(),
            api_key: None,
            country_code: "br".to_string(),
            bias: (DEFAULT_BIAS_LON, DEFAULT_BIAS_LAT),
            language: "pt".to_string(),
            timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl GeoapifyConfig {
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Geoapify provider, generic over the HTTP client.
pub struct GeoapifyProvider<C: AsyncHttpClient> {
    http_client: C,
    config: GeoapifyConfig,
}

impl<C: AsyncHttpClient> GeoapifyProvider<C> {
    pub fn new(http_client: C, config: GeoapifyConfig) -> Self {
        Self {
            http_client,
            config,
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn bias_param(&self) -> String {
        format!("proximity:{},{}", self.config.bias.0, self.config.bias.1)
    }

    async fn fetch<T, F>(
        &self,
        request: Result<HttpRequest, ProviderError>,
        token: &CancellationToken,
        decode: F,
    ) -> ProviderOutcome<T>
    where
        F: FnOnce(&HttpResponse) -> Result<T, ProviderError>,
    {
        let request = match request {
            Ok(request) => request,
            Err(e) => return ProviderOutcome::TransportError(e),
        };

        tracing::debug!(provider = "geoapify", url = %request.url, "Geocoding request");
        let result = guarded(token, self.config.timeout, self.http_client.get(request)).await;
        ProviderOutcome::from_response(result, decode)
    }

    fn keyed(&self, request: HttpRequest) -> Result<HttpRequest, ProviderError> {
        match &self.config.api_key {
            Some(key) if !key.is_empty() => Ok(request.query("apiKey", key.as_str())),
            _ => Err(ProviderError::NotConfigured(
                "Geoapify API key is not set".to_string(),
            )),
        }
    }

    fn search_request(&self, query: &SearchQuery) -> Result<HttpRequest, ProviderError> {
        let mut request = HttpRequest::get(self.endpoint("/v1/geocode/search"))
            .query("text", query.text.as_str())
            .query("lang", self.config.language.as_str())
            .query("limit", query.limit.to_string());
        request = match query.bounds {
            Some(bounds) => request.query("filter", format!("rect:{}", bounds.to_viewbox())),
            None => request.query("filter", format!("countrycode:{}", self.config.country_code)),
        };
        self.keyed(request.query("bias", self.bias_param()))
    }

    fn autocomplete_request(&self, text: &str) -> Result<HttpRequest, ProviderError> {
        let request = HttpRequest::get(self.endpoint("/v1/geocode/autocomplete"))
            .query("text", text)
            .query("filter", format!("countrycode:{}", self.config.country_code))
            .query("bias", self.bias_param())
            .query("limit", "10");
        self.keyed(request)
    }

    fn reverse_request(&self, coordinate: Coordinate) -> Result<HttpRequest, ProviderError> {
        let request = HttpRequest::get(self.endpoint("/v1/geocode/reverse"))
            .query("lat", coordinate.latitude().to_string())
            .query("lon", coordinate.longitude().to_string())
            .query("lang", self.config.language.as_str());
        self.keyed(request)
    }
}

impl<C: AsyncHttpClient> GeocodeProvider for GeoapifyProvider<C> {
    fn name(&self) -> &str {
        "geoapify"
    }

    fn search<'a>(
        &'a self,
        query: &'a SearchQuery,
        token: &'a CancellationToken,
    ) -> ProviderFuture<'a, Vec<GeocodeCandidate>> {
        Box::pin(async move {
            self.fetch(self.search_request(query), token, |response| {
                Ok(decode_features(response)?
                    .iter()
                    .filter_map(Feature::to_candidate)
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
        Box::pin(async move {
            self.fetch(self.autocomplete_request(text), token, |response| {
                Ok(decode_features(response)?
                    .iter()
                    .filter_map(Feature::to_suggestion)
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
        Box::pin(async move {
            self.fetch(self.reverse_request(coordinate), token, |response| {
                Ok(decode_features(response)?
                    .iter()
                    .map(Feature::to_reverse_place)
                    .collect())
            })
            .await
        })
    }
}

// =============================================================================
// Response model
// =============================================================================

#[derive(Debug, Deserialize)]
struct FeatureCollection {
    #[serde(default)]
    features: Vec<Feature>,
}

#[derive(Debug, Deserialize)]
struct Feature {
    #[serde(default)]
    properties: Properties,
    #[serde(default)]
    geometry: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Properties {
    formatted: Option<String>,
    name: Option<String>,
    street: Option<String>,
    suburb: Option<String>,
    district: Option<String>,
    neighbourhood: Option<String>,
    quarter: Option<String>,
    city_district: Option<String>,
    city: Option<String>,
    state: Option<String>,
    state_code: Option<String>,
    result_type: Option<String>,
    lat: Option<Value>,
    lon: Option<Value>,
    rank: Rank,
    amenity: Option<Value>,
    building: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Rank {
    importance: Option<f64>,
}

fn decode_features(response: &HttpResponse) -> Result<Vec<Feature>, ProviderError> {
    response
        .json::<FeatureCollection>()
        .map(|collection| collection.features)
        .map_err(|e| ProviderError::Decode(e.to_string()))
}

impl Feature {
    fn coordinate(&self) -> Option<Coordinate> {
        let props = &self.properties;
        if let (Some(lat), Some(lon)) = (&props.lat, &props.lon) {
            if let Some(coord) = normalize_coordinate(&Value::Array(vec![lat.clone(), lon.clone()]))
            {
                return Some(coord);
            }
        }
        self.geometry.as_ref().and_then(normalize_coordinate)
    }

    fn label(&self) -> Option<String> {
        self.properties
            .formatted
            .clone()
            .or_else(|| self.properties.name.clone())
            .filter(|s| !s.trim().is_empty())
    }

    fn to_candidate(&self) -> Option<GeocodeCandidate> {
        let kind = self
            .properties
            .result_type
            .as_deref()
            .map(PlaceKind::from_type)
            .unwrap_or_else(|| PlaceKind::Other(String::new()));
        Some(GeocodeCandidate {
            display_name: self.label()?,
            kind,
            importance: self.properties.rank.importance.unwrap_or(0.0),
            coordinate: self.coordinate()?,
        })
    }

    fn to_suggestion(&self) -> Option<Suggestion> {
        Some(Suggestion {
            label: self.label()?,
            coordinate: self.coordinate()?,
        })
    }

    fn to_reverse_place(&self) -> ReversePlace {
        let props = &self.properties;
        let locality = [
            &props.suburb,
            &props.district,
            &props.neighbourhood,
            &props.quarter,
            &props.city_district,
        ]
        .into_iter()
        .find_map(|part| part.clone());

        ReversePlace {
            name: props.name.clone(),
            street: props.street.clone(),
            locality,
            city: props.city.clone(),
            state: props.state_code.clone().or_else(|| props.state.clone()),
            is_amenity: is_truthy(props.amenity.as_ref())
                || props.result_type.as_deref() == Some("amenity"),
            building: props
                .building
                .as_ref()
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    }
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    }
}
