//! Provider-neutral geocoding types.

use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::geo::{Coordinate, GeoBounds};
use crate::http::{HttpError, HttpResponse};

/// Errors a provider can hit while talking to its service.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProviderError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

/// Result of one provider call.
///
/// Rate limiting is kept apart from other failures so the chain can log and
/// track it separately; both trigger fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderOutcome<T> {
    Found(T),
    RateLimited,
    TransportError(ProviderError),
    /// The provider answered but had nothing usable. Falls back without
    /// counting a failure.
    Empty,
    /// The caller's token fired; never triggers fallback.
    Cancelled,
}

impl<T> ProviderOutcome<T> {
    /// Classifies a raw HTTP result, decoding successful bodies with `decode`.
    pub fn from_response<F>(result: Result<HttpResponse, HttpError>, decode: F) -> Self
    where
        F: FnOnce(&HttpResponse) -> Result<T, ProviderError>,
    {
        match result {
            Err(HttpError::Cancelled) => ProviderOutcome::Cancelled,
            Err(e) => ProviderOutcome::TransportError(e.into()),
            Ok(response) if response.status == 429 => ProviderOutcome::RateLimited,
            Ok(response) if !response.is_success() => {
                ProviderOutcome::TransportError(ProviderError::Status(response.status))
            }
            Ok(response) => match decode(&response) {
                Ok(value) => ProviderOutcome::Found(value),
                Err(e) => ProviderOutcome::TransportError(e),
            },
        }
    }
}

/// Coarse place classification used by relevance scoring.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PlaceKind {
    Amenity,
    Building,
    Road,
    Residential,
    Suburb,
    City,
    State,
    Other(String),
}

impl PlaceKind {
    /// Maps a provider type string. `street` is treated as `road`.
    pub fn from_type(kind: &str) -> Self {
        match kind.trim().to_ascii_lowercase().as_str() {
            "amenity" => PlaceKind::Amenity,
            "building" => PlaceKind::Building,
            "road" | "street" => PlaceKind::Road,
            "residential" => PlaceKind::Residential,
            "suburb" => PlaceKind::Suburb,
            "city" => PlaceKind::City,
            "state" => PlaceKind::State,
            other => PlaceKind::Other(other.to_string()),
        }
    }

    /// Maps an OSM `class`/`type` pair, preferring a recognised type.
    pub fn from_osm(class: &str, kind: &str) -> Self {
        match Self::from_type(kind) {
            PlaceKind::Other(_) => match class.trim().to_ascii_lowercase().as_str() {
                "amenity" => PlaceKind::Amenity,
                "building" => PlaceKind::Building,
                "highway" => PlaceKind::Road,
                _ => PlaceKind::from_type(kind),
            },
            known => known,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            PlaceKind::Amenity => "amenity",
            PlaceKind::Building => "building",
            PlaceKind::Road => "road",
            PlaceKind::Residential => "residential",
            PlaceKind::Suburb => "suburb",
            PlaceKind::City => "city",
            PlaceKind::State => "state",
            PlaceKind::Other(s) => s,
        }
    }

    /// Amenity or building.
    pub fn is_facility(&self) -> bool {
        matches!(self, PlaceKind::Amenity | PlaceKind::Building)
    }
}

/// A forward-geocoding hit.
#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeCandidate {
    pub display_name: String,
    pub kind: PlaceKind,
    pub importance: f64,
    pub coordinate: Coordinate,
}

/// An autocomplete entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    pub label: String,
    pub coordinate: Coordinate,
}

/// Address parts of a reverse-geocoding hit.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ReversePlace {
    pub name: Option<String>,
    pub street: Option<String>,
    /// Suburb, district, neighbourhood or similar.
    pub locality: Option<String>,
    pub city: Option<String>,
    /// State code or name.
    pub state: Option<String>,
    pub is_amenity: bool,
    /// Building tag when it says more than `yes`.
    pub building: Option<String>,
}

/// A forward search request.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub text: String,
    pub limit: usize,
    /// Restrict results to this box.
    pub bounds: Option<GeoBounds>,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: 10,
            bounds: None,
        }
    }

    pub fn bounded(mut self, bounds: GeoBounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Boxed future returned by [`GeocodeProvider`] methods.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = ProviderOutcome<T>> + Send + 'a>>;

/// A geocoding backend.
///
/// Object-safe so a chain can hold heterogeneous providers behind
/// `Arc<dyn GeocodeProvider>`. Implementations must honour `token` and
/// their own timeout; a timeout is reported as a transport error.
pub trait GeocodeProvider: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &str;

    /// Forward search for the resolver.
    fn search<'a>(
        &'a self,
        query: &'a SearchQuery,
        token: &'a CancellationToken,
    ) -> ProviderFuture<'a, Vec<GeocodeCandidate>>;

    /// Type-ahead search.
    fn autocomplete<'a>(
        &'a self,
        text: &'a str,
        token: &'a CancellationToken,
    ) -> ProviderFuture<'a, Vec<Suggestion>>;

    /// Reverse lookup, nearest first.
    fn reverse<'a>(
        &'a self,
        coordinate: Coordinate,
        token: &'a CancellationToken,
    ) -> ProviderFuture<'a, Vec<ReversePlace>>;

    /// Maximum label parts when building a reverse label from this provider.
    fn max_label_parts(&self) -> usize {
        5
    }
}
