//! Geocoding provider abstraction.
//!
//! Providers are generic over [`AsyncHttpClient`](crate::http::AsyncHttpClient)
//! and exposed through the object-safe [`GeocodeProvider`] trait so that a
//! [`ProviderChain`] can hold a primary and a fallback side by side.
//!
//! ```ignore
//! use vitalroute::provider::*;
//!
//! let http = Arc::new(ReqwestClient::new(DEFAULT_USER_AGENT)?);
//! let chain = ProviderChain::new(
//!     vec![
//!         Arc::new(GeoapifyProvider::new(http.clone(), GeoapifyConfig::default().with_api_key(key))),
//!         Arc::new(NominatimProvider::new(http, NominatimConfig::default())),
//!     ],
//!     advisories,
//! );
//! ```

mod chain;
mod geoapify;
mod nominatim;
mod types;

pub use chain::{ChainOutcome, ProviderChain, ProviderHealth, DEFAULT_RATE_LIMIT_COOLDOWN};
pub use geoapify::{GeoapifyConfig, GeoapifyProvider, DEFAULT_GEOAPIFY_BASE_URL};
pub use nominatim::{
    NominatimConfig, NominatimProvider, DEFAULT_NOMINATIM_BASE_URL, DEFAULT_USER_AGENT,
};
pub use types::{
    GeocodeCandidate, GeocodeProvider, PlaceKind, ProviderError, ProviderFuture, ProviderOutcome,
    ReversePlace, SearchQuery, Suggestion,
};
