//! Address resolution and reverse geocoding.
//!
//! ```ignore
//! let resolver = AddressResolver::new(chain.clone(), clock, ResolverConfig::default());
//! let pickup = resolver.resolve("Santa Casa, R. Paulino Botelho, s/n").await;
//!
//! let reverse = ReverseGeocoder::new(chain);
//! let label = reverse.label(pickup).await;
//! ```

mod address;
mod region;
mod resolver;
mod reverse;
mod scoring;

pub use address::{
    comparable, extract_keywords, fold_accents, normalize_address, parse_details, school_query,
    AddressDetails,
};
pub use region::{Region, DEFAULT_BOUNDS, DEFAULT_CENTER, DEFAULT_FAR_THRESHOLD_DEG};
pub use resolver::{AddressResolver, ResolvedAddress, ResolverConfig, DEFAULT_TTL_BUSINESS_DAYS};
pub use reverse::{build_label, fallback_label, ReverseGeocoder};
pub use scoring::{kind_score, ScoringContext};
