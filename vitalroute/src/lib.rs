//! VitalRoute - geospatial resolution and live route synchronization for
//! ambulance dispatch.
//!
//! The library turns operator-typed addresses into coordinates, suggests
//! addresses while typing, computes driving routes with retry, and keeps a
//! map surface in sync with the moving vehicle.
//!
//! # Modules
//!
//! - [`geo`]: coordinates, normalization and distance math
//! - [`provider`]: geocoding backends and the fallback chain
//! - [`geocode`]: address resolution and reverse labels
//! - [`autocomplete`]: debounced, cached suggestions
//! - [`routing`]: OSRM routes with debounce, retry and caching
//! - [`tracking`]: position stream handling and the tracking loop
//! - [`bridge`]: the map surface protocol
//! - [`engine`]: wiring for all of the above
//!
//! ```ignore
//! let config = ConfigFile::load().unwrap_or_default();
//! let engine = Engine::start(EngineConfig::from(&config)).await?;
//!
//! let hospital = engine.resolver().resolve("Hospital Municipal, São Carlos").await;
//! ```

pub mod advisory;
pub mod autocomplete;
pub mod bridge;
pub mod clock;
pub mod config;
pub mod engine;
pub mod geo;
pub mod geocode;
pub mod http;
pub mod logging;
pub mod provider;
pub mod routing;
pub mod store;
pub mod tracking;

pub use engine::{Engine, EngineConfig, EngineError};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
