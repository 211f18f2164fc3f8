//! Persisted route cache.
//!
//! Routes between the same two points rarely change, so a computed route is
//! kept for [`DEFAULT_ROUTE_CACHE_DAYS`] calendar days under a key built from
//! both endpoints rounded to four decimals:
//!
//! ```text
//! route_cache_-22.0000_-47.9000_to_-22.0500_-47.9500
//! ```
//!
//! Store failures are logged and treated as misses.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::types::RouteResult;
use crate::clock::SharedClock;
use crate::geo::Coordinate;
use crate::store::KeyValueStore;

/// Calendar days a cached route stays valid.
pub const DEFAULT_ROUTE_CACHE_DAYS: i64 = 30;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Serialize, Deserialize)]
struct CachedRoute {
    route: RouteResult,
    /// ms since the Unix epoch.
    timestamp: i64,
}

/// Store key for a route between two points.
pub fn route_cache_key(origin: Coordinate, destination: Coordinate) -> String {
    format!(
        "route_cache_{:.4}_{:.4}_to_{:.4}_{:.4}",
        origin.latitude(),
        origin.longitude(),
        destination.latitude(),
        destination.longitude()
    )
}

/// Route cache over a [`KeyValueStore`].
pub struct RouteCache {
    store: Arc<dyn KeyValueStore>,
    clock: SharedClock,
    ttl_ms: i64,
}

impl std::fmt::Debug for RouteCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouteCache")
            .field("ttl_ms", &self.ttl_ms)
            .finish_non_exhaustive()
    }
}

impl RouteCache {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: SharedClock) -> Self {
        Self {
            store,
            clock,
            ttl_ms: DEFAULT_ROUTE_CACHE_DAYS * DAY_MS,
        }
    }

    pub fn with_ttl_days(mut self, days: i64) -> Self {
        self.ttl_ms = days.saturating_mul(DAY_MS);
        self
    }

    /// Fresh cached route, if any. Expired entries are removed.
    pub async fn get(&self, origin: Coordinate, destination: Coordinate) -> Option<RouteResult> {
        let key = route_cache_key(origin, destination);
        let json = match self.store.get(&key).await {
            Ok(json) => json?,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Route cache read failed");
                return None;
            }
        };

        let cached: CachedRoute = match serde_json::from_str(&json) {
            Ok(cached) => cached,
            Err(e) => {
                tracing::debug!(key = %key, error = %e, "Discarding unreadable cached route");
                self.remove(&key).await;
                return None;
            }
        };

        let age_ms = self.clock.now_millis().saturating_sub(cached.timestamp);
        if age_ms >= self.ttl_ms {
            tracing::debug!(key = %key, "Cached route expired");
            self.remove(&key).await;
            return None;
        }

        tracing::debug!(key = %key, "Route cache hit");
        Some(cached.route)
    }

    /// Stores `route`. Failures are logged.
    pub async fn put(&self, origin: Coordinate, destination: Coordinate, route: &RouteResult) {
        let key = route_cache_key(origin, destination);
        let entry = CachedRoute {
            route: route.clone(),
            timestamp: self.clock.now_millis(),
        };
        let json = match serde_json::to_string(&entry) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to serialize route for cache");
                return;
            }
        };
        if let Err(e) = self.store.set(&key, json).await {
            tracing::warn!(key = %key, error = %e, "Route cache write failed");
        }
    }

    async fn remove(&self, key: &str) {
        if let Err(e) = self.store.remove(key).await {
            tracing::debug!(key, error = %e, "Route cache removal failed");
        }
    }
}
