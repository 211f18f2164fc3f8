//! Free-text address resolution.
//!
//! [`AddressResolver::resolve`] never fails: when every query comes back
//! empty, or the providers are down, the region center is returned. Results,
//! including the fallback, are cached per normalized input for a number of
//! business days.
//!
//! # Query plan
//!
//! ```text
//!  text ──► parse details ──► normalize
//!                │
//!                ├─ institution?          "<institution>, <region>"   (+200 amenity/building)
//!                │      └─ first hit is an amenity ──► done
//!                ├─ s/n and no institution  "escola <street words> <city>" (+100 amenity)
//!                └─ always                 "<normalized address>"
//!                           │
//!                  dedupe (3 decimals) ──► score ──► best or region center
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::address::{normalize_address, parse_details, school_query};
use super::region::Region;
use super::scoring::ScoringContext;
use crate::clock::{business_days_between, SharedClock};
use crate::geo::Coordinate;
use crate::http::RequestSlots;
use crate::provider::{ChainOutcome, GeocodeCandidate, PlaceKind, ProviderChain, SearchQuery};

/// Default cache lifetime in business days.
pub const DEFAULT_TTL_BUSINESS_DAYS: u32 = 7;

/// Priority given to facilities found by the institution query.
const INSTITUTION_PRIORITY: f64 = 200.0;

/// Priority given to amenities found by the school query.
const SCHOOL_PRIORITY: f64 = 100.0;

/// Decimal places used to de-duplicate candidates.
const DEDUPE_DECIMALS: usize = 3;

/// Resolver configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    pub region: Region,
    pub ttl_business_days: u32,
    /// Candidates scoring below this fall back to the region center.
    pub min_score: Option<f64>,
    /// Results requested per query.
    pub result_limit: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            region: Region::default(),
            ttl_business_days: DEFAULT_TTL_BUSINESS_DAYS,
            min_score: None,
            result_limit: 10,
        }
    }
}

/// A cached resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedAddress {
    pub coordinate: Coordinate,
    pub cached_at: DateTime<Utc>,
}

/// Turns operator-typed addresses into coordinates.
pub struct AddressResolver {
    chain: Arc<ProviderChain>,
    clock: SharedClock,
    config: ResolverConfig,
    cache: Mutex<HashMap<String, ResolvedAddress>>,
    slots: RequestSlots,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for AddressResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressResolver")
            .field("config", &self.config)
            .field("cached", &self.cache.lock().len())
            .finish_non_exhaustive()
    }
}

impl AddressResolver {
    pub fn new(chain: Arc<ProviderChain>, clock: SharedClock, config: ResolverConfig) -> Self {
        Self::with_shutdown(chain, clock, config, CancellationToken::new())
    }

    /// Like [`new`](Self::new), with in-flight lookups tied to `shutdown`.
    pub fn with_shutdown(
        chain: Arc<ProviderChain>,
        clock: SharedClock,
        config: ResolverConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            chain,
            clock,
            config,
            cache: Mutex::new(HashMap::new()),
            slots: RequestSlots::new(shutdown.clone()),
            shutdown,
        }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolves `text` to a coordinate. Never fails.
    pub async fn resolve(&self, text: &str) -> Coordinate {
        let token = self.shutdown.child_token();
        self.resolve_with(text, &token)
            .await
            .unwrap_or(self.config.region.center)
    }

    /// Resolves `text` in a named slot, cancelling the slot's previous lookup.
    ///
    /// Returns `None` only when a newer lookup superseded this one.
    pub async fn resolve_in_slot(&self, slot: &str, text: &str) -> Option<Coordinate> {
        let ticket = self.slots.begin(slot);
        let result = self.resolve_with(text, ticket.token()).await;
        self.slots.finish(&ticket);
        result
    }

    /// Cached entry for `text`, if present and fresh.
    pub fn cached(&self, text: &str) -> Option<ResolvedAddress> {
        self.lookup_cache(&cache_key(text))
    }

    /// Number of cached entries, fresh or not.
    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    async fn resolve_with(&self, text: &str, token: &CancellationToken) -> Option<Coordinate> {
        let key = cache_key(text);
        if key.is_empty() {
            return Some(self.config.region.center);
        }
        if let Some(hit) = self.lookup_cache(&key) {
            tracing::debug!(address = %key, coordinate = %hit.coordinate, "Address cache hit");
            return Some(hit.coordinate);
        }

        let region = &self.config.region;
        let details = parse_details(text);
        let normalized = normalize_address(text, region);
        tracing::debug!(
            address = %text,
            normalized = %normalized,
            institution = ?details.institution,
            no_number = details.no_number,
            "Resolving address"
        );

        let mut pool: Vec<(GeocodeCandidate, f64)> = Vec::new();

        if let Some(institution) = &details.institution {
            let query = format!("{}, {}", institution, region.suffix());
            let found = self.search(&query, token).await?;

            if let Some(first) = found.first().filter(|c| c.kind == PlaceKind::Amenity) {
                tracing::info!(
                    address = %text,
                    match_name = %first.display_name,
                    "Institution matched directly"
                );
                let coordinate = first.coordinate;
                self.store(key, coordinate);
                return Some(coordinate);
            }

            pool.extend(found.into_iter().map(|c| {
                let priority = if c.kind.is_facility() {
                    INSTITUTION_PRIORITY
                } else {
                    0.0
                };
                (c, priority)
            }));
        }

        if details.no_number && details.institution.is_none() {
            if let Some(query) = school_query(&normalized, region) {
                let found = self.search(&query, token).await?;
                pool.extend(found.into_iter().map(|c| {
                    let priority = if c.kind == PlaceKind::Amenity {
                        SCHOOL_PRIORITY
                    } else {
                        0.0
                    };
                    (c, priority)
                }));
            }
        }

        let found = self.search(&normalized, token).await?;
        pool.extend(found.into_iter().map(|c| (c, 0.0)));

        let context = ScoringContext::new(text, region, details.no_number);
        let coordinate = match self.pick_best(pool, &context) {
            Some((candidate, score)) => {
                tracing::info!(
                    address = %text,
                    match_name = %candidate.display_name,
                    score = format!("{:.1}", score),
                    "Address resolved"
                );
                candidate.coordinate
            }
            None => {
                tracing::info!(address = %text, "No acceptable candidate, using region center");
                region.center
            }
        };

        self.store(key, coordinate);
        Some(coordinate)
    }

    /// Runs one bounded search. `None` means cancelled.
    async fn search(
        &self,
        text: &str,
        token: &CancellationToken,
    ) -> Option<Vec<GeocodeCandidate>> {
        let query = SearchQuery::new(text)
            .bounded(self.config.region.bounds)
            .with_limit(self.config.result_limit);

        match self.chain.run(|p| p.search(&query, token)).await {
            ChainOutcome::Found { value, .. } => Some(value),
            ChainOutcome::Unavailable | ChainOutcome::Empty => Some(Vec::new()),
            ChainOutcome::Cancelled => None,
        }
    }

    fn pick_best(
        &self,
        pool: Vec<(GeocodeCandidate, f64)>,
        context: &ScoringContext<'_>,
    ) -> Option<(GeocodeCandidate, f64)> {
        let mut seen = std::collections::HashSet::new();
        let mut best: Option<(GeocodeCandidate, f64)> = None;

        for (candidate, priority) in pool {
            if !seen.insert(candidate.coordinate.rounded_key(DEDUPE_DECIMALS)) {
                continue;
            }
            let score = context.score(&candidate, priority);
            tracing::trace!(name = %candidate.display_name, score, "Scored candidate");
            if best.as_ref().map_or(true, |(_, top)| score > *top) {
                best = Some((candidate, score));
            }
        }

        match (best, self.config.min_score) {
            (Some((_, score)), Some(min)) if score < min => None,
            (best, _) => best,
        }
    }

    fn lookup_cache(&self, key: &str) -> Option<ResolvedAddress> {
        let mut cache = self.cache.lock();
        let entry = *cache.get(key)?;

        let age = business_days_between(self.clock.date_of(entry.cached_at), self.clock.today());
        if age >= self.config.ttl_business_days {
            tracing::debug!(address = %key, age_business_days = age, "Evicting stale address");
            cache.remove(key);
            return None;
        }
        Some(entry)
    }

    fn store(&self, key: String, coordinate: Coordinate) {
        let entry = ResolvedAddress {
            coordinate,
            cached_at: self.clock.now(),
        };
        self.cache.lock().insert(key, entry);
    }
}

fn cache_key(text: &str) -> String {
    text.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::advisory::{Advisories, Advisory};
    use crate::clock::ManualClock;
    use crate::http::tests::{MockHttpClient, MockReply};
    use crate::http::HttpError;
    use crate::provider::{
        GeoapifyConfig, GeoapifyProvider, GeocodeProvider, NominatimConfig, NominatimProvider,
    };
    use chrono::{Duration as ChronoDuration, TimeZone};
    use serde_json::{json, Value};

    struct Fixture {
        resolver: AddressResolver,
        primary: Arc<MockHttpClient>,
        fallback: Arc<MockHttpClient>,
        clock: Arc<ManualClock>,
        advisories: Arc<Advisories>,
    }

    fn feature(name: &str, kind: &str, lat: f64, lon: f64) -> Value {
        json!({"properties": {
            "formatted": name, "result_type": kind, "lat": lat, "lon": lon,
            "rank": {"importance": 0.5}
        }})
    }

    fn fixture(primary: MockHttpClient, fallback: MockHttpClient) -> Fixture {
        let primary = Arc::new(primary);
        let fallback = Arc::new(fallback);
        let advisories = Arc::new(Advisories::new());
        let chain = ProviderChain::new(
            vec![
                Arc::new(GeoapifyProvider::new(
                    primary.clone(),
                    GeoapifyConfig::default()
                        .with_api_key("k")
                        .with_base_url("http://geoapify.test"),
                )) as Arc<dyn GeocodeProvider>,
                Arc::new(NominatimProvider::new(
                    fallback.clone(),
                    NominatimConfig::default().with_base_url("http://nominatim.test"),
                )),
            ],
            advisories.clone(),
        );
        // Monday.
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap(),
        ));
        let resolver = AddressResolver::new(
            Arc::new(chain),
            clock.clone(),
            ResolverConfig::default(),
        );
        Fixture {
            resolver,
            primary,
            fallback,
            clock,
            advisories,
        }
    }

    #[tokio::test]
    async fn test_institution_short_circuits_on_amenity() {
        let primary = MockHttpClient::new().on(
            "geoapify.test",
            MockReply::Json(
                200,
                json!({"features": [feature("Hospital Municipal, São Carlos", "amenity", -22.01, -47.89)]}),
            ),
        );
        let fx = fixture(primary, MockHttpClient::new());

        let coord = fx.resolver.resolve("Hospital Municipal, São Carlos").await;
        assert_eq!(coord.lat_lon(), (-22.01, -47.89));
        assert_eq!(fx.primary.requests().len(), 1);
        assert!(fx.fallback.requests().is_empty());
        assert_eq!(
            fx.primary.requests()[0].query_value("text"),
            Some("Hospital Municipal, são carlos, sp")
        );
    }

    #[tokio::test]
    async fn test_both_providers_down_returns_center() {
        let primary = MockHttpClient::new().on(
            "geoapify.test",
            MockReply::Error(HttpError::Connection("refused".into())),
        );
        let fallback = MockHttpClient::new().on("nominatim.test", MockReply::Status(503));
        let fx = fixture(primary, fallback);

        let coord = fx.resolver.resolve("Rua Inexistente, 99").await;
        assert_eq!(coord, Region::default().center);
        assert!(fx.advisories.was_raised(Advisory::GeocodingUnavailable));
    }

    #[tokio::test]
    async fn test_best_score_wins() {
        let primary = MockHttpClient::new().on(
            "geoapify.test",
            MockReply::Json(
                200,
                json!({"features": [
                    feature("São Paulo", "state", -23.5, -46.6),
                    feature("Rua Episcopal, Centro, São Carlos", "street", -22.017, -47.891),
                ]}),
            ),
        );
        let fx = fixture(primary, MockHttpClient::new());

        let coord = fx.resolver.resolve("Rua Episcopal, 1200, Centro").await;
        assert_eq!(coord.lat_lon(), (-22.017, -47.891));
    }

    #[tokio::test]
    async fn test_cache_hit_within_ttl() {
        let primary = MockHttpClient::new().on(
            "geoapify.test",
            MockReply::Json(
                200,
                json!({"features": [feature("Rua Episcopal, São Carlos", "street", -22.017, -47.891)]}),
            ),
        );
        let fx = fixture(primary, MockHttpClient::new());

        fx.resolver.resolve("Rua Episcopal, 1200").await;
        fx.clock.advance(ChronoDuration::days(3));
        fx.resolver.resolve("  rua episcopal, 1200 ").await;

        assert_eq!(fx.primary.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_cache_expires_after_business_days() {
        let primary = MockHttpClient::new().on(
            "geoapify.test",
            MockReply::Json(
                200,
                json!({"features": [feature("Rua Episcopal, São Carlos", "street", -22.017, -47.891)]}),
            ),
        );
        let fx = fixture(primary, MockHttpClient::new());

        fx.resolver.resolve("Rua Episcopal, 1200").await;
        // Monday + 8 calendar days = Tuesday next week: 6 business days.
        fx.clock.advance(ChronoDuration::days(8));
        assert!(fx.resolver.cached("Rua Episcopal, 1200").is_some());
        // Wednesday: 7 business days.
        fx.clock.advance(ChronoDuration::days(1));
        assert!(fx.resolver.cached("Rua Episcopal, 1200").is_none());
        assert_eq!(fx.resolver.cache_len(), 0);

        fx.resolver.resolve("Rua Episcopal, 1200").await;
        assert_eq!(fx.primary.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_future_timestamp_not_expired() {
        let primary = MockHttpClient::new().on(
            "geoapify.test",
            MockReply::Json(
                200,
                json!({"features": [feature("Rua A, São Carlos", "street", -22.0, -47.9)]}),
            ),
        );
        let fx = fixture(primary, MockHttpClient::new());

        fx.resolver.resolve("Rua A, 1").await;
        fx.clock.advance(ChronoDuration::days(-30));
        assert!(fx.resolver.cached("Rua A, 1").is_some());
    }

    #[tokio::test]
    async fn test_no_number_runs_school_query() {
        let primary = MockHttpClient::new()
            .on(
                "geoapify.test",
                MockReply::Json(
                    200,
                    json!({"features": [feature("EMEF Rua Alpha, São Carlos", "amenity", -22.02, -47.88)]}),
                ),
            )
            .on(
                "geoapify.test",
                MockReply::Json(
                    200,
                    json!({"features": [feature("Rua Alpha, São Carlos", "street", -22.03, -47.87)]}),
                ),
            );
        let fx = fixture(primary, MockHttpClient::new());

        let coord = fx.resolver.resolve("Rua Alpha, s/n").await;
        let requests = fx.primary.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(
            requests[0].query_value("text"),
            Some("escola rua alpha são carlos")
        );
        // School amenity: +100 priority and +50 no-number bonus.
        assert_eq!(coord.lat_lon(), (-22.02, -47.88));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slot_supersession() {
        let primary = MockHttpClient::new()
            .with_delay(std::time::Duration::from_secs(1))
            .on(
                "geoapify.test",
                MockReply::Json(
                    200,
                    json!({"features": [feature("Rua A, São Carlos", "street", -22.0, -47.9)]}),
                ),
            );
        let fx = Arc::new(fixture(primary, MockHttpClient::new()));

        let first = {
            let fx = fx.clone();
            tokio::spawn(async move { fx.resolver.resolve_in_slot("origin", "Rua A, 1").await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        let second = fx.resolver.resolve_in_slot("origin", "Rua B, 2").await;

        assert_eq!(first.await.unwrap(), None);
        assert!(second.is_some());
        assert!(fx.resolver.cached("Rua A, 1").is_none());
    }
}
