//! Component wiring.
//!
//! [`Engine`] builds every long-lived component once and shares it by `Arc`:
//!
//! ```text
//!                         ┌──────────────────┐
//!                         │  ProviderChain   │ Geoapify ─► Nominatim
//!                         └────────┬─────────┘
//!            ┌─────────────────────┼──────────────────────┐
//!            ▼                     ▼                      ▼
//!    AddressResolver     AutocompleteSuggester     ReverseGeocoder
//!                                  │
//!                           KeyValueStore ◄──── RouteCache
//!                                                   │
//!                                           RouteCalculator ──► OSRM
//!                                                   │
//!                                           TrackingSession ──► MapSyncBridge
//! ```
//!
//! Every component holds a child of the engine's shutdown token, so
//! [`Engine::shutdown`] cancels all in-flight work before the final cache
//! flush.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::advisory::Advisories;
use crate::autocomplete::{AutocompleteSuggester, SuggesterConfig};
use crate::bridge::{BridgeConfig, MapSyncBridge};
use crate::clock::{SharedClock, SystemClock};
use crate::config::{ConfigError, ConfigFile};
use crate::geo::Coordinate;
use crate::geocode::{AddressResolver, ResolverConfig, ReverseGeocoder};
use crate::http::{AsyncHttpClient, HttpError, ReqwestClient};
use crate::provider::{
    GeoapifyConfig, GeoapifyProvider, GeocodeProvider, NominatimConfig, NominatimProvider,
    ProviderChain, DEFAULT_RATE_LIMIT_COOLDOWN, DEFAULT_USER_AGENT,
};
use crate::routing::{
    OsrmConfig, OsrmProvider, RouteCache, RouteCalculator, RouteCalculatorConfig,
    DEFAULT_ROUTE_CACHE_DAYS,
};
use crate::store::{FileStore, KeyValueStore, StoreError};
use crate::tracking::{DriftDetector, PositionTracker, TrackingSession};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("HTTP client error: {0}")]
    Http(#[from] HttpError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),
}

/// Everything the engine needs to build its components.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub resolver: ResolverConfig,
    pub suggester: SuggesterConfig,
    pub geoapify: GeoapifyConfig,
    pub nominatim: NominatimConfig,
    pub osrm: OsrmConfig,
    pub calculator: RouteCalculatorConfig,
    /// `None` disables the persisted route cache.
    pub route_cache_days: Option<i64>,
    pub bridge: BridgeConfig,
    pub drift: DriftDetector,
    pub rate_limit_cooldown: Duration,
    pub data_dir: PathBuf,
    pub user_agent: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolver: ResolverConfig::default(),
            suggester: SuggesterConfig::default(),
            geoapify: GeoapifyConfig::default(),
            nominatim: NominatimConfig::default(),
            osrm: OsrmConfig::default(),
            calculator: RouteCalculatorConfig::default(),
            route_cache_days: Some(DEFAULT_ROUTE_CACHE_DAYS),
            bridge: BridgeConfig::default(),
            drift: DriftDetector::default(),
            rate_limit_cooldown: DEFAULT_RATE_LIMIT_COOLDOWN,
            data_dir: crate::config::default_data_dir(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl EngineConfig {
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_geoapify_api_key(mut self, key: impl Into<String>) -> Self {
        self.geoapify.api_key = Some(key.into());
        self
    }

    pub fn with_geoapify_url(mut self, url: impl Into<String>) -> Self {
        self.geoapify.base_url = url.into();
        self
    }

    pub fn with_nominatim_url(mut self, url: impl Into<String>) -> Self {
        self.nominatim.base_url = url.into();
        self
    }

    pub fn with_osrm_url(mut self, url: impl Into<String>) -> Self {
        self.osrm.base_url = url.into();
        self
    }

    pub fn with_route_cache_days(mut self, days: Option<i64>) -> Self {
        self.route_cache_days = days.filter(|d| *d > 0);
        self
    }

    pub fn with_calculator(mut self, calculator: RouteCalculatorConfig) -> Self {
        self.calculator = calculator;
        self
    }

    pub fn with_suggester(mut self, suggester: SuggesterConfig) -> Self {
        self.suggester = suggester;
        self
    }

    pub fn with_rate_limit_cooldown(mut self, cooldown: Duration) -> Self {
        self.rate_limit_cooldown = cooldown;
        self
    }
}

impl From<&ConfigFile> for EngineConfig {
    fn from(file: &ConfigFile) -> Self {
        let geo = &file.geocoding;
        let auto = &file.autocomplete;
        let routing = &file.routing;
        let tracking = &file.tracking;
        let geocode_timeout = Duration::from_secs(geo.request_timeout_secs);

        let mut geoapify = GeoapifyConfig::default()
            .with_base_url(&geo.geoapify_url)
            .with_timeout(geocode_timeout);
        geoapify.api_key = geo.geoapify_api_key.clone();

        Self {
            resolver: ResolverConfig {
                region: file.region.clone(),
                ttl_business_days: geo.cache_ttl_business_days,
                min_score: geo.min_score,
                ..ResolverConfig::default()
            },
            suggester: SuggesterConfig {
                debounce: Duration::from_millis(auto.debounce_ms),
                min_chars: auto.min_chars,
                cache_ttl: Duration::from_secs(auto.cache_ttl_days * 24 * 60 * 60),
                cache_capacity: auto.cache_capacity,
                flush_interval: Duration::from_secs(auto.flush_interval_secs),
            },
            geoapify,
            nominatim: NominatimConfig::default()
                .with_base_url(&geo.nominatim_url)
                .with_user_agent(&geo.user_agent)
                .with_timeout(geocode_timeout),
            osrm: OsrmConfig::default()
                .with_base_url(&routing.osrm_url)
                .with_timeout(Duration::from_secs(routing.request_timeout_secs)),
            calculator: RouteCalculatorConfig::default()
                .with_debounce(Duration::from_millis(routing.debounce_ms))
                .with_retry(routing.retry.policy(routing.max_attempts)),
            route_cache_days: (routing.cache_days > 0).then_some(routing.cache_days),
            bridge: BridgeConfig::default()
                .with_channel_capacity(tracking.channel_capacity)
                .with_preready(tracking.preready),
            drift: DriftDetector::new(
                tracking.drift_threshold_deg,
                Duration::from_secs(tracking.recompute_interval_secs),
            ),
            rate_limit_cooldown: Duration::from_secs(geo.rate_limit_cooldown_secs),
            data_dir: file.storage.data_dir.clone(),
            user_agent: geo.user_agent.clone(),
        }
    }
}

/// A map surface link created for one tracking session.
pub struct SurfaceLink {
    pub session: TrackingSession,
    pub bridge: Arc<MapSyncBridge>,
    /// Messages for the surface, as JSON text.
    pub outbound: mpsc::Receiver<String>,
}

/// The assembled engine.
pub struct Engine {
    config: EngineConfig,
    advisories: Arc<Advisories>,
    chain: Arc<ProviderChain>,
    resolver: Arc<AddressResolver>,
    suggester: Arc<AutocompleteSuggester>,
    reverse: Arc<ReverseGeocoder>,
    calculator: Arc<RouteCalculator>,
    store: Arc<dyn KeyValueStore>,
    shutdown: CancellationToken,
    flusher: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("resolved_cached", &self.resolver.cache_len())
            .field("suggestions_cached", &self.suggester.cache_len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Starts with the real HTTP client, a file store under the data
    /// directory and the system clock.
    pub async fn start(config: EngineConfig) -> Result<Self, EngineError> {
        let http = ReqwestClient::new(&config.user_agent)?;
        let store: Arc<dyn KeyValueStore> =
            Arc::new(FileStore::new(config.data_dir.join("cache")));
        Ok(Self::with_parts(config, http, store, Arc::new(SystemClock)).await)
    }

    /// Builds the engine around explicit collaborators.
    pub async fn with_parts<C>(
        config: EngineConfig,
        http: C,
        store: Arc<dyn KeyValueStore>,
        clock: SharedClock,
    ) -> Self
    where
        C: AsyncHttpClient + Clone + 'static,
    {
        let shutdown = CancellationToken::new();
        let advisories = Arc::new(Advisories::new());

        let providers: Vec<Arc<dyn GeocodeProvider>> = vec![
            Arc::new(GeoapifyProvider::new(http.clone(), config.geoapify.clone())),
            Arc::new(NominatimProvider::new(http.clone(), config.nominatim.clone())),
        ];
        let chain = Arc::new(
            ProviderChain::new(providers, Arc::clone(&advisories))
                .with_cooldown(config.rate_limit_cooldown),
        );

        let resolver = Arc::new(AddressResolver::with_shutdown(
            Arc::clone(&chain),
            Arc::clone(&clock),
            config.resolver.clone(),
            shutdown.child_token(),
        ));
        let reverse = Arc::new(ReverseGeocoder::with_shutdown(
            Arc::clone(&chain),
            shutdown.child_token(),
        ));
        let suggester = Arc::new(
            AutocompleteSuggester::load(
                Arc::clone(&chain),
                Arc::clone(&store),
                Arc::clone(&clock),
                config.suggester.clone(),
                shutdown.child_token(),
            )
            .await,
        );
        let flusher = suggester.spawn_flusher();

        let osrm = OsrmProvider::new(http, config.osrm.clone());
        let mut calculator = RouteCalculator::with_shutdown(
            Arc::new(osrm),
            config.calculator.clone(),
            shutdown.child_token(),
        );
        if let Some(days) = config.route_cache_days {
            calculator = calculator.with_cache(
                RouteCache::new(Arc::clone(&store), Arc::clone(&clock)).with_ttl_days(days),
            );
        }

        tracing::info!(
            region = %config.resolver.region.name,
            geoapify_configured = config.geoapify.api_key.is_some(),
            route_cache = config.route_cache_days.is_some(),
            "Engine started"
        );

        Self {
            config,
            advisories,
            chain,
            resolver,
            suggester,
            reverse,
            calculator: Arc::new(calculator),
            store,
            shutdown,
            flusher: Mutex::new(Some(flusher)),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn advisories(&self) -> &Arc<Advisories> {
        &self.advisories
    }

    pub fn provider_chain(&self) -> &Arc<ProviderChain> {
        &self.chain
    }

    pub fn resolver(&self) -> &Arc<AddressResolver> {
        &self.resolver
    }

    pub fn suggester(&self) -> &Arc<AutocompleteSuggester> {
        &self.suggester
    }

    pub fn reverse_geocoder(&self) -> &Arc<ReverseGeocoder> {
        &self.reverse
    }

    pub fn route_calculator(&self) -> &Arc<RouteCalculator> {
        &self.calculator
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Creates a tracking session toward `destination` with its own bridge.
    pub fn tracking_session(&self, destination: Coordinate) -> SurfaceLink {
        let (bridge, outbound) = MapSyncBridge::new(self.config.bridge.clone());
        let bridge = Arc::new(bridge);
        let session = TrackingSession::new(
            Arc::clone(&self.calculator),
            Arc::clone(&bridge),
            destination,
            self.shutdown.child_token(),
        )
        .with_tracker(PositionTracker::new().with_drift(self.config.drift.clone()));
        SurfaceLink {
            session,
            bridge,
            outbound,
        }
    }

    /// Cancels in-flight work and waits for the final cache flush.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let flusher = self.flusher.lock().take();
        if let Some(handle) = flusher {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Autocomplete flusher task failed");
            }
        }
        tracing::info!("Engine stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::autocomplete::AUTOCOMPLETE_CACHE_KEY;
    use crate::clock::ManualClock;
    use crate::config::ConfigKey;
    use crate::http::tests::{MockHttpClient, MockReply};
    use crate::routing::{RetryPolicy, RouteOutcome};
    use crate::store::MemoryStore;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn test_config() -> EngineConfig {
        EngineConfig::default()
            .with_geoapify_api_key("k")
            .with_geoapify_url("http://geoapify.test")
            .with_nominatim_url("http://nominatim.test")
            .with_osrm_url("http://osrm.test")
    }

    async fn engine(http: MockHttpClient, store: Arc<MemoryStore>) -> Engine {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 4, 12, 0, 0).unwrap(),
        ));
        Engine::with_parts(test_config(), Arc::new(http), store, clock).await
    }

    #[test]
    fn test_config_from_file() {
        let mut file = ConfigFile::default();
        ConfigKey::RoutingCacheDays.set(&mut file, "0").unwrap();
        ConfigKey::RoutingMaxAttempts.set(&mut file, "5").unwrap();
        ConfigKey::GeocodingGeoapifyApiKey.set(&mut file, "abc").unwrap();
        ConfigKey::AutocompleteDebounceMs.set(&mut file, "150").unwrap();

        let config = EngineConfig::from(&file);
        assert_eq!(config.route_cache_days, None);
        assert_eq!(config.calculator.retry.max_attempts(), 5);
        assert_eq!(config.geoapify.api_key.as_deref(), Some("abc"));
        assert_eq!(config.suggester.debounce, Duration::from_millis(150));
        assert_eq!(config.resolver.region, file.region);
    }

    #[test]
    fn test_config_fixed_retry() {
        let mut file = ConfigFile::default();
        ConfigKey::RoutingRetry.set(&mut file, "fixed").unwrap();
        ConfigKey::RoutingMaxAttempts.set(&mut file, "4").unwrap();

        let config = EngineConfig::from(&file);
        assert_eq!(
            config.calculator.retry,
            RetryPolicy::fixed(4, Duration::from_secs(1))
        );
        assert_eq!(ConfigKey::RoutingRetry.get(&file), "fixed");
    }

    #[tokio::test(start_paused = true)]
    async fn test_engine_routes_and_caches() {
        let http = MockHttpClient::new().on(
            "osrm.test",
            MockReply::Json(200, crate::routing::sample_route_body()),
        );
        let store = Arc::new(MemoryStore::new());
        let engine = engine(http, store.clone()).await;

        let a = Coordinate::new(-22.0, -47.9).unwrap();
        let b = Coordinate::new(-22.05, -47.95).unwrap();
        let outcome = engine.route_calculator().compute_route(a, b).await;
        assert!(matches!(outcome, RouteOutcome::Succeeded(_)));
        // Route cache written through the shared store.
        assert!(!store.is_empty());

        engine.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_flushes_suggestions() {
        let http = MockHttpClient::new().on(
            "geoapify.test/v1/geocode/autocomplete",
            MockReply::Json(
                200,
                json!({"features": [{"properties": {
                    "formatted": "Rua Episcopal, São Carlos", "lat": -22.017, "lon": -47.891
                }}]}),
            ),
        );
        let store = Arc::new(MemoryStore::new());
        let engine = engine(http, store.clone()).await;

        let found = engine.suggester().suggest("origin", "Rua Episc").await;
        assert_eq!(found.map(|s| s.len()), Some(1));

        engine.shutdown().await;
        let saved = store.get(AUTOCOMPLETE_CACHE_KEY).await.unwrap();
        assert!(saved.unwrap().contains("rua episc"));
    }
}
