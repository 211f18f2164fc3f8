//! INI configuration file.
//!
//! The file lives at `<config dir>/vitalroute/config.ini` and every key is
//! optional; anything missing takes its built-in default.
//!
//! ```ini
//! [region]
//! name = são carlos
//! state = sp
//! center = -22.0086,-47.8908
//!
//! [geocoding]
//! geoapify_api_key = ...
//!
//! [routing]
//! osrm_url = https://router.project-osrm.org
//! max_attempts = 3
//! retry = exponential
//! ```
//!
//! [`ConfigKey`] is the single list of known keys. Loading, saving and the
//! CLI `config get/set/list` commands all go through it, so a key only has
//! to be added in one place.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::Ini;
use thiserror::Error;

use crate::autocomplete::{
    DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_TTL, DEFAULT_DEBOUNCE, DEFAULT_FLUSH_INTERVAL,
    DEFAULT_MIN_CHARS,
};
use crate::bridge::{PrereadyPolicy, DEFAULT_CHANNEL_CAPACITY};
use crate::geo::{Coordinate, GeoBounds};
use crate::geocode::{Region, DEFAULT_TTL_BUSINESS_DAYS};
use crate::http::DEFAULT_REQUEST_TIMEOUT;
use crate::provider::{
    DEFAULT_GEOAPIFY_BASE_URL, DEFAULT_NOMINATIM_BASE_URL, DEFAULT_RATE_LIMIT_COOLDOWN,
    DEFAULT_USER_AGENT,
};
use crate::routing::{
    RetryMode, DEFAULT_MAX_ATTEMPTS, DEFAULT_OSRM_BASE_URL, DEFAULT_ROUTE_CACHE_DAYS,
    DEFAULT_ROUTE_DEBOUNCE,
};
use crate::tracking::{DEFAULT_DRIFT_THRESHOLD_DEG, DEFAULT_RECOMPUTE_INTERVAL};

/// Configuration file name inside the config directory.
pub const CONFIG_FILE_NAME: &str = "config.ini";

const APP_DIR: &str = "vitalroute";

const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// `<config dir>/vitalroute`, or `./vitalroute` when the platform has none.
pub fn config_directory() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

pub fn config_file_path() -> PathBuf {
    config_directory().join(CONFIG_FILE_NAME)
}

/// Default directory for persisted caches.
pub fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(String),

    #[error("Unknown configuration key '{0}'")]
    UnknownKey(String),

    #[error("Invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

// =============================================================================
// Sections
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct GeocodingSettings {
    pub geoapify_api_key: Option<String>,
    pub geoapify_url: String,
    pub nominatim_url: String,
    pub user_agent: String,
    pub request_timeout_secs: u64,
    pub cache_ttl_business_days: u32,
    pub min_score: Option<f64>,
    pub rate_limit_cooldown_secs: u64,
}

impl Default for GeocodingSettings {
    fn default() -> Self {
        Self {
            geoapify_api_key: None,
            geoapify_url: DEFAULT_GEOAPIFY_BASE_URL.to_string(),
            nominatim_url: DEFAULT_NOMINATIM_BASE_URL.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            cache_ttl_business_days: DEFAULT_TTL_BUSINESS_DAYS,
            min_score: None,
            rate_limit_cooldown_secs: DEFAULT_RATE_LIMIT_COOLDOWN.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AutocompleteSettings {
    pub debounce_ms: u64,
    pub min_chars: usize,
    pub cache_capacity: usize,
    pub cache_ttl_days: u64,
    pub flush_interval_secs: u64,
}

impl Default for AutocompleteSettings {
    fn default() -> Self {
        Self {
            debounce_ms: DEFAULT_DEBOUNCE.as_millis() as u64,
            min_chars: DEFAULT_MIN_CHARS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_ttl_days: DEFAULT_CACHE_TTL.as_secs() / SECS_PER_DAY,
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL.as_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoutingSettings {
    pub osrm_url: String,
    pub debounce_ms: u64,
    pub max_attempts: u32,
    pub retry: RetryMode,
    pub request_timeout_secs: u64,
    /// Zero disables the persisted route cache.
    pub cache_days: i64,
}

impl Default for RoutingSettings {
    fn default() -> Self {
        Self {
            osrm_url: DEFAULT_OSRM_BASE_URL.to_string(),
            debounce_ms: DEFAULT_ROUTE_DEBOUNCE.as_millis() as u64,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry: RetryMode::default(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT.as_secs(),
            cache_days: DEFAULT_ROUTE_CACHE_DAYS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackingSettings {
    pub drift_threshold_deg: f64,
    pub recompute_interval_secs: u64,
    pub channel_capacity: usize,
    pub preready: PrereadyPolicy,
}

impl Default for TrackingSettings {
    fn default() -> Self {
        Self {
            drift_threshold_deg: DEFAULT_DRIFT_THRESHOLD_DEG,
            recompute_interval_secs: DEFAULT_RECOMPUTE_INTERVAL.as_secs(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            preready: PrereadyPolicy::Coalesce,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StorageSettings {
    pub data_dir: PathBuf,
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// `tracing` filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Daily log files go here when set.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

/// Parsed configuration file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub region: Region,
    pub geocoding: GeocodingSettings,
    pub autocomplete: AutocompleteSettings,
    pub routing: RoutingSettings,
    pub tracking: TrackingSettings,
    pub storage: StorageSettings,
    pub logging: LoggingSettings,
}

impl ConfigFile {
    /// Loads from [`config_file_path`]; a missing file gives defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    /// Parses INI text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        for key in ConfigKey::all() {
            let value = ini
                .section(Some(key.section()))
                .and_then(|section| section.get(key.key_name()));
            if let Some(value) = value {
                key.set(&mut config, value)?;
            }
        }
        Ok(config)
    }

    /// Saves to [`config_file_path`].
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&config_file_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.to_ini().write_to_file(path)?;
        Ok(())
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        for key in ConfigKey::all() {
            let value = key.get(self);
            if !value.is_empty() {
                ini.with_section(Some(key.section()))
                    .set(key.key_name(), value);
            }
        }
        ini
    }
}

// =============================================================================
// Keys
// =============================================================================

/// Every recognised `section.key`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    RegionName,
    RegionState,
    RegionCenter,
    RegionBounds,
    RegionFarThreshold,

    GeocodingGeoapifyApiKey,
    GeocodingGeoapifyUrl,
    GeocodingNominatimUrl,
    GeocodingUserAgent,
    GeocodingRequestTimeout,
    GeocodingCacheTtlBusinessDays,
    GeocodingMinScore,
    GeocodingRateLimitCooldown,

    AutocompleteDebounceMs,
    AutocompleteMinChars,
    AutocompleteCacheCapacity,
    AutocompleteCacheTtlDays,
    AutocompleteFlushInterval,

    RoutingOsrmUrl,
    RoutingDebounceMs,
    RoutingMaxAttempts,
    RoutingRetry,
    RoutingRequestTimeout,
    RoutingCacheDays,

    TrackingDriftThreshold,
    TrackingRecomputeInterval,
    TrackingChannelCapacity,
    TrackingPreready,

    StorageDataDir,

    LoggingLevel,
    LoggingDirectory,
}

impl ConfigKey {
    pub fn all() -> &'static [ConfigKey] {
        use ConfigKey::*;
        &[
            RegionName,
            RegionState,
            RegionCenter,
            RegionBounds,
            RegionFarThreshold,
            GeocodingGeoapifyApiKey,
            GeocodingGeoapifyUrl,
            GeocodingNominatimUrl,
            GeocodingUserAgent,
            GeocodingRequestTimeout,
            GeocodingCacheTtlBusinessDays,
            GeocodingMinScore,
            GeocodingRateLimitCooldown,
            AutocompleteDebounceMs,
            AutocompleteMinChars,
            AutocompleteCacheCapacity,
            AutocompleteCacheTtlDays,
            AutocompleteFlushInterval,
            RoutingOsrmUrl,
            RoutingDebounceMs,
            RoutingMaxAttempts,
            RoutingRetry,
            RoutingRequestTimeout,
            RoutingCacheDays,
            TrackingDriftThreshold,
            TrackingRecomputeInterval,
            TrackingChannelCapacity,
            TrackingPreready,
            StorageDataDir,
            LoggingLevel,
            LoggingDirectory,
        ]
    }

    pub fn section(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            RegionName | RegionState | RegionCenter | RegionBounds | RegionFarThreshold => "region",
            GeocodingGeoapifyApiKey
            | GeocodingGeoapifyUrl
            | GeocodingNominatimUrl
            | GeocodingUserAgent
            | GeocodingRequestTimeout
            | GeocodingCacheTtlBusinessDays
            | GeocodingMinScore
            | GeocodingRateLimitCooldown => "geocoding",
            AutocompleteDebounceMs
            | AutocompleteMinChars
            | AutocompleteCacheCapacity
            | AutocompleteCacheTtlDays
            | AutocompleteFlushInterval => "autocomplete",
            RoutingOsrmUrl
            | RoutingDebounceMs
            | RoutingMaxAttempts
            | RoutingRetry
            | RoutingRequestTimeout
            | RoutingCacheDays => "routing",
            TrackingDriftThreshold
            | TrackingRecomputeInterval
            | TrackingChannelCapacity
            | TrackingPreready => "tracking",
            StorageDataDir => "storage",
            LoggingLevel | LoggingDirectory => "logging",
        }
    }

    pub fn key_name(&self) -> &'static str {
        use ConfigKey::*;
        match self {
            RegionName => "name",
            RegionState => "state",
            RegionCenter => "center",
            RegionBounds => "bounds",
            RegionFarThreshold => "far_threshold",
            GeocodingGeoapifyApiKey => "geoapify_api_key",
            GeocodingGeoapifyUrl => "geoapify_url",
            GeocodingNominatimUrl => "nominatim_url",
            GeocodingUserAgent => "user_agent",
            GeocodingRequestTimeout => "request_timeout_secs",
            GeocodingCacheTtlBusinessDays => "cache_ttl_business_days",
            GeocodingMinScore => "min_score",
            GeocodingRateLimitCooldown => "rate_limit_cooldown_secs",
            AutocompleteDebounceMs => "debounce_ms",
            AutocompleteMinChars => "min_chars",
            AutocompleteCacheCapacity => "cache_capacity",
            AutocompleteCacheTtlDays => "cache_ttl_days",
            AutocompleteFlushInterval => "flush_interval_secs",
            RoutingOsrmUrl => "osrm_url",
            RoutingDebounceMs => "debounce_ms",
            RoutingMaxAttempts => "max_attempts",
            RoutingRetry => "retry",
            RoutingRequestTimeout => "request_timeout_secs",
            RoutingCacheDays => "cache_days",
            TrackingDriftThreshold => "drift_threshold_deg",
            TrackingRecomputeInterval => "recompute_interval_secs",
            TrackingChannelCapacity => "channel_capacity",
            TrackingPreready => "preready",
            StorageDataDir => "data_dir",
            LoggingLevel => "level",
            LoggingDirectory => "directory",
        }
    }

    /// `section.key`.
    pub fn name(&self) -> String {
        format!("{}.{}", self.section(), self.key_name())
    }

    /// Current value as text; empty when unset.
    pub fn get(&self, config: &ConfigFile) -> String {
        use ConfigKey::*;
        let region = &config.region;
        let geo = &config.geocoding;
        let auto = &config.autocomplete;
        let routing = &config.routing;
        let tracking = &config.tracking;
        match self {
            RegionName => region.name.clone(),
            RegionState => region.state.clone(),
            RegionCenter => format!(
                "{},{}",
                region.center.latitude(),
                region.center.longitude()
            ),
            RegionBounds => format!(
                "{},{},{},{}",
                region.bounds.min_lat,
                region.bounds.min_lon,
                region.bounds.max_lat,
                region.bounds.max_lon
            ),
            RegionFarThreshold => region.far_threshold_deg.to_string(),
            GeocodingGeoapifyApiKey => geo.geoapify_api_key.clone().unwrap_or_default(),
            GeocodingGeoapifyUrl => geo.geoapify_url.clone(),
            GeocodingNominatimUrl => geo.nominatim_url.clone(),
            GeocodingUserAgent => geo.user_agent.clone(),
            GeocodingRequestTimeout => geo.request_timeout_secs.to_string(),
            GeocodingCacheTtlBusinessDays => geo.cache_ttl_business_days.to_string(),
            GeocodingMinScore => geo.min_score.map(|s| s.to_string()).unwrap_or_default(),
            GeocodingRateLimitCooldown => geo.rate_limit_cooldown_secs.to_string(),
            AutocompleteDebounceMs => auto.debounce_ms.to_string(),
            AutocompleteMinChars => auto.min_chars.to_string(),
            AutocompleteCacheCapacity => auto.cache_capacity.to_string(),
            AutocompleteCacheTtlDays => auto.cache_ttl_days.to_string(),
            AutocompleteFlushInterval => auto.flush_interval_secs.to_string(),
            RoutingOsrmUrl => routing.osrm_url.clone(),
            RoutingDebounceMs => routing.debounce_ms.to_string(),
            RoutingMaxAttempts => routing.max_attempts.to_string(),
            RoutingRetry => routing.retry.as_str().to_string(),
            RoutingRequestTimeout => routing.request_timeout_secs.to_string(),
            RoutingCacheDays => routing.cache_days.to_string(),
            TrackingDriftThreshold => tracking.drift_threshold_deg.to_string(),
            TrackingRecomputeInterval => tracking.recompute_interval_secs.to_string(),
            TrackingChannelCapacity => tracking.channel_capacity.to_string(),
            TrackingPreready => match tracking.preready {
                PrereadyPolicy::Coalesce => "coalesce".to_string(),
                PrereadyPolicy::Drop => "drop".to_string(),
            },
            StorageDataDir => config.storage.data_dir.display().to_string(),
            LoggingLevel => config.logging.level.clone(),
            LoggingDirectory => config
                .logging
                .directory
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_default(),
        }
    }

    /// Parses `value` into `config`. Empty clears optional keys.
    pub fn set(&self, config: &mut ConfigFile, value: &str) -> Result<(), ConfigError> {
        use ConfigKey::*;
        let value = value.trim();
        match self {
            RegionName => config.region.name = value.to_lowercase(),
            RegionState => config.region.state = value.to_lowercase(),
            RegionCenter => config.region.center = self.parse_coordinate(value)?,
            RegionBounds => config.region.bounds = self.parse_bounds(value)?,
            RegionFarThreshold => config.region.far_threshold_deg = self.parse(value)?,
            GeocodingGeoapifyApiKey => config.geocoding.geoapify_api_key = non_empty(value),
            GeocodingGeoapifyUrl => config.geocoding.geoapify_url = self.required(value)?,
            GeocodingNominatimUrl => config.geocoding.nominatim_url = self.required(value)?,
            GeocodingUserAgent => config.geocoding.user_agent = self.required(value)?,
            GeocodingRequestTimeout => {
                config.geocoding.request_timeout_secs = self.parse_positive(value)?
            }
            GeocodingCacheTtlBusinessDays => {
                config.geocoding.cache_ttl_business_days = self.parse(value)?
            }
            GeocodingMinScore => {
                config.geocoding.min_score = match non_empty(value) {
                    Some(v) => Some(self.parse(&v)?),
                    None => None,
                }
            }
            GeocodingRateLimitCooldown => {
                config.geocoding.rate_limit_cooldown_secs = self.parse(value)?
            }
            AutocompleteDebounceMs => config.autocomplete.debounce_ms = self.parse(value)?,
            AutocompleteMinChars => config.autocomplete.min_chars = self.parse(value)?,
            AutocompleteCacheCapacity => {
                config.autocomplete.cache_capacity = self.parse_positive(value)?
            }
            AutocompleteCacheTtlDays => config.autocomplete.cache_ttl_days = self.parse(value)?,
            AutocompleteFlushInterval => {
                config.autocomplete.flush_interval_secs = self.parse_positive(value)?
            }
            RoutingOsrmUrl => config.routing.osrm_url = self.required(value)?,
            RoutingDebounceMs => config.routing.debounce_ms = self.parse(value)?,
            RoutingMaxAttempts => config.routing.max_attempts = self.parse_positive(value)?,
            RoutingRetry => {
                config.routing.retry = match value.to_lowercase().as_str() {
                    "fixed" => RetryMode::Fixed,
                    "exponential" => RetryMode::Exponential,
                    _ => return Err(self.invalid(value, "expected 'fixed' or 'exponential'")),
                }
            }
            RoutingRequestTimeout => {
                config.routing.request_timeout_secs = self.parse_positive(value)?
            }
            RoutingCacheDays => config.routing.cache_days = self.parse(value)?,
            TrackingDriftThreshold => config.tracking.drift_threshold_deg = self.parse(value)?,
            TrackingRecomputeInterval => {
                config.tracking.recompute_interval_secs = self.parse(value)?
            }
            TrackingChannelCapacity => {
                config.tracking.channel_capacity = self.parse_positive(value)?
            }
            TrackingPreready => {
                config.tracking.preready = match value.to_lowercase().as_str() {
                    "coalesce" => PrereadyPolicy::Coalesce,
                    "drop" => PrereadyPolicy::Drop,
                    _ => return Err(self.invalid(value, "expected 'coalesce' or 'drop'")),
                }
            }
            StorageDataDir => config.storage.data_dir = PathBuf::from(self.required(value)?),
            LoggingLevel => config.logging.level = self.required(value)?,
            LoggingDirectory => config.logging.directory = non_empty(value).map(PathBuf::from),
        }
        Ok(())
    }

    fn invalid(&self, value: &str, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidValue {
            key: self.name(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }

    fn required(&self, value: &str) -> Result<String, ConfigError> {
        non_empty(value).ok_or_else(|| self.invalid(value, "must not be empty"))
    }

    fn parse<T>(&self, value: &str) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        value.parse().map_err(|e: T::Err| self.invalid(value, e.to_string()))
    }

    fn parse_positive<T>(&self, value: &str) -> Result<T, ConfigError>
    where
        T: FromStr + Default + PartialOrd,
        T::Err: fmt::Display,
    {
        let parsed: T = self.parse(value)?;
        if parsed <= T::default() {
            return Err(self.invalid(value, "must be greater than zero"));
        }
        Ok(parsed)
    }

    fn parse_numbers(&self, value: &str, expected: usize) -> Result<Vec<f64>, ConfigError> {
        let numbers = value
            .split(',')
            .map(|part| self.parse::<f64>(part.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        if numbers.len() != expected {
            return Err(self.invalid(value, format!("expected {} comma-separated numbers", expected)));
        }
        Ok(numbers)
    }

    fn parse_coordinate(&self, value: &str) -> Result<Coordinate, ConfigError> {
        let numbers = self.parse_numbers(value, 2)?;
        Coordinate::new(numbers[0], numbers[1]).map_err(|e| self.invalid(value, e.to_string()))
    }

    fn parse_bounds(&self, value: &str) -> Result<GeoBounds, ConfigError> {
        let n = self.parse_numbers(value, 4)?;
        let corners = [
            Coordinate::new(n[0], n[1]),
            Coordinate::new(n[2], n[3]),
        ];
        for corner in &corners {
            if let Err(e) = corner {
                return Err(self.invalid(value, e.to_string()));
            }
        }
        if n[0] > n[2] || n[1] > n[3] {
            return Err(self.invalid(value, "expected min_lat,min_lon,max_lat,max_lon"));
        }
        Ok(GeoBounds::new(n[0], n[1], n[2], n[3]))
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        ConfigKey::all()
            .iter()
            .copied()
            .find(|key| key.name() == wanted)
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
