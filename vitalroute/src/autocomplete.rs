//! Debounced type-ahead suggestions.
//!
//! Each input field owns a slot. A keystroke starts a new request in the
//! field's slot, cancelling the previous one, and waits out the debounce
//! window before asking the providers. Answers are cached per normalized
//! query and the cache is persisted through a [`KeyValueStore`].
//!
//! ```text
//!  suggest(slot, text)
//!     │ len < 3 ──────────────────────────────► []
//!     │ cached ───────────────────────────────► hit
//!     ▼
//!  debounce 300 ms ──(newer keystroke)────────► None
//!     ▼
//!  provider chain ──(Found)──► cache ─────────► suggestions
//!                 └─(Unavailable)─────────────► []
//! ```
//!
//! # Persistence
//!
//! The cache is stored under [`AUTOCOMPLETE_CACHE_KEY`] as a flat JSON map
//! `query → {"data": [...], "timestamp": <ms>}`. [`AutocompleteSuggester::spawn_flusher`]
//! writes it every [`DEFAULT_FLUSH_INTERVAL`] and once more on shutdown.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::clock::SharedClock;
use crate::http::RequestSlots;
use crate::provider::{ChainOutcome, ProviderChain, Suggestion};
use crate::store::{KeyValueStore, StoreError};

/// Store key of the persisted cache.
pub const AUTOCOMPLETE_CACHE_KEY: &str = "autocomplete_cache";

/// Quiet period after the last keystroke before a request is sent.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(300);

/// Shorter (trimmed) inputs get no suggestions.
pub const DEFAULT_MIN_CHARS: usize = 3;

/// Cached answers older than this are discarded.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Maximum cached queries; the oldest insertion is evicted first.
pub const DEFAULT_CACHE_CAPACITY: usize = 500;

/// Interval between background cache writes.
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(120);

/// Suggester configuration.
#[derive(Debug, Clone)]
pub struct SuggesterConfig {
    pub debounce: Duration,
    pub min_chars: usize,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,
    pub flush_interval: Duration,
}

impl Default for SuggesterConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_DEBOUNCE,
            min_chars: DEFAULT_MIN_CHARS,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
        }
    }
}

impl SuggesterConfig {
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_flush_interval(mut self, interval: Duration) -> Self {
        self.flush_interval = interval;
        self
    }
}

// =============================================================================
// Cache
// =============================================================================

/// One persisted cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedSuggestions {
    pub data: Vec<Suggestion>,
    /// Insertion time, ms since the Unix epoch.
    pub timestamp: i64,
}

/// Bounded FIFO cache of suggestions with a TTL.
#[derive(Debug)]
pub struct SuggestionCache {
    entries: HashMap<String, CachedSuggestions>,
    order: VecDeque<String>,
    capacity: usize,
    ttl_ms: i64,
    dirty: bool,
}

impl SuggestionCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity,
            ttl_ms: i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX),
            dirty: false,
        }
    }

    /// Rebuilds a cache from its persisted JSON, dropping expired entries.
    ///
    /// Entries are re-inserted oldest first so FIFO order survives restarts.
    pub fn from_json(
        json: &str,
        capacity: usize,
        ttl: Duration,
        now_ms: i64,
    ) -> Result<Self, serde_json::Error> {
        let stored: HashMap<String, CachedSuggestions> = serde_json::from_str(json)?;
        let mut entries: Vec<(String, CachedSuggestions)> = stored.into_iter().collect();
        entries.sort_by(|a, b| a.1.timestamp.cmp(&b.1.timestamp).then_with(|| a.0.cmp(&b.0)));

        let mut cache = Self::new(capacity, ttl);
        for (query, entry) in entries {
            if !cache.is_expired(&entry, now_ms) {
                cache.insert_entry(query, entry);
            }
        }
        cache.dirty = false;
        Ok(cache)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Fresh entry for `query`; an expired one is removed.
    pub fn get(&mut self, query: &str, now_ms: i64) -> Option<Vec<Suggestion>> {
        let expired = self.is_expired(self.entries.get(query)?, now_ms);
        if expired {
            self.entries.remove(query);
            self.order.retain(|q| q != query);
            self.dirty = true;
            return None;
        }
        self.entries.get(query).map(|entry| entry.data.clone())
    }

    /// Stores `data` for `query`, evicting the oldest entries past capacity.
    pub fn insert(&mut self, query: String, data: Vec<Suggestion>, now_ms: i64) {
        self.insert_entry(
            query,
            CachedSuggestions {
                data,
                timestamp: now_ms,
            },
        );
    }

    fn insert_entry(&mut self, query: String, entry: CachedSuggestions) {
        if self.entries.insert(query.clone(), entry).is_some() {
            self.order.retain(|q| *q != query);
        }
        self.order.push_back(query);
        self.dirty = true;

        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    /// Drops expired entries and returns the rest for persisting.
    ///
    /// Clears the dirty flag; returns `None` when nothing changed.
    pub fn take_snapshot(&mut self, now_ms: i64) -> Option<HashMap<String, CachedSuggestions>> {
        let before = self.entries.len();
        let ttl_ms = self.ttl_ms;
        self.entries
            .retain(|_, entry| now_ms.saturating_sub(entry.timestamp) < ttl_ms);
        if self.entries.len() != before {
            let entries = &self.entries;
            self.order.retain(|q| entries.contains_key(q));
            self.dirty = true;
        }

        if !self.dirty {
            return None;
        }
        self.dirty = false;
        Some(self.entries.clone())
    }

    fn is_expired(&self, entry: &CachedSuggestions, now_ms: i64) -> bool {
        now_ms.saturating_sub(entry.timestamp) >= self.ttl_ms
    }
}

// =============================================================================
// Suggester
// =============================================================================

/// Type-ahead suggestions over the geocoding provider chain.
pub struct AutocompleteSuggester {
    chain: Arc<ProviderChain>,
    store: Arc<dyn KeyValueStore>,
    clock: SharedClock,
    config: SuggesterConfig,
    cache: Mutex<SuggestionCache>,
    slots: RequestSlots,
    shutdown: CancellationToken,
}

impl std::fmt::Debug for AutocompleteSuggester {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutocompleteSuggester")
            .field("config", &self.config)
            .field("cached", &self.cache.lock().len())
            .finish_non_exhaustive()
    }
}

impl AutocompleteSuggester {
    /// Creates a suggester, loading any persisted cache from `store`.
    ///
    /// A missing or unreadable cache starts empty.
    pub async fn load(
        chain: Arc<ProviderChain>,
        store: Arc<dyn KeyValueStore>,
        clock: SharedClock,
        config: SuggesterConfig,
        shutdown: CancellationToken,
    ) -> Self {
        let now_ms = clock.now_millis();
        let cache = match store.get(AUTOCOMPLETE_CACHE_KEY).await {
            Ok(Some(json)) => {
                match SuggestionCache::from_json(&json, config.cache_capacity, config.cache_ttl, now_ms)
                {
                    Ok(cache) => {
                        tracing::info!(entries = cache.len(), "Loaded autocomplete cache");
                        cache
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Discarding unreadable autocomplete cache");
                        SuggestionCache::new(config.cache_capacity, config.cache_ttl)
                    }
                }
            }
            Ok(None) => SuggestionCache::new(config.cache_capacity, config.cache_ttl),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read autocomplete cache");
                SuggestionCache::new(config.cache_capacity, config.cache_ttl)
            }
        };

        Self {
            chain,
            store,
            clock,
            slots: RequestSlots::new(shutdown.clone()),
            cache: Mutex::new(cache),
            config,
            shutdown,
        }
    }

    pub fn config(&self) -> &SuggesterConfig {
        &self.config
    }

    /// Number of cached queries.
    pub fn cache_len(&self) -> usize {
        self.cache.lock().len()
    }

    /// Suggestions for `partial` typed into `slot`.
    ///
    /// Returns `None` when a newer keystroke in the same slot superseded
    /// this call.
    pub async fn suggest(&self, slot: &str, partial: &str) -> Option<Vec<Suggestion>> {
        let ticket = self.slots.begin(slot);
        let result = self.suggest_with(partial, ticket.token()).await;
        self.slots.finish(&ticket);
        result
    }

    async fn suggest_with(&self, partial: &str, token: &CancellationToken) -> Option<Vec<Suggestion>> {
        let text = partial.trim();
        if text.chars().count() < self.config.min_chars {
            return Some(Vec::new());
        }

        let key = text.to_lowercase();
        let cached = self.cache.lock().get(&key, self.clock.now_millis());
        if let Some(hit) = cached {
            tracing::debug!(query = %key, results = hit.len(), "Autocomplete cache hit");
            return Some(hit);
        }

        tokio::select! {
            biased;
            _ = token.cancelled() => return None,
            _ = tokio::time::sleep(self.config.debounce) => {}
        }

        match self.chain.run(|p| p.autocomplete(text, token)).await {
            ChainOutcome::Found { value, served_by } => {
                tracing::debug!(query = %key, results = value.len(), served_by, "Autocomplete answered");
                self.cache
                    .lock()
                    .insert(key, value.clone(), self.clock.now_millis());
                if token.is_cancelled() {
                    return None;
                }
                Some(value)
            }
            ChainOutcome::Unavailable | ChainOutcome::Empty => Some(Vec::new()),
            ChainOutcome::Cancelled => None,
        }
    }

    /// Cancels any in-flight request in `slot`.
    pub fn cancel(&self, slot: &str) {
        self.slots.cancel(slot);
    }

    /// Writes the cache to the store if it changed since the last flush.
    pub async fn flush(&self) -> Result<(), StoreError> {
        let snapshot = self.cache.lock().take_snapshot(self.clock.now_millis());
        let Some(snapshot) = snapshot else {
            return Ok(());
        };

        let json = serde_json::to_string(&snapshot)?;
        self.store.set(AUTOCOMPLETE_CACHE_KEY, json).await?;
        tracing::debug!(entries = snapshot.len(), "Flushed autocomplete cache");
        Ok(())
    }

    /// Spawns the periodic flush task. It flushes once more and exits when
    /// the shutdown token fires.
    pub fn spawn_flusher(self: &Arc<Self>) -> JoinHandle<()> {
        let suggester = Arc::clone(self);
        tokio::spawn(async move {
            let period = suggester.config.flush_interval;
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);

            loop {
                tokio::select! {
                    biased;

                    _ = suggester.shutdown.cancelled() => break,

                    _ = ticker.tick() => {
                        if let Err(e) = suggester.flush().await {
                            tracing::warn!(error = %e, "Autocomplete cache flush failed");
                        }
                    }
                }
            }

            if let Err(e) = suggester.flush().await {
                tracing::warn!(error = %e, "Final autocomplete cache flush failed");
            }
            tracing::debug!("Autocomplete flusher stopped");
        })
    }
}
