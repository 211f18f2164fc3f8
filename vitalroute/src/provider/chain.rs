//! Ordered provider fallback.
//!
//! The chain asks each provider in order and returns the first answer. A
//! rate-limited or failing provider is skipped for the current call; a
//! rate-limited one is also benched for a short cooldown so a burst of
//! keystrokes does not hammer a service that already said no.
//!
//! # State Machine (per provider)
//!
//! ```text
//! Available --[429]--> Cooling { until }
//! Cooling   --[until elapsed]--> Available
//! Available --[transport error]--> Available (failure counted)
//! Available --[not configured | empty]--> Available (skipped silently)
//! ```
//!
//! Falling back after a real failure raises [`Advisory::GeocodingDegraded`]
//! once; every provider failing raises [`Advisory::GeocodingUnavailable`]
//! once. An unconfigured provider (no API key) or an empty answer is not a
//! failure and raises neither.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::types::{GeocodeProvider, ProviderError, ProviderFuture, ProviderOutcome};
use crate::advisory::{Advisories, Advisory};

/// Default time a rate-limited provider is skipped.
pub const DEFAULT_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(30);

/// Health of one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderHealth {
    Available,
    Cooling { until: Instant },
}

/// Result of running a chain.
#[derive(Debug, Clone, PartialEq)]
pub enum ChainOutcome<T> {
    /// Answer from the provider at index `served_by`.
    Found { value: T, served_by: usize },
    /// Every provider failed or was skipped.
    Unavailable,
    /// At least one provider answered, none with a result.
    Empty,
    /// The caller's token fired.
    Cancelled,
}

#[derive(Debug)]
struct ProviderSlot {
    health: ProviderHealth,
    consecutive_failures: u32,
}

/// Ordered list of providers with fallback.
pub struct ProviderChain {
    providers: Vec<Arc<dyn GeocodeProvider>>,
    state: Mutex<Vec<ProviderSlot>>,
    advisories: Arc<Advisories>,
    cooldown: Duration,
}

impl std::fmt::Debug for ProviderChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("ProviderChain")
            .field("providers", &names)
            .field("cooldown", &self.cooldown)
            .finish_non_exhaustive()
    }
}

impl ProviderChain {
    /// Creates a chain trying `providers` in order.
    pub fn new(providers: Vec<Arc<dyn GeocodeProvider>>, advisories: Arc<Advisories>) -> Self {
        let state = providers
            .iter()
            .map(|_| ProviderSlot {
                health: ProviderHealth::Available,
                consecutive_failures: 0,
            })
            .collect();
        Self {
            providers,
            state: Mutex::new(state),
            advisories,
            cooldown: DEFAULT_RATE_LIMIT_COOLDOWN,
        }
    }

    /// Sets how long a rate-limited provider is skipped. Zero disables it.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    /// Provider at `index`.
    pub fn provider(&self, index: usize) -> Option<&Arc<dyn GeocodeProvider>> {
        self.providers.get(index)
    }

    /// Number of providers.
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }

    /// Current health of the provider at `index`.
    pub fn health(&self, index: usize) -> Option<ProviderHealth> {
        self.state.lock().get(index).map(|slot| slot.health)
    }

    /// Transport failures since the provider last answered.
    pub fn consecutive_failures(&self, index: usize) -> Option<u32> {
        self.state
            .lock()
            .get(index)
            .map(|slot| slot.consecutive_failures)
    }

    /// Runs `call` against each provider until one answers.
    pub async fn run<'a, T, F>(&'a self, call: F) -> ChainOutcome<T>
    where
        F: Fn(&'a dyn GeocodeProvider) -> ProviderFuture<'a, T>,
    {
        let mut degraded = false;
        let mut answered = false;

        for (index, provider) in self.providers.iter().enumerate() {
            if !self.is_available(index) {
                degraded = true;
                tracing::debug!(provider = provider.name(), "Skipping provider in cooldown");
                continue;
            }

            match call(provider.as_ref()).await {
                ProviderOutcome::Found(value) => {
                    self.record_success(index);
                    if degraded {
                        self.advisories.raise(Advisory::GeocodingDegraded);
                    }
                    return ChainOutcome::Found {
                        value,
                        served_by: index,
                    };
                }
                ProviderOutcome::Cancelled => return ChainOutcome::Cancelled,
                ProviderOutcome::Empty => {
                    self.record_success(index);
                    answered = true;
                    tracing::debug!(provider = provider.name(), "Provider had no result, trying next");
                }
                ProviderOutcome::RateLimited => {
                    tracing::warn!(provider = provider.name(), "Provider rate limited, falling back");
                    self.record_rate_limit(index, provider.name());
                    degraded = true;
                }
                ProviderOutcome::TransportError(ProviderError::NotConfigured(reason)) => {
                    tracing::debug!(provider = provider.name(), reason = %reason, "Provider not configured, skipping");
                }
                ProviderOutcome::TransportError(e) => {
                    tracing::warn!(provider = provider.name(), error = %e, "Provider failed, falling back");
                    self.record_failure(index);
                    degraded = true;
                }
            }
        }

        if answered {
            return ChainOutcome::Empty;
        }
        self.advisories.raise(Advisory::GeocodingUnavailable);
        ChainOutcome::Unavailable
    }

    fn is_available(&self, index: usize) -> bool {
        let mut state = self.state.lock();
        let Some(slot) = state.get_mut(index) else {
            return false;
        };
        match slot.health {
            ProviderHealth::Available => true,
            ProviderHealth::Cooling { until } if Instant::now() >= until => {
                tracing::info!(provider = %self.providers[index].name(), "Provider cooldown over");
                slot.health = ProviderHealth::Available;
                true
            }
            ProviderHealth::Cooling { .. } => false,
        }
    }

    fn record_success(&self, index: usize) {
        if let Some(slot) = self.state.lock().get_mut(index) {
            slot.consecutive_failures = 0;
        }
    }

    fn record_failure(&self, index: usize) {
        if let Some(slot) = self.state.lock().get_mut(index) {
            slot.consecutive_failures += 1;
        }
    }

    fn record_rate_limit(&self, index: usize, name: &str) {
        if self.cooldown.is_zero() {
            return;
        }
        if let Some(slot) = self.state.lock().get_mut(index) {
            slot.health = ProviderHealth::Cooling {
                until: Instant::now() + self.cooldown,
            };
            tracing::info!(
                provider = name,
                cooldown_secs = self.cooldown.as_secs(),
                "Provider cooling down after rate limit"
            );
        }
    }
}
