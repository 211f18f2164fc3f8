//! One-time user-facing advisories.
//!
//! When geocoding falls back to the secondary provider, or both providers are
//! down, the operator should hear about it once, not on every keystroke.
//! [`Advisories`] remembers which notices were already raised for the life of
//! the process and fans new ones out to subscribers.

use std::collections::HashSet;

use parking_lot::Mutex;
use tokio::sync::broadcast;

/// Capacity of the advisory broadcast channel.
const ADVISORY_CHANNEL_CAPACITY: usize = 16;

/// Kinds of advisory the engine can raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Advisory {
    /// Primary geocoder failed or is rate limited; answers come from the fallback.
    GeocodingDegraded,
    /// Both geocoders failed.
    GeocodingUnavailable,
}

impl Advisory {
    /// Operator-facing message.
    pub fn message(&self) -> &'static str {
        match self {
            Advisory::GeocodingDegraded => {
                "Primary address search is unavailable; using the fallback service"
            }
            Advisory::GeocodingUnavailable => "Address search is currently unavailable",
        }
    }
}

impl std::fmt::Display for Advisory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Process-wide advisory latch and broadcaster.
#[derive(Debug)]
pub struct Advisories {
    raised: Mutex<HashSet<Advisory>>,
    sender: broadcast::Sender<Advisory>,
}

impl Default for Advisories {
    fn default() -> Self {
        Self::new()
    }
}

impl Advisories {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(ADVISORY_CHANNEL_CAPACITY);
        Self {
            raised: Mutex::new(HashSet::new()),
            sender,
        }
    }

    /// Raises `advisory` if it has not been raised before.
    ///
    /// Returns `true` when this call was the first.
    pub fn raise(&self, advisory: Advisory) -> bool {
        if !self.raised.lock().insert(advisory) {
            return false;
        }

        tracing::warn!(advisory = ?advisory, "{}", advisory.message());
        // No subscribers is fine; the latch still records it.
        let _ = self.sender.send(advisory);
        true
    }

    /// Whether `advisory` has been raised.
    pub fn was_raised(&self, advisory: Advisory) -> bool {
        self.raised.lock().contains(&advisory)
    }

    /// Receives advisories raised after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Advisory> {
        self.sender.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raise_only_once() {
        let advisories = Advisories::new();
        assert!(advisories.raise(Advisory::GeocodingDegraded));
        assert!(!advisories.raise(Advisory::GeocodingDegraded));
        assert!(advisories.was_raised(Advisory::GeocodingDegraded));
        assert!(!advisories.was_raised(Advisory::GeocodingUnavailable));
    }

    #[tokio::test]
    async fn test_subscribers_see_first_raise_only() {
        let advisories = Advisories::new();
        let mut rx = advisories.subscribe();

        advisories.raise(Advisory::GeocodingUnavailable);
        advisories.raise(Advisory::GeocodingUnavailable);
        advisories.raise(Advisory::GeocodingDegraded);

        assert_eq!(rx.recv().await.unwrap(), Advisory::GeocodingUnavailable);
        assert_eq!(rx.recv().await.unwrap(), Advisory::GeocodingDegraded);
        assert!(rx.try_recv().is_err());
    }
}
