//! Wall-clock abstraction.
//!
//! Cache expiry is measured in calendar and business days, so it needs real
//! dates rather than `tokio::time::Instant`. Components take an
//! `Arc<dyn Clock>` so tests can pin the date with [`ManualClock`].
//!
//! Timers (debounce, backoff, flush intervals) do not go through this trait;
//! they use `tokio::time` directly and are driven by a paused runtime in tests.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration as ChronoDuration, Local, NaiveDate, Utc, Weekday};
use parking_lot::Mutex;

/// Source of the current time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;

    /// Calendar date of `instant` in the clock's time zone.
    fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate;

    /// Today's calendar date.
    fn today(&self) -> NaiveDate {
        self.date_of(self.now())
    }

    /// Current time as milliseconds since the Unix epoch.
    fn now_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

/// Shared clock handle.
pub type SharedClock = Arc<dyn Clock>;

/// Production clock. Dates are taken in the local time zone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.with_timezone(&Local).date_naive()
    }
}

/// Test clock that only moves when told to. Dates are taken in UTC.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: ChronoDuration) {
        let mut now = self.now.lock();
        *now += by;
    }

    /// Jumps to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock() = instant;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    fn date_of(&self, instant: DateTime<Utc>) -> NaiveDate {
        instant.date_naive()
    }
}

/// Counts weekdays strictly after `from` up to and including `to`.
///
/// Returns 0 when `to` is not after `from`.
pub fn business_days_between(from: NaiveDate, to: NaiveDate) -> u32 {
    if to <= from {
        return 0;
    }

    let mut count = 0;
    let mut day = from;
    while day < to {
        day = match day.succ_opt() {
            Some(next) => next,
            None => break,
        };
        if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
            count += 1;
        }
    }
    count
}
