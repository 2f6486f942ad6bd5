//! Wall-clock abstraction.
//!
//! Day boundaries and quiet periods are defined in local wall-clock time.
//! Everything that needs "now" goes through [`Clock`] so tests can drive
//! midnight and quiet-period transitions deterministically with
//! [`ManualClock`].

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, Offset, TimeDelta, Utc};

/// Source of local wall-clock time.
pub trait Clock: Send + Sync {
    /// Current local date and time.
    fn now(&self) -> NaiveDateTime;

    /// Convert a UTC timestamp reported by the bridge to local time.
    fn to_local(&self, utc: DateTime<Utc>) -> NaiveDateTime;

    /// Current local calendar date.
    fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

/// The system clock in the process's local time zone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }

    fn to_local(&self, utc: DateTime<Utc>) -> NaiveDateTime {
        utc.with_timezone(&Local).naive_local()
    }
}

/// A settable clock for tests and simulations.
///
/// Time only moves when [`set`](Self::set) or [`advance`](Self::advance) is
/// called. UTC timestamps are converted with a fixed offset.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
    offset: FixedOffset,
}

impl ManualClock {
    /// A clock standing at `now`, converting UTC with a zero offset.
    pub fn new(now: NaiveDateTime) -> Self {
        Self::with_offset(now, Utc.fix())
    }

    /// A clock standing at `now` in a zone `offset` away from UTC.
    pub fn with_offset(now: NaiveDateTime, offset: FixedOffset) -> Self {
        Self {
            millis: AtomicI64::new(now.and_utc().timestamp_millis()),
            offset,
        }
    }

    /// Move the clock to `now`.
    pub fn set(&self, now: NaiveDateTime) {
        self.millis
            .store(now.and_utc().timestamp_millis(), Ordering::SeqCst);
    }

    /// Move the clock forward by `delta`.
    pub fn advance(&self, delta: TimeDelta) {
        self.millis
            .fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        let millis = self.millis.load(Ordering::SeqCst);
        DateTime::from_timestamp_millis(millis)
            .map(|dt| dt.naive_utc())
            .unwrap_or_default()
    }

    fn to_local(&self, utc: DateTime<Utc>) -> NaiveDateTime {
        utc.with_timezone(&self.offset).naive_local()
    }
}
