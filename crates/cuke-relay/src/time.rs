//! Wall-clock timestamps and durations in the messages' `{seconds, nanos}` shape.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::messages::{Duration, Timestamp};

const NANOS_PER_SECOND: i64 = 1_000_000_000;

/// Source of timestamps for emitted envelopes.
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        let now = chrono::Utc::now();
        Timestamp {
            seconds: now.timestamp(),
            nanos: i64::from(now.timestamp_subsec_nanos()),
        }
    }
}

/// A clock that only moves when told to.
///
/// Every call to [`Clock::now`] advances the clock by `step_nanos`, so
/// consecutive events get strictly increasing timestamps in tests.
#[derive(Debug, Default)]
pub struct FixedClock {
    nanos: AtomicI64,
    step_nanos: i64,
}

impl FixedClock {
    pub fn new(start: Timestamp) -> Self {
        Self::ticking(start, 0)
    }

    pub fn ticking(start: Timestamp, step_nanos: i64) -> Self {
        Self {
            nanos: AtomicI64::new(start.seconds * NANOS_PER_SECOND + start.nanos),
            step_nanos,
        }
    }

    pub fn advance_millis(&self, millis: i64) {
        self.nanos.fetch_add(millis * 1_000_000, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> Timestamp {
        let total = self.nanos.fetch_add(self.step_nanos, Ordering::SeqCst);
        Timestamp {
            seconds: total.div_euclid(NANOS_PER_SECOND),
            nanos: total.rem_euclid(NANOS_PER_SECOND),
        }
    }
}

/// Elapsed time between two timestamps, normalized so that `nanos` is in
/// `0..1e9` for non-negative spans.
pub fn duration(start: Timestamp, end: Timestamp) -> Duration {
    let total = (end.seconds - start.seconds) * NANOS_PER_SECOND + (end.nanos - start.nanos);
    Duration {
        seconds: total.div_euclid(NANOS_PER_SECOND),
        nanos: total.rem_euclid(NANOS_PER_SECOND),
    }
}

pub fn duration_to_nanos(duration: Duration) -> i64 {
    duration.seconds * NANOS_PER_SECOND + duration.nanos
}
