//! Monotonic time source and cancellable deferred tasks (component C1).
//!
//! Every other component reads time through [`Clock`] rather than calling
//! `Instant::now()` directly so tests can drive a [`FakeClock`] instead of
//! sleeping. The [`Scheduler`] runs deferred tasks on the tokio runtime's
//! worker pool, which is distinct from whatever I/O-handling task called
//! `after`; a cancelled task is a guaranteed no-op even if it fires after
//! cancellation.

mod fake;
mod scheduler;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub use fake::FakeClock;
pub use scheduler::{Scheduler, TaskHandle};

/// A monotonic timestamp in milliseconds since some unspecified epoch.
/// Only differences between two `MonoTs` values from the same [`Clock`] are
/// meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MonoTs(u64);

impl MonoTs {
    pub const ZERO: MonoTs = MonoTs(0);

    pub fn millis(self) -> u64 {
        self.0
    }

    pub fn saturating_sub(self, other: MonoTs) -> Duration {
        Duration::from_millis(self.0.saturating_sub(other.0))
    }

    pub fn checked_add(self, dur: Duration) -> MonoTs {
        MonoTs(self.0.saturating_add(dur.as_millis() as u64))
    }

    pub fn is_past(self, now: MonoTs) -> bool {
        self <= now
    }
}

/// A source of monotonic time, millisecond precision.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> MonoTs;
}

/// The real clock, backed by [`Instant`]. Never steps backwards.
#[derive(Clone)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> MonoTs {
        MonoTs(self.epoch.elapsed().as_millis() as u64)
    }
}

/// A clock backed by an atomic counter, for tests that need control over the
/// passage of time without real sleeps. A clock step backwards is clamped:
/// `set` never moves the counter down, matching the "ignore backwards steps"
/// edge case in the rate limiter spec.
#[derive(Clone, Default)]
pub struct MonotonicGuard(Arc<AtomicU64>);

impl MonotonicGuard {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU64::new(0)))
    }

    pub fn advance(&self, dur: Duration) -> MonoTs {
        let added = dur.as_millis() as u64;
        let prev = self.0.fetch_add(added, Ordering::SeqCst);
        MonoTs(prev + added)
    }

    pub fn now(&self) -> MonoTs {
        MonoTs(self.0.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mono_ts_saturating_sub_never_underflows() {
        let earlier = MonoTs(100);
        let later = MonoTs(50);
        assert_eq!(earlier.saturating_sub(later), Duration::from_millis(0));
        assert_eq!(later.saturating_sub(earlier), Duration::from_millis(0));
    }

    #[test]
    fn is_past_boundary_is_inclusive() {
        let deadline = MonoTs(1000);
        assert!(deadline.is_past(MonoTs(1000)));
        assert!(deadline.is_past(MonoTs(1001)));
        assert!(!deadline.is_past(MonoTs(999)));
    }

    #[test]
    fn system_clock_is_monotonic_non_decreasing() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
