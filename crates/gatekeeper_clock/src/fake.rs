use crate::{Clock, MonoTs, MonotonicGuard};

/// A [`Clock`] whose value only changes when the test calls [`FakeClock::advance`].
/// Used to exercise boundary conditions (e.g. "exactly at the rate-limit
/// window edge") without racing real time.
#[derive(Clone, Default)]
pub struct FakeClock(MonotonicGuard);

impl FakeClock {
    pub fn new() -> Self {
        Self(MonotonicGuard::new())
    }

    pub fn advance(&self, dur: std::time::Duration) -> MonoTs {
        self.0.advance(dur)
    }
}

impl Clock for FakeClock {
    fn now(&self) -> MonoTs {
        self.0.now()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn fake_clock_only_moves_on_advance() {
        let clock = FakeClock::new();
        assert_eq!(clock.now(), MonoTs::ZERO);
        clock.advance(Duration::from_millis(500));
        assert_eq!(clock.now(), MonoTs::ZERO.checked_add(Duration::from_millis(500)));
    }
}
