use std::net::IpAddr;
use std::time::Duration;

use dashmap::DashMap;
use gatekeeper_clock::MonoTs;

/// Tracks "throttled until" deadlines per IP (spec §4.3.1). A throttle is
/// deliberately lighter than a registry [`BlockEntry`](gatekeeper_registry::BlockEntry):
/// it only gates new admission attempts through this tracker, it does not
/// zero an IP's active-connection-count or show up as a Block Entry.
pub struct ThrottleTracker {
    until: DashMap<IpAddr, MonoTs>,
}

impl ThrottleTracker {
    pub fn new() -> Self {
        Self {
            until: DashMap::new(),
        }
    }

    /// Throttles `ip` for `duration` starting at `now`, overwriting any
    /// earlier throttle still in effect.
    pub fn throttle(&self, ip: IpAddr, duration: Duration, now: MonoTs) {
        let until = now.checked_add(duration);
        self.until.insert(ip, until);
        tracing::debug!(%ip, ?duration, "ip throttled");
    }

    /// `true` iff `ip` is still inside a throttle window. Half-open like a
    /// Block Entry: the instant equal to the deadline is no longer throttled.
    pub fn is_throttled(&self, ip: IpAddr, now: MonoTs) -> bool {
        self.until.get(&ip).is_some_and(|until| now < *until)
    }

    /// Drops throttle entries that have elapsed. Cheap enough to call from
    /// the same janitor sweep as the registry's.
    pub fn sweep(&self, now: MonoTs) {
        self.until.retain(|_, until| now < *until);
    }
}

impl Default for ThrottleTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 42))
    }

    #[test]
    fn throttle_gates_until_deadline_then_releases() {
        let tracker = ThrottleTracker::new();
        let now = MonoTs::ZERO;
        tracker.throttle(ip(), Duration::from_millis(1000), now);

        assert!(tracker.is_throttled(ip(), now));
        assert!(tracker.is_throttled(
            ip(),
            now.checked_add(Duration::from_millis(999))
        ));
        assert!(!tracker.is_throttled(
            ip(),
            now.checked_add(Duration::from_millis(1000))
        ));
    }

    #[test]
    fn sweep_drops_expired_entries() {
        let tracker = ThrottleTracker::new();
        let now = MonoTs::ZERO;
        tracker.throttle(ip(), Duration::from_millis(10), now);
        let later = now.checked_add(Duration::from_millis(50));
        tracker.sweep(later);
        assert!(!tracker.is_throttled(ip(), later));
    }

    #[test]
    fn unknown_ip_is_never_throttled() {
        let tracker = ThrottleTracker::new();
        assert!(!tracker.is_throttled(ip(), MonoTs::ZERO));
    }
}
