use std::net::IpAddr;
use std::time::Duration;

use dashmap::DashMap;
use gatekeeper_clock::MonoTs;

use crate::{count_within_window, Decision, RejectReason};

/// Per-IP packet-rate sliding window (spec §4.3.2): a 1-second window by
/// default, counting packets rather than connections. Exceeding the
/// threshold is the caller's cue to issue a full block, not merely a
/// throttle (unlike the connection-rate limiter).
pub struct PacketRateLimiter {
    window: Duration,
    threshold: u32,
    per_ip: DashMap<IpAddr, Vec<MonoTs>>,
}

impl PacketRateLimiter {
    pub fn new(window: Duration, threshold: u32) -> Self {
        Self {
            window,
            threshold,
            per_ip: DashMap::new(),
        }
    }

    /// Records one packet arrival for `ip` and returns whether it should be
    /// admitted. "Exceeding" the threshold means the post-arrival count is
    /// strictly greater than `threshold`; a count equal to the threshold is
    /// still admitted (spec's general ≤ tie-break).
    pub fn record(&self, ip: IpAddr, now: MonoTs) -> Decision {
        let mut entry = self.per_ip.entry(ip).or_default();
        entry.retain(|&ts| now.saturating_sub(ts) <= self.window);
        entry.push(now);

        let count = count_within_window(&entry, now, self.window) as u32;
        if count > self.threshold {
            Decision::Reject(RejectReason::PacketFlood)
        } else {
            Decision::Admit
        }
    }

    pub fn forget(&self, ip: IpAddr) {
        self.per_ip.remove(&ip);
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9))
    }

    #[test]
    fn admits_up_to_threshold_then_rejects() {
        let limiter = PacketRateLimiter::new(Duration::from_secs(1), 3);
        let now = MonoTs::ZERO;
        for _ in 0..3 {
            assert_eq!(limiter.record(ip(), now), Decision::Admit);
        }
        assert_eq!(
            limiter.record(ip(), now),
            Decision::Reject(RejectReason::PacketFlood)
        );
    }

    #[test]
    fn window_rolls_forward() {
        let limiter = PacketRateLimiter::new(Duration::from_millis(100), 1);
        let now = MonoTs::ZERO;
        assert_eq!(limiter.record(ip(), now), Decision::Admit);

        let later = now.checked_add(Duration::from_millis(200));
        assert_eq!(limiter.record(ip(), later), Decision::Admit);
    }
}
