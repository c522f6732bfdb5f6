//! Three sliding-window limiters sharing one counting algorithm (component
//! C3): connection-per-IP, packet-per-IP, and packet-size.
//!
//! The connection-rate limiter is a pure function over timestamps the
//! caller supplies (the Connection Registry already keeps the rolling
//! window of connection-start times; C3 doesn't duplicate that state, it
//! just evaluates it) plus its own throttle map. The packet-rate limiter
//! keeps its own per-IP window, since no other component tracks packet
//! arrival times.

mod packet_rate;
mod throttle;

use std::time::Duration;

use gatekeeper_clock::MonoTs;
pub use packet_rate::PacketRateLimiter;
pub use throttle::ThrottleTracker;

/// The outcome of a rate-limit check. Not an error type: being rate-limited
/// is an expected, frequent outcome, not an exceptional one (spec §10.2 of
/// SPEC_FULL).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Admit,
    Reject(RejectReason),
}

impl Decision {
    pub fn is_admit(self) -> bool {
        matches!(self, Decision::Admit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    TooManyConnections,
    Throttled,
    PacketFlood,
    Oversize,
}

/// Counts timestamps still inside `[now - window, now]`. Inclusive at both
/// ends: an entry exactly `window` old is still counted, matching the
/// "fully outside the window" wording in spec §4.3 (only once a timestamp's
/// age strictly exceeds the window does it stop counting).
pub fn count_within_window(timestamps: &[MonoTs], now: MonoTs, window: Duration) -> usize {
    timestamps
        .iter()
        .filter(|&&ts| now.saturating_sub(ts) <= window)
        .count()
}

/// Connection-per-IP limiter (spec §4.3.1): admits iff the number of
/// connection-start timestamps already inside the window is strictly less
/// than `limit`. On rejection the caller is expected to throttle the IP
/// with [`ThrottleTracker`], not issue a full block.
pub fn connection_rate_decision(
    starts_in_window: &[MonoTs],
    now: MonoTs,
    window: Duration,
    limit: u32,
) -> Decision {
    let count = count_within_window(starts_in_window, now, window);
    if (count as u32) < limit {
        Decision::Admit
    } else {
        Decision::Reject(RejectReason::TooManyConnections)
    }
}

/// Packet-size limiter (spec §4.3.3): the literal rule is `size <= max`, so
/// a packet exactly at `max` is admitted.
pub fn packet_size_decision(size: usize, max: usize) -> Decision {
    if size <= max {
        Decision::Admit
    } else {
        Decision::Reject(RejectReason::Oversize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_rate_admits_first_n_then_rejects() {
        let window = Duration::from_millis(5000);
        let limit = 3;
        let mut starts = Vec::new();
        let now = MonoTs::ZERO;

        for i in 0..3 {
            let decision = connection_rate_decision(&starts, now, window, limit);
            assert_eq!(decision, Decision::Admit, "connection {i} should be admitted");
            starts.push(now);
        }

        let fourth = connection_rate_decision(&starts, now, window, limit);
        assert_eq!(
            fourth,
            Decision::Reject(RejectReason::TooManyConnections)
        );
    }

    #[test]
    fn connection_rate_window_expiry_resets_lazily() {
        let window = Duration::from_millis(1000);
        let limit = 1;
        let starts = vec![MonoTs::ZERO];

        // Still inside the window: second connection rejected.
        let now = MonoTs::ZERO.checked_add(Duration::from_millis(500));
        assert_eq!(
            connection_rate_decision(&starts, now, window, limit),
            Decision::Reject(RejectReason::TooManyConnections)
        );

        // Now outside the window: the old timestamp no longer counts.
        let later = MonoTs::ZERO.checked_add(Duration::from_millis(1001));
        assert_eq!(
            connection_rate_decision(&starts, later, window, limit),
            Decision::Admit
        );
    }

    #[test]
    fn packet_size_boundary_is_admitted() {
        assert_eq!(packet_size_decision(1024, 1024), Decision::Admit);
        assert_eq!(
            packet_size_decision(1025, 1024),
            Decision::Reject(RejectReason::Oversize)
        );
    }
}
