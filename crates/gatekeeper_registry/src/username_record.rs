use std::time::Duration;

use gatekeeper_clock::MonoTs;

/// Per-username bookkeeping (spec §3), keyed by the lowercased username.
/// The pattern-bucket counters used by the username-morphology detector
/// (§4.4 rules 4-5) are necessarily shared *across* usernames matching the
/// same normalized pattern, so they live in
/// [`crate::ConnectionRegistry`]'s own pattern-bucket map rather than here —
/// a single username only ever matches one pattern, so a per-record bucket
/// could never reach the cross-username threshold the detector checks for.
#[derive(Debug, Clone)]
pub struct UsernameRecord {
    active_count: u32,
    last_seen: MonoTs,
}

impl UsernameRecord {
    pub fn new() -> Self {
        Self {
            active_count: 0,
            last_seen: MonoTs::ZERO,
        }
    }

    pub fn active_count(&self) -> u32 {
        self.active_count
    }

    pub fn mark_active(&mut self, now: MonoTs) {
        self.active_count += 1;
        self.last_seen = now;
    }

    pub fn mark_inactive(&mut self, now: MonoTs) {
        self.active_count = self.active_count.saturating_sub(1);
        self.last_seen = now;
    }

    pub fn is_idle(&self, now: MonoTs, idle_threshold: Duration) -> bool {
        now.saturating_sub(self.last_seen) > idle_threshold
    }
}

impl Default for UsernameRecord {
    fn default() -> Self {
        Self::new()
    }
}
