use std::time::Duration;

use gatekeeper_clock::MonoTs;

/// Caps the rolling connection-start window so a record that never gets
/// swept (e.g. a misbehaving client hammering one IP) can't grow without
/// bound between janitor passes.
const MAX_TRACKED_STARTS: usize = 512;

/// Per-IP bookkeeping (spec §3). Block state lives in the registry's
/// separate Block Entry map, not here, so there is exactly one place that
/// can answer "is this IP blocked".
#[derive(Debug, Clone)]
pub struct IpRecord {
    active_count: u32,
    starts: Vec<MonoTs>,
    last_activity: MonoTs,
    pub error_count: u32,
    pub resolved_hostname: Option<String>,
}

impl IpRecord {
    pub fn new() -> Self {
        Self {
            active_count: 0,
            starts: Vec::new(),
            last_activity: MonoTs::ZERO,
            error_count: 0,
            resolved_hostname: None,
        }
    }

    pub fn active_count(&self) -> u32 {
        self.active_count
    }

    pub fn connection_starts(&self) -> &[MonoTs] {
        &self.starts
    }

    pub fn record_connection_start(&mut self, now: MonoTs) {
        self.active_count += 1;
        self.last_activity = now;
        self.starts.push(now);
        if self.starts.len() > MAX_TRACKED_STARTS {
            let overflow = self.starts.len() - MAX_TRACKED_STARTS;
            self.starts.drain(0..overflow);
        }
    }

    pub fn release_one(&mut self, now: MonoTs) {
        self.active_count = self.active_count.saturating_sub(1);
        self.last_activity = now;
    }

    pub fn zero_active_count(&mut self) {
        self.active_count = 0;
    }

    pub fn is_idle(&self, now: MonoTs, idle_threshold: Duration) -> bool {
        now.saturating_sub(self.last_activity) > idle_threshold
    }
}

impl Default for IpRecord {
    fn default() -> Self {
        Self::new()
    }
}
