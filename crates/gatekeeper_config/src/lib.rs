//! Live-replaceable configuration snapshot (component C9).
//!
//! A [`ConfigSnapshot`] is an immutable value; [`PolicyConfig`] holds the
//! current one behind an [`arc_swap::ArcSwap`] so readers never block a
//! writer and always see either the whole old snapshot or the whole new
//! one, never a partial update. This is the same lock-free
//! publish-and-subscribe shape used for the local-IP field in the
//! peer-connection-registry reference this crate is grounded on, just
//! applied to a value that is replaced repeatedly instead of set once.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;

/// All recognized configuration options from spec §6, plus the scoring and
/// dwell-time constants from §4.6.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot {
    /// Master switch. When `false`, every connection is admitted untouched.
    pub enabled: bool,

    pub kick_on_failure: bool,
    pub kick_threshold: i32,
    pub check_only_first_join: bool,

    pub verification_duration: Duration,
    pub min_movements: u32,
    pub min_distance: f64,
    /// Minimum dwell time before an early Pass can be granted (§4.6: 3s).
    pub min_dwell: Duration,
    /// Composite score needed to pass (§4.6, default 7 of 15 — the
    /// "higher-security variant" called for by the Open Questions).
    pub pass_threshold: i32,

    pub gravity_check: bool,
    pub yaw_check: bool,
    pub hitbox_check: bool,
    pub brand_check: bool,
    pub world_check: bool,
    pub rate_limit: bool,
    pub username_pattern_check: bool,
    pub dns_check: bool,
    pub latency_check: bool,

    pub allowed_brands: HashSet<String>,
    pub allowed_domains: HashSet<String>,
    pub allow_direct_ip: bool,

    pub conn_rate_limit: u32,
    pub conn_rate_window: Duration,
    pub throttle_duration: Duration,

    pub max_packets_per_sec: u32,
    pub max_packet_size: usize,
    pub packet_block_duration: Duration,

    /// Count of same-prefix/same-pattern usernames tolerated before the
    /// username-morphology detector starts rejecting (§4.4 rules 4-5).
    pub username_pattern_threshold: u32,

    pub excluded_ips: HashSet<IpAddr>,
    pub kick_message: String,
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self {
            enabled: true,
            kick_on_failure: true,
            kick_threshold: 3,
            check_only_first_join: false,
            verification_duration: Duration::from_secs(15),
            min_movements: 5,
            min_distance: 2.0,
            min_dwell: Duration::from_secs(3),
            pass_threshold: 7,
            gravity_check: true,
            yaw_check: true,
            hitbox_check: true,
            brand_check: true,
            world_check: true,
            rate_limit: true,
            username_pattern_check: true,
            dns_check: true,
            latency_check: true,
            allowed_brands: HashSet::new(),
            allowed_domains: HashSet::new(),
            allow_direct_ip: true,
            conn_rate_limit: 3,
            conn_rate_window: Duration::from_millis(5000),
            throttle_duration: Duration::from_secs(30),
            max_packets_per_sec: 100,
            max_packet_size: 2_097_152,
            packet_block_duration: Duration::from_secs(300),
            username_pattern_threshold: 5,
            excluded_ips: HashSet::new(),
            kick_message: "You have been disconnected.".to_owned(),
        }
    }
}

/// Holds the current [`ConfigSnapshot`] behind an atomic reference. Updates
/// are atomic and total: `current()` never observes a value that is part
/// old, part new.
#[derive(Clone)]
pub struct PolicyConfig {
    inner: Arc<ArcSwap<ConfigSnapshot>>,
}

impl PolicyConfig {
    pub fn new(initial: ConfigSnapshot) -> Self {
        Self {
            inner: Arc::new(ArcSwap::from_pointee(initial)),
        }
    }

    /// Returns the snapshot in effect right now. Callers should not retain
    /// it beyond a single logical operation (per §4.9) so a long-running
    /// reader doesn't pin an arbitrarily old configuration.
    pub fn current(&self) -> Arc<ConfigSnapshot> {
        self.inner.load_full()
    }

    /// Publishes a new snapshot. Any transition from any prior snapshot is
    /// valid; there is no sequencing constraint (§4.9).
    pub fn replace(&self, new: ConfigSnapshot) {
        self.inner.store(Arc::new(new));
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self::new(ConfigSnapshot::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replace_is_atomic_and_total() {
        let cfg = PolicyConfig::default();
        assert!(cfg.current().enabled);

        let mut next = ConfigSnapshot::default();
        next.enabled = false;
        next.kick_threshold = 99;
        cfg.replace(next);

        let seen = cfg.current();
        assert!(!seen.enabled);
        assert_eq!(seen.kick_threshold, 99);
    }

    #[test]
    fn readers_see_old_or_new_never_mixed() {
        let cfg = PolicyConfig::default();
        let before = cfg.current();

        let mut next = ConfigSnapshot::default();
        next.kick_message = "bye".to_owned();
        cfg.replace(next);

        // The handle taken before the swap still reflects the old value in
        // full; it was never mutated in place.
        assert_eq!(before.kick_message, ConfigSnapshot::default().kick_message);
        assert_eq!(cfg.current().kick_message, "bye");
    }
}
