//! Per-IP and per-username connection bookkeeping, and the IP block list
//! (component C2).
//!
//! Keys are sharded across [`dashmap::DashMap`] so concurrent updates to
//! different IPs/usernames never contend; the locking discipline in spec §5
//! (`IP-stripe < Username-stripe < Session-lock < EventSink`) holds because
//! this crate never reaches into a session or the event sink while a
//! registry entry's internal lock is held.

mod ip_record;
mod username_record;

use std::net::IpAddr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use gatekeeper_clock::{Clock, MonoTs};
pub use ip_record::IpRecord;
use thiserror::Error;
pub use username_record::UsernameRecord;

/// How long an IP record may sit idle (active count zero, no recent
/// activity) before the janitor reclaims it. Spec §4.2: 30 minutes.
pub const IDLE_THRESHOLD: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("registration id was already released or never existed")]
    UnknownRegistration,
}

/// A Block Entry: a time-bounded admission refusal for a peer IP (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry {
    pub reason: String,
    pub since: MonoTs,
    pub duration: Duration,
}

impl BlockEntry {
    fn covers(&self, now: MonoTs) -> bool {
        let until = self.since.checked_add(self.duration);
        self.since <= now && now < until
    }
}

/// Opaque token returned by [`ConnectionRegistry::record_connection`]; must
/// be presented to [`ConnectionRegistry::release`] exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RegistrationId(u64);

struct Registration {
    ip: IpAddr,
    username: String,
}

/// Owns the IP records, username records, and the block list. Thread-safe
/// and cheap to clone (internals are shared via `Arc`-like `DashMap`s, which
/// are themselves reference-counted when wrapped by the caller — callers
/// typically hold this behind an `Arc` alongside the rest of the pipeline's
/// shared state).
pub struct ConnectionRegistry<C: Clock> {
    clock: C,
    ips: DashMap<IpAddr, IpRecord>,
    usernames: DashMap<String, UsernameRecord>,
    blocks: DashMap<IpAddr, BlockEntry>,
    registrations: DashMap<RegistrationId, Registration>,
    next_registration: AtomicU64,
    /// Shared counters for the username-morphology detector's pattern
    /// buckets (spec §4.4 rules 4-5), keyed by normalized pattern rather
    /// than by username.
    pattern_buckets: DashMap<String, AtomicU32>,
}

impl<C: Clock> ConnectionRegistry<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            ips: DashMap::new(),
            usernames: DashMap::new(),
            blocks: DashMap::new(),
            registrations: DashMap::new(),
            next_registration: AtomicU64::new(0),
            pattern_buckets: DashMap::new(),
        }
    }

    /// Increments the shared counter for a normalized username pattern and
    /// returns the new count. Used by the username-morphology detector
    /// (spec §4.4 rules 4-5) to reject once a pattern recurs too often.
    pub fn bump_pattern_bucket(&self, pattern: &str) -> u32 {
        let counter = self
            .pattern_buckets
            .entry(pattern.to_owned())
            .or_insert_with(|| AtomicU32::new(0));
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Records a new connection attempt, incrementing the IP's and
    /// username's active counts and appending a timestamp to the IP's
    /// rolling window. Returns a token that must later be passed to
    /// [`Self::release`].
    pub fn record_connection(&self, ip: IpAddr, username: &str, now: MonoTs) -> RegistrationId {
        self.ips
            .entry(ip)
            .or_insert_with(IpRecord::new)
            .record_connection_start(now);

        let lowered = username.to_ascii_lowercase();
        self.usernames
            .entry(lowered.clone())
            .or_insert_with(UsernameRecord::new)
            .mark_active(now);

        let id = RegistrationId(self.next_registration.fetch_add(1, Ordering::SeqCst));
        self.registrations.insert(
            id,
            Registration {
                ip,
                username: lowered,
            },
        );

        tracing::trace!(%ip, username, "connection registered");
        id
    }

    /// Decrements the active counts for the registration. If the IP's
    /// active count reaches zero, the record becomes eligible for the next
    /// janitor sweep rather than being removed immediately (so a rapid
    /// reconnect doesn't thrash the map).
    pub fn release(&self, id: RegistrationId, now: MonoTs) -> Result<(), RegistryError> {
        let Some((_, reg)) = self.registrations.remove(&id) else {
            return Err(RegistryError::UnknownRegistration);
        };

        if let Some(mut rec) = self.ips.get_mut(&reg.ip) {
            rec.release_one(now);
        }
        if let Some(mut rec) = self.usernames.get_mut(&reg.username) {
            rec.mark_inactive(now);
        }

        tracing::trace!(ip = %reg.ip, username = %reg.username, "connection released");
        Ok(())
    }

    /// `true` iff a Block Entry exists whose window covers `now`.
    pub fn is_blocked(&self, ip: IpAddr, now: MonoTs) -> bool {
        self.blocks.get(&ip).is_some_and(|b| b.covers(now))
    }

    /// Creates or overwrites the Block Entry for `ip`, and atomically zeroes
    /// its active-connection-count so further `is_blocked` checks reject
    /// reconnect attempts immediately (spec §4.2).
    pub fn block(&self, ip: IpAddr, reason: impl Into<String>, duration: Duration, now: MonoTs) {
        let reason = reason.into();
        self.blocks.insert(
            ip,
            BlockEntry {
                reason: reason.clone(),
                since: now,
                duration,
            },
        );
        if let Some(mut rec) = self.ips.get_mut(&ip) {
            rec.zero_active_count();
        }
        tracing::debug!(%ip, reason, ?duration, "ip blocked");
    }

    /// Returns the current active-connection-count for `ip` (0 if unknown).
    pub fn active_connection_count(&self, ip: IpAddr) -> u32 {
        self.ips.get(&ip).map_or(0, |r| r.active_count())
    }

    /// Read-only snapshot of the connection-start timestamps still inside
    /// the active window, for the rate limiter to consult.
    pub fn connection_starts(&self, ip: IpAddr) -> Vec<MonoTs> {
        self.ips
            .get(&ip)
            .map(|r| r.connection_starts().to_vec())
            .unwrap_or_default()
    }

    pub fn set_resolved_hostname(&self, ip: IpAddr, hostname: String) {
        self.ips
            .entry(ip)
            .or_insert_with(IpRecord::new)
            .resolved_hostname = Some(hostname);
    }

    pub fn resolved_hostname(&self, ip: IpAddr) -> Option<String> {
        self.ips.get(&ip).and_then(|r| r.resolved_hostname.clone())
    }

    pub fn record_error(&self, ip: IpAddr) {
        self.ips.entry(ip).or_insert_with(IpRecord::new).error_count += 1;
    }

    /// Janitor: drop block entries whose window elapsed, and prune IP
    /// records that are both inactive and idle past [`IDLE_THRESHOLD`].
    /// Also collects username records under the same idleness rule (spec
    /// §3: "collected when active-count reaches zero and last-seen-ts is
    /// older than the inactivity threshold").
    pub fn sweep(&self, now: MonoTs) {
        self.blocks.retain(|ip, entry| {
            let keep = entry.covers(now);
            if !keep {
                tracing::debug!(%ip, "block entry expired");
            }
            keep
        });

        self.ips.retain(|_, rec| {
            !(rec.active_count() == 0 && rec.is_idle(now, IDLE_THRESHOLD))
        });

        self.usernames.retain(|_, rec| {
            !(rec.active_count() == 0 && rec.is_idle(now, IDLE_THRESHOLD))
        });
    }

    pub fn block_entry(&self, ip: IpAddr) -> Option<BlockEntry> {
        self.blocks.get(&ip).map(|b| b.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use gatekeeper_clock::FakeClock;

    use super::*;

    fn ip(n: u8) -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(10, 0, 0, n))
    }

    #[test]
    fn record_then_release_returns_to_prior_counts() {
        let clock = FakeClock::new();
        let reg = ConnectionRegistry::new(clock.clone());
        let a = ip(1);

        assert_eq!(reg.active_connection_count(a), 0);
        let id = reg.record_connection(a, "alice", clock.now());
        assert_eq!(reg.active_connection_count(a), 1);
        reg.release(id, clock.now()).unwrap();
        assert_eq!(reg.active_connection_count(a), 0);
    }

    #[test]
    fn double_release_is_an_error_not_a_double_decrement() {
        let clock = FakeClock::new();
        let reg = ConnectionRegistry::new(clock.clone());
        let id = reg.record_connection(ip(2), "bob", clock.now());
        reg.release(id, clock.now()).unwrap();
        assert_eq!(
            reg.release(id, clock.now()),
            Err(RegistryError::UnknownRegistration)
        );
    }

    #[test]
    fn active_count_never_goes_negative() {
        let clock = FakeClock::new();
        let reg = ConnectionRegistry::new(clock.clone());
        let a = ip(3);
        let id1 = reg.record_connection(a, "carol", clock.now());
        let _id2 = reg.record_connection(a, "carol", clock.now());
        reg.release(id1, clock.now()).unwrap();
        assert_eq!(reg.active_connection_count(a), 1);
    }

    #[test]
    fn block_zeroes_active_count_and_rejects_is_blocked() {
        let clock = FakeClock::new();
        let reg = ConnectionRegistry::new(clock.clone());
        let a = ip(4);
        let _id = reg.record_connection(a, "dave", clock.now());
        assert_eq!(reg.active_connection_count(a), 1);

        reg.block(a, "packet-flood", Duration::from_secs(60), clock.now());
        assert_eq!(reg.active_connection_count(a), 0);
        assert!(reg.is_blocked(a, clock.now()));
    }

    #[test]
    fn block_window_boundary_is_half_open() {
        let clock = FakeClock::new();
        let reg = ConnectionRegistry::new(clock.clone());
        let a = ip(5);
        let since = clock.now();
        reg.block(a, "test", Duration::from_millis(1000), since);

        assert!(reg.is_blocked(a, since));
        clock.advance(Duration::from_millis(999));
        assert!(reg.is_blocked(a, clock.now()));
        clock.advance(Duration::from_millis(1));
        assert!(!reg.is_blocked(a, clock.now()));
    }

    #[test]
    fn sweep_removes_expired_blocks_and_idle_ip_records() {
        let clock = FakeClock::new();
        let reg = ConnectionRegistry::new(clock.clone());
        let a = ip(6);
        reg.block(a, "oversize", Duration::from_millis(10), clock.now());
        clock.advance(Duration::from_millis(50));
        reg.sweep(clock.now());
        assert!(!reg.is_blocked(a, clock.now()));
        assert!(reg.block_entry(a).is_none());
    }

    #[test]
    fn sweep_does_not_touch_active_or_recently_used_records() {
        let clock = FakeClock::new();
        let reg = ConnectionRegistry::new(clock.clone());
        let a = ip(7);
        let _id = reg.record_connection(a, "erin", clock.now());
        clock.advance(IDLE_THRESHOLD + Duration::from_secs(1));
        reg.sweep(clock.now());
        // Still active, so sweep must not prune it.
        assert_eq!(reg.active_connection_count(a), 1);
    }
}
