//! Synthetic single-room verification environment (component C7).
//!
//! Owns no long-term data beyond a transient per-session arena entry: a
//! running path-length and max-radius summary, and the last keep-alive
//! time. Position ownership itself stays with the session (C5); this is a
//! second, independent accumulation fed by the same forwarded updates
//! (spec §4.8), since C7 has to track max-radius-ever-reached, which the
//! session's "current distance from spawn" does not capture.

use std::time::Duration;

use dashmap::DashMap;
use gatekeeper_clock::MonoTs;
pub use gatekeeper_session::{PositionSample, SessionId};

/// Deterministic spawn point and arena bounds (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArenaConfig {
    pub spawn: (f64, f64, f64),
    pub radius: f64,
}

impl Default for ArenaConfig {
    fn default() -> Self {
        Self {
            spawn: (0.0, 64.0, 0.0),
            radius: 16.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WorldSummary {
    pub path_length: f64,
    pub max_radius: f64,
}

struct ArenaEntry {
    last_position: Option<(f64, f64, f64)>,
    path_length: f64,
    max_radius: f64,
    last_keepalive: MonoTs,
}

/// Holds one arena entry per active session, keyed by session-id — a weak,
/// non-owning reference in the sense that the world never extends a
/// session's lifetime; eviction is driven entirely by the pipeline calling
/// [`VirtualWorld::evict`] on session termination.
pub struct VirtualWorld {
    config: ArenaConfig,
    keepalive_interval: Duration,
    sessions: DashMap<SessionId, ArenaEntry>,
}

impl VirtualWorld {
    pub fn new(config: ArenaConfig, keepalive_interval: Duration) -> Self {
        Self {
            config,
            keepalive_interval,
            sessions: DashMap::new(),
        }
    }

    pub fn config(&self) -> ArenaConfig {
        self.config
    }

    /// Places a new session at the canonical spawn point and returns it.
    pub fn spawn(&self, id: SessionId, now: MonoTs) -> (f64, f64, f64) {
        self.sessions.insert(
            id,
            ArenaEntry {
                last_position: None,
                path_length: 0.0,
                max_radius: 0.0,
                last_keepalive: now,
            },
        );
        tracing::trace!(session = %id, "session spawned into virtual world");
        self.config.spawn
    }

    /// Folds a forwarded position update into the running path-length and
    /// max-radius accumulators. A no-op if `id` isn't currently in the
    /// world (e.g. arrived after eviction).
    pub fn observe_position(&self, id: SessionId, sample: PositionSample) {
        let Some(mut entry) = self.sessions.get_mut(&id) else {
            return;
        };

        if let Some((px, py, pz)) = entry.last_position {
            let dx = sample.x - px;
            let dy = sample.y - py;
            let dz = sample.z - pz;
            entry.path_length += (dx * dx + dy * dy + dz * dz).sqrt();
        }
        entry.last_position = Some((sample.x, sample.y, sample.z));

        let (sx, sy, sz) = self.config.spawn;
        let radius =
            ((sample.x - sx).powi(2) + (sample.y - sy).powi(2) + (sample.z - sz).powi(2)).sqrt();
        if radius > entry.max_radius {
            entry.max_radius = radius;
        }
    }

    pub fn summary(&self, id: SessionId) -> Option<WorldSummary> {
        self.sessions.get(&id).map(|e| WorldSummary {
            path_length: e.path_length,
            max_radius: e.max_radius,
        })
    }

    /// `true` once `keepalive_interval` has elapsed since the last
    /// keep-alive sent to this session, so the connection isn't
    /// idle-closed while verification is still in progress.
    pub fn due_for_keepalive(&self, id: SessionId, now: MonoTs) -> bool {
        self.sessions
            .get(&id)
            .is_some_and(|e| now.saturating_sub(e.last_keepalive) >= self.keepalive_interval)
    }

    pub fn mark_keepalive_sent(&self, id: SessionId, now: MonoTs) {
        if let Some(mut entry) = self.sessions.get_mut(&id) {
            entry.last_keepalive = now;
        }
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    /// Evicts a session's arena entry. Called on any terminal phase.
    pub fn evict(&self, id: SessionId) {
        self.sessions.remove(&id);
        tracing::trace!(session = %id, "session evicted from virtual world");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(x: f64, y: f64, z: f64, at: MonoTs) -> PositionSample {
        PositionSample {
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
            at,
        }
    }

    #[test]
    fn spawn_returns_canonical_origin() {
        let world = VirtualWorld::new(ArenaConfig::default(), Duration::from_secs(10));
        let id = SessionId::new();
        assert_eq!(world.spawn(id, MonoTs::ZERO), (0.0, 64.0, 0.0));
    }

    #[test]
    fn max_radius_tracks_the_farthest_point_not_the_latest() {
        let world = VirtualWorld::new(ArenaConfig::default(), Duration::from_secs(10));
        let id = SessionId::new();
        world.spawn(id, MonoTs::ZERO);
        world.observe_position(id, sample(5.0, 64.0, 0.0, MonoTs::ZERO));
        world.observe_position(id, sample(1.0, 64.0, 0.0, MonoTs::ZERO));
        let summary = world.summary(id).unwrap();
        assert_eq!(summary.max_radius, 5.0);
    }

    #[test]
    fn observing_after_eviction_is_a_no_op() {
        let world = VirtualWorld::new(ArenaConfig::default(), Duration::from_secs(10));
        let id = SessionId::new();
        world.spawn(id, MonoTs::ZERO);
        world.evict(id);
        world.observe_position(id, sample(5.0, 64.0, 0.0, MonoTs::ZERO));
        assert!(world.summary(id).is_none());
    }

    #[test]
    fn keepalive_due_only_after_interval_elapses() {
        let world = VirtualWorld::new(ArenaConfig::default(), Duration::from_secs(10));
        let id = SessionId::new();
        world.spawn(id, MonoTs::ZERO);
        assert!(!world.due_for_keepalive(id, MonoTs::ZERO.checked_add(Duration::from_secs(5))));
        assert!(world.due_for_keepalive(id, MonoTs::ZERO.checked_add(Duration::from_secs(10))));
    }
}
