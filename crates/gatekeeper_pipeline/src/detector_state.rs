use std::collections::HashSet;
use std::time::Duration;

use dashmap::DashMap;
use gatekeeper_clock::MonoTs;
use gatekeeper_detect::PositionSample as GravitySample;
use gatekeeper_detect::Verdict;
use gatekeeper_events::SessionId;

const RING_CAPACITY: usize = 16;

/// Small per-session buffers feeding the C4 detectors that need more than
/// a single packet's worth of context (gravity, rotation, packet-timing).
/// Deliberately separate from C5's own position history: C5 tracks
/// distance/path-length for scoring, this tracks the raw on-ground and
/// yaw signal the detectors need, which C5 doesn't otherwise retain.
#[derive(Default)]
struct DetectorState {
    gravity: Vec<GravitySample>,
    yaws: Vec<f64>,
    packet_arrivals: Vec<MonoTs>,
    /// Detectors named here are currently mid-way through a flagged run:
    /// a sustained condition (constant yaw, flat packet cadence, ongoing
    /// ascent...) re-evaluates the *whole* buffer on every tick, so without
    /// this the same persistent condition would otherwise contribute a
    /// fresh fail delta on every single packet instead of once per run.
    flagged: HashSet<&'static str>,
}

fn push_capped<T>(buf: &mut Vec<T>, value: T) {
    if buf.len() == RING_CAPACITY {
        buf.remove(0);
    }
    buf.push(value);
}

pub struct DetectorStateStore {
    sessions: DashMap<SessionId, DetectorState>,
}

impl DetectorStateStore {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    pub fn observe_position(&self, id: SessionId, y: f64, on_ground: bool, yaw: f64, at: MonoTs) {
        let mut entry = self.sessions.entry(id).or_default();
        push_capped(&mut entry.gravity, GravitySample { y, on_ground, at });
        push_capped(&mut entry.yaws, yaw);
        push_capped(&mut entry.packet_arrivals, at);
    }

    pub fn gravity_samples(&self, id: SessionId) -> Vec<GravitySample> {
        self.sessions.get(&id).map(|e| e.gravity.clone()).unwrap_or_default()
    }

    pub fn yaws(&self, id: SessionId) -> Vec<f64> {
        self.sessions.get(&id).map(|e| e.yaws.clone()).unwrap_or_default()
    }

    pub fn inter_packet_deltas(&self, id: SessionId) -> Vec<Duration> {
        self.sessions
            .get(&id)
            .map(|e| e.packet_arrivals.windows(2).map(|w| w[1].saturating_sub(w[0])).collect())
            .unwrap_or_default()
    }

    /// Debounces a detector's verdict against a persistent condition:
    /// re-evaluating the same ongoing state (e.g. a yaw buffer that hasn't
    /// changed shape since the last tick) would otherwise flag the same
    /// run on every packet. The *first* tick a named detector goes
    /// non-`ok` is passed through untouched; subsequent ticks while it
    /// remains non-`ok` are suppressed to `Verdict::ok()` until the
    /// detector reports `ok` again, at which point a future flagged run
    /// can contribute again.
    pub fn debounce(&self, id: SessionId, detector: &'static str, verdict: Verdict) -> Verdict {
        let mut entry = self.sessions.entry(id).or_default();
        if verdict.ok {
            entry.flagged.remove(detector);
            return verdict;
        }
        if !entry.flagged.insert(detector) {
            return Verdict::ok();
        }
        verdict
    }

    pub fn forget(&self, id: SessionId) {
        self.sessions.remove(&id);
    }
}

impl Default for DetectorStateStore {
    fn default() -> Self {
        Self::new()
    }
}
