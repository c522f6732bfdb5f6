//! Per-connection session state (component C5): fingerprint, position
//! history, interaction flags, and score accumulators.
//!
//! A [`Session`] is owned exclusively by the verification engine (C6) and
//! mutated only by the single task handling that connection — there is no
//! internal locking here. Other components (the virtual world, status
//! reporting) only ever see a [`SessionSnapshot`] taken under the caller's
//! own synchronization.

mod history;

use std::net::IpAddr;
use std::time::Duration;

use gatekeeper_clock::MonoTs;
pub use gatekeeper_events::SessionId;
pub use history::{PositionSample, PositionHistory};

/// Immutable identity of a connection, fixed at accept time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprint {
    pub ip: IpAddr,
    pub username: String,
    pub virtual_host: String,
    pub protocol_version: i32,
    pub first_seen: MonoTs,
}

/// Where a session currently sits in the verification state machine
/// (spec §4.6). Transitions are driven exclusively by `gatekeeper_verify`;
/// this crate only stores the current value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Pending,
    InWorld,
    Passed,
    Failed(String),
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Passed | Phase::Failed(_))
    }
}

/// Behavioral signals observed so far, each set at most once but readable
/// any number of times.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BehaviorFlags {
    pub jumped: bool,
    pub crouched: bool,
    pub interacted: bool,
    pub rotated: bool,
    pub chatted: bool,
}

impl BehaviorFlags {
    /// The early-completion "at least one of" gate (spec.md's enumerated
    /// list): jumped/crouched/interacted/rotated only. Chat is deliberately
    /// excluded — it has its own unconditional, immediate-pass path
    /// (`VerificationEngine::mark_human_signal`) and must never also count
    /// toward this gate.
    pub fn any(&self) -> bool {
        self.jumped || self.crouched || self.interacted || self.rotated
    }
}

/// Running score accumulators, folded in by detector verdicts and
/// movement observations as they arrive. The composite score (spec §4.6)
/// is computed on demand from these components, not stored redundantly.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreComponents {
    pub movement_count: u32,
    pub path_length: f64,
    pub distance_from_spawn: f64,
    pub direction_changes: u32,
    pub fail_count: i32,
    pub natural_timing_observed: bool,
}

/// A read-only copy of a session's observable state, safe to hand to
/// status reporting or the virtual world without holding the writer's
/// borrow.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub fingerprint: Fingerprint,
    pub phase: Phase,
    pub created: MonoTs,
    pub deadline: MonoTs,
    pub score: ScoreComponents,
    pub flags: BehaviorFlags,
}

/// Per-connection state owned by the verification engine.
#[derive(Debug, Clone)]
pub struct Session {
    id: SessionId,
    fingerprint: Fingerprint,
    phase: Phase,
    created: MonoTs,
    deadline: MonoTs,
    score: ScoreComponents,
    flags: BehaviorFlags,
    history: PositionHistory,
    last_positive_vertical_motion: Option<MonoTs>,
    intended_backend: Option<String>,
}

impl Session {
    pub fn new(fingerprint: Fingerprint, created: MonoTs, intended_backend: Option<String>) -> Self {
        Self {
            id: SessionId::new(),
            fingerprint,
            phase: Phase::Pending,
            created,
            deadline: created,
            score: ScoreComponents::default(),
            flags: BehaviorFlags::default(),
            history: PositionHistory::new(),
            last_positive_vertical_motion: None,
            intended_backend,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn fingerprint(&self) -> &Fingerprint {
        &self.fingerprint
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn created(&self) -> MonoTs {
        self.created
    }

    pub fn deadline(&self) -> MonoTs {
        self.deadline
    }

    pub fn score(&self) -> ScoreComponents {
        self.score
    }

    pub fn flags(&self) -> BehaviorFlags {
        self.flags
    }

    pub fn history(&self) -> &PositionHistory {
        &self.history
    }

    pub fn intended_backend(&self) -> Option<&str> {
        self.intended_backend.as_deref()
    }

    /// Idempotent once terminal: later callers cannot move a session out of
    /// `Passed`/`Failed` (spec §4.6's latching invariant).
    pub fn set_phase(&mut self, phase: Phase) {
        if self.phase.is_terminal() {
            return;
        }
        self.phase = phase;
    }

    pub fn arm_deadline(&mut self, deadline: MonoTs) {
        self.deadline = deadline;
    }

    pub fn record_movement(&mut self, sample: PositionSample) {
        let direction_change = self.history.push(sample);
        self.score.movement_count += 1;
        self.score.path_length = self.history.path_length();
        self.score.distance_from_spawn = self.history.distance_from_spawn();
        if direction_change {
            self.score.direction_changes += 1;
        }
        if let Some(prev) = self.history.previous_y() {
            if sample.y > prev {
                self.last_positive_vertical_motion = Some(sample.at);
            }
        }
    }

    pub fn last_positive_vertical_motion(&self) -> Option<MonoTs> {
        self.last_positive_vertical_motion
    }

    pub fn mark_jumped(&mut self) {
        self.flags.jumped = true;
    }

    pub fn mark_crouched(&mut self) {
        self.flags.crouched = true;
    }

    pub fn mark_interacted(&mut self) {
        self.flags.interacted = true;
    }

    pub fn mark_rotated(&mut self) {
        self.flags.rotated = true;
    }

    pub fn mark_chatted(&mut self) {
        self.flags.chatted = true;
    }

    pub fn add_fail(&mut self, delta: i32) {
        self.score.fail_count += delta;
    }

    pub fn mark_natural_timing_observed(&mut self) {
        self.score.natural_timing_observed = true;
    }

    pub fn elapsed_since_created(&self, now: MonoTs) -> Duration {
        now.saturating_sub(self.created)
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            id: self.id,
            fingerprint: self.fingerprint.clone(),
            phase: self.phase.clone(),
            created: self.created,
            deadline: self.deadline,
            score: self.score,
            flags: self.flags,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};

    use super::*;

    fn fingerprint() -> Fingerprint {
        Fingerprint {
            ip: IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)),
            username: "alice".to_owned(),
            virtual_host: "play.example.com".to_owned(),
            protocol_version: 763,
            first_seen: MonoTs::ZERO,
        }
    }

    #[test]
    fn phase_latches_once_terminal() {
        let mut session = Session::new(fingerprint(), MonoTs::ZERO, None);
        session.set_phase(Phase::InWorld);
        session.set_phase(Phase::Passed);
        session.set_phase(Phase::Failed("late".to_owned()));
        assert_eq!(*session.phase(), Phase::Passed);
    }

    #[test]
    fn repeated_movement_sample_does_not_double_count_distance() {
        let mut session = Session::new(fingerprint(), MonoTs::ZERO, None);
        let sample = PositionSample {
            x: 1.0,
            y: 64.0,
            z: 1.0,
            yaw: 0.0,
            pitch: 0.0,
            at: MonoTs::ZERO,
        };
        session.record_movement(sample);
        let after_first = session.score().path_length;
        session.record_movement(sample);
        let after_second = session.score().path_length;
        assert_eq!(after_first, after_second);
    }
}
