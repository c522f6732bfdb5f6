//! Verification Engine (component C6): the state machine that drives a
//! session through `Pending -> InWorld -> {Passed, Failed}`, composite
//! scoring, and deadline handling.
//!
//! Session mutation is funneled through `DashMap::get_mut`, which hands
//! out exclusive access to one shard entry at a time — consistent with the
//! single-writer-per-session rule in spec §4.5, since the admission
//! pipeline never calls into the same session concurrently from two
//! tasks.

mod score;

use std::net::IpAddr;
use std::sync::Arc;

use dashmap::DashMap;
use gatekeeper_clock::{Clock, MonoTs, Scheduler, TaskHandle};
use gatekeeper_config::{ConfigSnapshot, PolicyConfig};
pub use gatekeeper_detect::Verdict as DetectorVerdict;
use gatekeeper_events::{EventKind, EventSink};
pub use gatekeeper_events::SessionId;
pub use gatekeeper_session::{BehaviorFlags, Fingerprint, Phase, PositionSample, Session, SessionSnapshot};
use gatekeeper_world::VirtualWorld;
use thiserror::Error;

pub use score::composite_score;

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("unknown session")]
    UnknownSession,
}

/// Final outcome of a session's verification, reported to the admission
/// pipeline for disconnect/handoff decisions. `TimedOut` is part of the
/// data model's sum type but is never observed through [`VerificationEngine::verdict`] —
/// a deadline firing always resolves immediately into `Pass` (late pass) or
/// `FailKick`/`FailQuarantine` per spec §4.6's transition rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Pass,
    FailKick(String),
    FailQuarantine(String),
    TimedOut,
}

struct SessionEntry {
    session: Session,
    timeout: Option<TaskHandle>,
}

fn fingerprint_key(ip: IpAddr, username: &str) -> String {
    format!("{ip}:{}", username.to_ascii_lowercase())
}

fn meets_pass_criteria(session: &Session, cfg: &ConfigSnapshot, now: MonoTs) -> bool {
    let score = session.score();
    let flags = session.flags();
    score.movement_count >= cfg.min_movements
        && score.distance_from_spawn >= cfg.min_distance
        && flags.any()
        && session.elapsed_since_created(now) >= cfg.min_dwell
}

/// Drives every session's lifecycle. Cheap to share: construct once behind
/// an `Arc` and clone that `Arc` into each connection task.
pub struct VerificationEngine<C: Clock> {
    clock: C,
    scheduler: Scheduler,
    config: PolicyConfig,
    events: EventSink,
    world: Arc<VirtualWorld>,
    sessions: DashMap<SessionId, SessionEntry>,
    /// `fingerprint key -> passed-at`, consulted for `check_only_first_join`.
    passed_before: DashMap<String, MonoTs>,
}

impl<C: Clock + Clone> VerificationEngine<C> {
    pub fn new(
        clock: C,
        scheduler: Scheduler,
        config: PolicyConfig,
        events: EventSink,
        world: Arc<VirtualWorld>,
    ) -> Arc<Self> {
        Arc::new(Self {
            clock,
            scheduler,
            config,
            events,
            world,
            sessions: DashMap::new(),
            passed_before: DashMap::new(),
        })
    }

    /// `true` if this fingerprint has already completed verification
    /// successfully, so the pipeline may skip straight to handoff when
    /// `check_only_first_join` is enabled.
    pub fn has_passed_before(&self, ip: IpAddr, username: &str) -> bool {
        self.passed_before.contains_key(&fingerprint_key(ip, username))
    }

    /// Creates a new session in `Pending`. Does not yet place it in the
    /// virtual world.
    pub fn create_session(
        &self,
        fingerprint: Fingerprint,
        now: MonoTs,
        intended_backend: Option<String>,
    ) -> SessionId {
        let session = Session::new(fingerprint, now, intended_backend);
        let id = session.id();
        self.sessions.insert(
            id,
            SessionEntry {
                session,
                timeout: None,
            },
        );
        id
    }

    pub fn kick_message(&self) -> String {
        self.config.current().kick_message.clone()
    }

    pub fn verdict(&self, id: SessionId) -> Option<Verdict> {
        let cfg = self.config.current();
        self.sessions.get(&id).and_then(|e| match e.session.phase() {
            Phase::Passed => Some(Verdict::Pass),
            Phase::Failed(reason) if cfg.kick_on_failure => Some(Verdict::FailKick(reason.clone())),
            Phase::Failed(reason) => Some(Verdict::FailQuarantine(reason.clone())),
            _ => None,
        })
    }

    pub fn snapshot(&self, id: SessionId) -> Option<SessionSnapshot> {
        self.sessions.get(&id).map(|e| e.session.snapshot())
    }

    /// Drops a session's bookkeeping entirely. Call once a verdict has
    /// been acted on (disconnected or handed off).
    pub fn forget(&self, id: SessionId) {
        if let Some((_, mut entry)) = self.sessions.remove(&id) {
            if let Some(handle) = entry.timeout.take() {
                handle.cancel();
            }
        }
        self.world.evict(id);
    }

    fn with_session(&self, id: SessionId, f: impl FnOnce(&mut Session)) {
        if let Some(mut entry) = self.sessions.get_mut(&id) {
            if entry.session.phase().is_terminal() {
                return;
            }
            f(&mut entry.session);
        }
    }

    pub fn mark_jumped(&self, id: SessionId) {
        self.with_session(id, Session::mark_jumped);
    }

    pub fn mark_crouched(&self, id: SessionId) {
        self.with_session(id, Session::mark_crouched);
    }

    pub fn mark_rotated(&self, id: SessionId) {
        self.with_session(id, Session::mark_rotated);
    }

    pub fn mark_natural_timing_observed(&self, id: SessionId) {
        self.with_session(id, Session::mark_natural_timing_observed);
    }

    fn pass(&self, id: SessionId, now: MonoTs) {
        let mut key = None;
        if let Some(mut entry) = self.sessions.get_mut(&id) {
            if entry.session.phase().is_terminal() {
                return;
            }
            entry.session.set_phase(Phase::Passed);
            if let Some(handle) = entry.timeout.take() {
                handle.cancel();
            }
            let fp = entry.session.fingerprint();
            key = Some(fingerprint_key(fp.ip, &fp.username));
        } else {
            return;
        }

        if let Some(key) = key {
            self.passed_before.insert(key, now);
        }

        let score = self
            .sessions
            .get(&id)
            .map(|e| e.session.score().fail_count)
            .unwrap_or_default();
        self.events.emit(id, EventKind::VerificationPassed { score });
        self.world.evict(id);
    }

    fn fail(&self, id: SessionId, reason: String) {
        if let Some(mut entry) = self.sessions.get_mut(&id) {
            if entry.session.phase().is_terminal() {
                return;
            }
            entry.session.set_phase(Phase::Failed(reason.clone()));
            if let Some(handle) = entry.timeout.take() {
                handle.cancel();
            }
        } else {
            return;
        }

        self.events.emit(id, EventKind::VerificationFailed { reason });
        self.world.evict(id);
    }

    /// Re-checks early-completion criteria; transitions to `Passed` when
    /// they're met.
    fn evaluate(&self, id: SessionId) {
        let cfg = self.config.current();
        let now = self.clock.now();

        let meets_criteria = {
            let Some(entry) = self.sessions.get(&id) else {
                return;
            };
            if !matches!(entry.session.phase(), Phase::InWorld) {
                return;
            }
            meets_pass_criteria(&entry.session, &cfg, now)
                && composite_score(&entry.session) >= cfg.pass_threshold
        };

        if meets_criteria {
            self.pass(id, now);
        }
    }

    /// Folds a detector's verdict into the session's fail-count. A fatal
    /// verdict, or a fail-count crossing `kick_threshold`, forces the
    /// session to `Failed` right away.
    pub fn apply_detector_verdict(&self, id: SessionId, detector: &'static str, verdict: DetectorVerdict) {
        self.events.emit(
            id,
            EventKind::DetectorFired {
                detector,
                fatal: verdict.fatal,
            },
        );

        if verdict.delta == 0 && !verdict.fatal {
            return;
        }

        let cfg = self.config.current();
        let mut should_fail = false;

        if let Some(mut entry) = self.sessions.get_mut(&id) {
            if entry.session.phase().is_terminal() {
                return;
            }
            entry.session.add_fail(verdict.delta);
            should_fail = verdict.fatal || entry.session.score().fail_count >= cfg.kick_threshold;
        } else {
            return;
        }

        if should_fail {
            self.fail(id, format!("{detector} flagged the session"));
        }
    }

    /// Surfaces a detector's own internal error (panic, unexpected input)
    /// without letting it fail the session open or closed by itself (spec
    /// §7's `InternalError` isolation rule).
    pub fn record_detector_error(&self, id: SessionId, detector: &'static str, message: String) {
        tracing::warn!(session = %id, detector, message, "detector raised an internal error; ignoring its contribution");
        self.events.emit(
            id,
            EventKind::DetectorFired {
                detector,
                fatal: false,
            },
        );
    }

    /// Chat during `InWorld` is a human-signal override (spec scenario 6):
    /// the session passes immediately regardless of remaining score.
    pub fn mark_human_signal(&self, id: SessionId) {
        self.with_session(id, Session::mark_chatted);
        let now = self.clock.now();
        self.pass(id, now);
    }

    /// Fast-path completion for a fingerprint the engine has already
    /// verified before (`check_only_first_join`, spec §6): passes the
    /// session without ever placing it in the virtual world.
    pub fn fast_pass(&self, id: SessionId) {
        let now = self.clock.now();
        self.pass(id, now);
    }

    /// Records a forwarded position/rotation update against both the
    /// session's own history and the virtual world's summary, then
    /// re-evaluates for early completion.
    pub fn record_movement(&self, id: SessionId, sample: PositionSample) {
        self.world.observe_position(id, sample);
        if let Some(mut entry) = self.sessions.get_mut(&id) {
            if entry.session.phase().is_terminal() {
                return;
            }
            entry.session.record_movement(sample);
        }
        self.evaluate(id);
    }

    pub fn mark_interacted(&self, id: SessionId) {
        self.with_session(id, Session::mark_interacted);
        self.evaluate(id);
    }

    /// Disconnect mid-verification (spec's Open Question resolution):
    /// always resolves to `Failed("disconnected")`, regardless of phase.
    pub fn terminate_on_disconnect(&self, id: SessionId) {
        self.fail(id, "disconnected".to_owned());
    }

    fn deadline_fired(&self, id: SessionId) {
        self.events.emit(id, EventKind::VerificationTimeout);

        let cfg = self.config.current();
        let late_pass = self
            .sessions
            .get(&id)
            .map(|e| composite_score(&e.session) >= cfg.pass_threshold)
            .unwrap_or(false);

        let now = self.clock.now();
        if late_pass {
            self.pass(id, now);
        } else {
            self.fail(id, "verification timed out".to_owned());
        }
    }
}

impl<C: Clock + Clone + Send + Sync + 'static> VerificationEngine<C> {
    /// `Pending -> InWorld`: spawns the session into the virtual world,
    /// arms the verification deadline, and emits `verification.started`.
    pub fn enter_world(self: &Arc<Self>, id: SessionId) -> Result<(f64, f64, f64), VerifyError> {
        let cfg = self.config.current();
        let now = self.clock.now();

        let already_entered = {
            let Some(entry) = self.sessions.get(&id) else {
                return Err(VerifyError::UnknownSession);
            };
            !matches!(entry.session.phase(), Phase::Pending)
        };
        if already_entered {
            return Ok(self.world.config().spawn);
        }

        let spawn = self.world.spawn(id, now);
        let deadline = now.checked_add(cfg.verification_duration);

        let engine = Arc::clone(self);
        let handle = self
            .scheduler
            .after(cfg.verification_duration, move || engine.deadline_fired(id));

        if let Some(mut entry) = self.sessions.get_mut(&id) {
            entry.session.set_phase(Phase::InWorld);
            entry.session.arm_deadline(deadline);
            entry.timeout = Some(handle);
        } else {
            handle.cancel();
            return Err(VerifyError::UnknownSession);
        }

        self.events.emit(id, EventKind::VerificationStarted);
        Ok(spawn)
    }
}
