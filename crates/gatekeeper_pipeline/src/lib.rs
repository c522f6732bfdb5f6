//! Admission Pipeline (component C8): orchestrates the Connection
//! Registry (C2), Rate Limiter (C3), Heuristic Detectors (C4), Session
//! State (C5), Verification Engine (C6) and Virtual World (C7) on each new
//! connection and each inbound packet.
//!
//! One logical handler task per connection drives this crate's methods in
//! sequence; no shared global lock is ever held across a call into one of
//! the underlying components, so the locking discipline from spec §5
//! (`IP-stripe < Username-stripe < Session-lock < EventSink`) is respected
//! by construction — each component already enforces its own slice of it.

pub mod collaborators;
mod detector_state;
pub mod error;
pub mod packet;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use gatekeeper_clock::{Clock, MonoTs};
use gatekeeper_config::PolicyConfig;
pub use gatekeeper_detect::Verdict as DetectorVerdict;
use gatekeeper_events::{EventKind, EventSink};
pub use gatekeeper_events::SessionId;
use gatekeeper_ratelimit::{
    connection_rate_decision, packet_size_decision, Decision, PacketRateLimiter, RejectReason,
    ThrottleTracker,
};
use gatekeeper_registry::{ConnectionRegistry, RegistrationId};
pub use gatekeeper_session::Fingerprint;
use gatekeeper_verify::{PositionSample, Verdict as VerificationVerdict, VerificationEngine};
use gatekeeper_world::{ArenaConfig, VirtualWorld};

pub use collaborators::{BackendCatalog, BackendConnector, BackendRef, ConnectFailure};
use detector_state::DetectorStateStore;
pub use error::{DisconnectReason, PipelineError};
pub use packet::InboundPacket;

/// What an inbound connection attempt resolved to (spec §4.8 `on_accept`).
/// Not a `Result`: admission rejection is an expected, frequently-taken
/// branch, same rationale as [`gatekeeper_ratelimit::Decision`].
#[derive(Debug)]
pub enum AcceptOutcome {
    /// The master switch is off, or this IP is on the exclusion list: the
    /// connection proceeds straight to its backend, untouched.
    Bypass { backend: Option<BackendRef> },
    /// The session was created and placed in the verification world (or,
    /// for `check_only_first_join` repeat visitors, fast-passed outright).
    Admitted(AdmittedSession),
    Rejected(DisconnectReason),
}

#[derive(Debug, Clone)]
pub struct AdmittedSession {
    pub session_id: SessionId,
    pub registration: RegistrationId,
    pub backend: BackendRef,
    pub spawn: (f64, f64, f64),
    /// `true` if this fingerprint skipped the virtual world entirely
    /// because `check_only_first_join` is enabled and it passed before.
    pub fast_passed: bool,
}

/// The request fields gathered from the handshake/login packets by the
/// codec collaborator (spec §3's Connection Fingerprint, pre-creation).
#[derive(Debug, Clone)]
pub struct AcceptRequest {
    pub ip: IpAddr,
    pub username: String,
    pub virtual_host: String,
    pub protocol_version: i32,
    pub is_direct_ip: bool,
}

/// Outcome of routing a single decoded inbound packet (spec §4.8
/// `on_packet`). `Err` means the connection must be closed immediately; a
/// verdict surfacing here means the caller should now drive the handoff
/// or disconnect path.
#[derive(Debug)]
pub enum PacketOutcome {
    Continue,
    Verdict(VerificationVerdict),
}

/// Composes C2-C7 (component C8). Cheap to share: construct once behind an
/// `Arc` and clone it into every connection task.
pub struct AdmissionPipeline<C: Clock + Clone> {
    clock: C,
    config: PolicyConfig,
    events: EventSink,
    registry: Arc<ConnectionRegistry<C>>,
    throttle: ThrottleTracker,
    packet_rate: PacketRateLimiter,
    detector_state: DetectorStateStore,
    verify: Arc<VerificationEngine<C>>,
    world: Arc<VirtualWorld>,
    backend_catalog: Arc<dyn BackendCatalog>,
}

impl<C: Clock + Clone + Send + Sync + 'static> AdmissionPipeline<C> {
    pub fn new(
        clock: C,
        config: PolicyConfig,
        events: EventSink,
        scheduler: gatekeeper_clock::Scheduler,
        backend_catalog: Arc<dyn BackendCatalog>,
    ) -> Arc<Self> {
        let registry = Arc::new(ConnectionRegistry::new(clock.clone()));
        let cfg = config.current();
        let world = Arc::new(VirtualWorld::new(ArenaConfig::default(), Duration::from_secs(10)));
        let verify = VerificationEngine::new(clock.clone(), scheduler, config.clone(), events.clone(), Arc::clone(&world));
        let packet_rate = PacketRateLimiter::new(Duration::from_secs(1), cfg.max_packets_per_sec);

        Arc::new(Self {
            clock,
            config,
            events,
            registry,
            throttle: ThrottleTracker::new(),
            packet_rate,
            detector_state: DetectorStateStore::new(),
            verify,
            world,
            backend_catalog,
        })
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry<C>> {
        &self.registry
    }

    pub fn verify(&self) -> &Arc<VerificationEngine<C>> {
        &self.verify
    }

    fn select_backend(&self, virtual_host: &str) -> Option<BackendRef> {
        let mut names = self.backend_catalog.forced_hosts(virtual_host);
        names.extend(self.backend_catalog.attempt_connection_order());
        names.iter().find_map(|name| self.backend_catalog.lookup(name))
    }

    /// Janitor sweep (spec §4.2, §5): runs on a background cadence (every
    /// 60s per spec), cleaning expired blocks, throttles, and idle
    /// registry entries.
    pub fn sweep(&self, now: MonoTs) {
        self.registry.sweep(now);
        self.throttle.sweep(now);
    }

    /// `on_accept` (spec §4.8). Runs the full gate sequence: block list,
    /// connection-rate limiter, username-morphology and DNS detectors,
    /// then records the connection and creates a session.
    pub fn on_accept(self: &Arc<Self>, req: AcceptRequest, now: MonoTs) -> AcceptOutcome {
        let cfg = self.config.current();

        if !cfg.enabled {
            return AcceptOutcome::Bypass {
                backend: self.select_backend(&req.virtual_host),
            };
        }

        if cfg.excluded_ips.contains(&req.ip) {
            return self.admit_bypassing_checks(req, now);
        }

        if self.registry.is_blocked(req.ip, now) {
            self.events.emit(
                SessionId::new(),
                EventKind::ConnectionRejected {
                    ip: req.ip,
                    reason: "blocked".to_owned(),
                },
            );
            return AcceptOutcome::Rejected(DisconnectReason::RateLimited);
        }

        if self.throttle.is_throttled(req.ip, now) {
            return AcceptOutcome::Rejected(DisconnectReason::Throttled);
        }

        if cfg.rate_limit {
            let starts = self.registry.connection_starts(req.ip);
            let decision =
                connection_rate_decision(&starts, now, cfg.conn_rate_window, cfg.conn_rate_limit);
            if matches!(decision, Decision::Reject(RejectReason::TooManyConnections)) {
                self.throttle.throttle(req.ip, cfg.throttle_duration, now);
                return AcceptOutcome::Rejected(DisconnectReason::RateLimited);
            }
        }

        if cfg.username_pattern_check {
            let verdict = gatekeeper_detect::username_verdict(
                &req.username,
                &self.registry,
                cfg.username_pattern_threshold,
            );
            if verdict.fatal {
                return AcceptOutcome::Rejected(DisconnectReason::SuspiciousUsername);
            }
        }

        if cfg.dns_check {
            let allowed: Vec<&str> = cfg.allowed_domains.iter().map(String::as_str).collect();
            let verdict =
                gatekeeper_detect::dns_verdict(&req.virtual_host, req.is_direct_ip, cfg.allow_direct_ip, &allowed);
            if verdict.fatal {
                return AcceptOutcome::Rejected(DisconnectReason::DomainNotAllowed);
            }
        }

        self.admit(req, now)
    }

    /// Shared tail of `on_accept` once every gate has cleared: records the
    /// connection, picks a backend, and either fast-passes a returning
    /// fingerprint or places a fresh session in the virtual world.
    fn admit(self: &Arc<Self>, req: AcceptRequest, now: MonoTs) -> AcceptOutcome {
        let cfg = self.config.current();

        let Some(backend) = self.select_backend(&req.virtual_host) else {
            return AcceptOutcome::Rejected(DisconnectReason::NoServerAvailable);
        };

        let registration = self.registry.record_connection(req.ip, &req.username, now);
        self.events.emit(SessionId::new(), EventKind::ConnectionAccepted { ip: req.ip });

        let fingerprint = Fingerprint {
            ip: req.ip,
            username: req.username.clone(),
            virtual_host: req.virtual_host.clone(),
            protocol_version: req.protocol_version,
            first_seen: now,
        };

        if cfg.check_only_first_join && self.verify.has_passed_before(req.ip, &req.username) {
            let session_id = self.verify.create_session(fingerprint, now, Some(backend.name.clone()));
            self.verify.fast_pass(session_id);
            return AcceptOutcome::Admitted(AdmittedSession {
                session_id,
                registration,
                backend,
                spawn: (0.0, 64.0, 0.0),
                fast_passed: true,
            });
        }

        let session_id = self.verify.create_session(fingerprint, now, Some(backend.name.clone()));
        let spawn = match self.verify.enter_world(session_id) {
            Ok(spawn) => spawn,
            Err(_) => {
                self.verify.forget(session_id);
                let _ = self.registry.release(registration, now);
                return AcceptOutcome::Rejected(DisconnectReason::NoServerAvailable);
            }
        };

        AcceptOutcome::Admitted(AdmittedSession {
            session_id,
            registration,
            backend,
            spawn,
            fast_passed: false,
        })
    }

    /// `excluded_ips` bypass every check (spec §6), but still participate
    /// in registry bookkeeping and still land in a real session — they are
    /// exempt from scrutiny, not from accounting.
    fn admit_bypassing_checks(self: &Arc<Self>, req: AcceptRequest, now: MonoTs) -> AcceptOutcome {
        let Some(backend) = self.select_backend(&req.virtual_host) else {
            return AcceptOutcome::Rejected(DisconnectReason::NoServerAvailable);
        };

        let registration = self.registry.record_connection(req.ip, &req.username, now);
        let fingerprint = Fingerprint {
            ip: req.ip,
            username: req.username,
            virtual_host: req.virtual_host,
            protocol_version: req.protocol_version,
            first_seen: now,
        };
        let session_id = self.verify.create_session(fingerprint, now, Some(backend.name.clone()));
        self.verify.fast_pass(session_id);

        AcceptOutcome::Admitted(AdmittedSession {
            session_id,
            registration,
            backend,
            spawn: (0.0, 64.0, 0.0),
            fast_passed: true,
        })
    }

    /// `on_packet` (spec §4.8): rate/size gate first, then route by
    /// packet family.
    pub fn on_packet(
        &self,
        ip: IpAddr,
        session_id: SessionId,
        pkt: InboundPacket,
        wire_size: usize,
        now: MonoTs,
    ) -> Result<PacketOutcome, PipelineError> {
        let cfg = self.config.current();

        if cfg.rate_limit {
            if matches!(packet_size_decision(wire_size, cfg.max_packet_size), Decision::Reject(_)) {
                self.registry.block(ip, "oversize", cfg.packet_block_duration, now);
                self.events.emit(session_id, EventKind::BlockIssued { ip, reason: "oversize".to_owned() });
                return Err(PipelineError::ProtocolViolation { reason: DisconnectReason::Oversize });
            }

            if matches!(self.packet_rate.record(ip, now), Decision::Reject(_)) {
                self.registry.block(ip, "packet-flood", cfg.packet_block_duration, now);
                self.events.emit(session_id, EventKind::BlockIssued { ip, reason: "packet-flood".to_owned() });
                return Err(PipelineError::ProtocolViolation { reason: DisconnectReason::PacketFlood });
            }
        }

        match pkt {
            InboundPacket::Position { x, y, z, yaw, pitch, on_ground } => {
                self.route_position(session_id, x, y, z, yaw, pitch, on_ground, now, &cfg);
            }
            InboundPacket::Interaction => {
                if cfg.hitbox_check {
                    let moved = self
                        .verify
                        .snapshot(session_id)
                        .map_or(0, |s| s.score.movement_count);
                    let verdict = gatekeeper_detect::hitbox_verdict(moved);
                    if !verdict.ok {
                        self.verify.apply_detector_verdict(session_id, "hitbox", verdict);
                    }
                }
                self.verify.mark_interacted(session_id);
            }
            InboundPacket::Jump => self.verify.mark_jumped(session_id),
            InboundPacket::Crouch => self.verify.mark_crouched(session_id),
            InboundPacket::ClientBrand { brand } => {
                if cfg.brand_check {
                    let allowed: Vec<&str> = cfg.allowed_brands.iter().map(String::as_str).collect();
                    let verdict = gatekeeper_detect::brand_verdict(&brand, &allowed);
                    self.verify.apply_detector_verdict(session_id, "client-brand", verdict);
                }
            }
            InboundPacket::Chat { .. } => self.verify.mark_human_signal(session_id),
            InboundPacket::Other => {}
        }

        match self.verify.verdict(session_id) {
            Some(verdict) => Ok(PacketOutcome::Verdict(verdict)),
            None => Ok(PacketOutcome::Continue),
        }
    }

    /// Folds a position/rotation update into C5/C7 and, when enabled,
    /// replays it through the gravity/rotation/packet-timing detectors
    /// (spec §4.4, §4.8).
    #[allow(clippy::too_many_arguments)]
    fn route_position(
        &self,
        session_id: SessionId,
        x: f64,
        y: f64,
        z: f64,
        yaw: f64,
        pitch: f64,
        on_ground: bool,
        now: MonoTs,
        cfg: &gatekeeper_config::ConfigSnapshot,
    ) {
        let previous_yaw = self.detector_state.yaws(session_id).last().copied();
        self.detector_state.observe_position(session_id, y, on_ground, yaw, now);

        self.verify.record_movement(
            session_id,
            PositionSample { x, y, z, yaw, pitch, at: now },
        );

        if let Some(prev) = previous_yaw {
            if (prev - yaw).abs() > 0.1 {
                self.verify.mark_rotated(session_id);
            }
        }

        if cfg.gravity_check {
            let samples = self.detector_state.gravity_samples(session_id);
            let verdict = gatekeeper_detect::gravity_verdict(&samples);
            let verdict = self.detector_state.debounce(session_id, "gravity", verdict);
            if !verdict.ok {
                self.verify.apply_detector_verdict(session_id, "gravity", verdict);
            }
        }

        if cfg.yaw_check {
            let yaws = self.detector_state.yaws(session_id);
            let rotation = gatekeeper_detect::rotation_verdict(&yaws);
            let rotation = self.detector_state.debounce(session_id, "rotation", rotation);
            if !rotation.ok {
                self.verify.apply_detector_verdict(session_id, "rotation", rotation);
            }
            let repeated = gatekeeper_detect::repeated_rotation_verdict(&yaws);
            let repeated = self.detector_state.debounce(session_id, "repeated-rotation", repeated);
            if !repeated.ok {
                self.verify.apply_detector_verdict(session_id, "repeated-rotation", repeated);
            }
        }

        if cfg.world_check {
            if let Some(summary) = self.world.summary(session_id) {
                let verdict = gatekeeper_detect::world_bounds_verdict(summary.max_radius, self.world.config().radius);
                let verdict = self.detector_state.debounce(session_id, "world-bounds", verdict);
                if !verdict.ok {
                    self.verify.apply_detector_verdict(session_id, "world-bounds", verdict);
                }
            }
        }

        if cfg.latency_check {
            let deltas = self.detector_state.inter_packet_deltas(session_id);
            let verdict = gatekeeper_detect::packet_timing_verdict(&deltas);
            // `natural` reflects the detector's own, undebounced opinion: a
            // debounced suppression of a *repeat* flag must not be mistaken
            // for the cadence having actually turned natural.
            let natural = verdict.ok;
            let verdict = self.detector_state.debounce(session_id, "packet-timing", verdict);
            if natural {
                self.verify.mark_natural_timing_observed(session_id);
            } else if !verdict.ok {
                self.verify.apply_detector_verdict(session_id, "packet-timing", verdict);
            }
        }
    }

    /// Drives the handoff for a `Pass`/`FailQuarantine` verdict, retrying
    /// the backend connection once on failure before giving up (spec §4.6,
    /// §7 `BackendUnavailable`).
    pub async fn handoff<Conn: Send + 'static>(
        &self,
        connector: &dyn BackendConnector<Conn>,
        backend: &BackendRef,
        conn: Conn,
        session_id: SessionId,
    ) -> Result<(), PipelineError> {
        self.events.emit(session_id, EventKind::TransferBegin { backend: backend.name.clone() });

        match connector.connect(backend, conn).await {
            Ok(()) => {
                self.events.emit(session_id, EventKind::TransferComplete { backend: backend.name.clone() });
                Ok(())
            }
            Err(ConnectFailure { conn, error }) => {
                tracing::warn!(session = %session_id, %error, "handoff failed, retrying once");
                match connector.connect(backend, conn).await {
                    Ok(()) => {
                        self.events.emit(session_id, EventKind::TransferComplete { backend: backend.name.clone() });
                        Ok(())
                    }
                    Err(_) => Err(PipelineError::BackendUnavailable),
                }
            }
        }
    }

    /// `on_close` (spec §4.8): releases the registration, forces the
    /// session to `Failed("disconnected")` if it was still verifying, and
    /// evicts every per-session buffer this crate owns.
    pub fn on_close(&self, session_id: SessionId, registration: RegistrationId, now: MonoTs) {
        self.verify.terminate_on_disconnect(session_id);
        self.finish_session(session_id, registration, now);
    }

    /// Drops every per-session resource this crate owns. Called once a
    /// verdict has been fully acted on (handed off or disconnected) so a
    /// terminal session doesn't linger in any map.
    pub fn finish_session(&self, session_id: SessionId, registration: RegistrationId, now: MonoTs) {
        if let Err(err) = self.registry.release(registration, now) {
            tracing::trace!(session = %session_id, ?err, "registration already released");
        }
        self.verify.forget(session_id);
        self.detector_state.forget(session_id);
    }
}
