//! Structured observability events (component C10).
//!
//! The sink is intentionally best-effort: publishing never blocks the
//! admission pipeline. A full channel drops the event rather than
//! back-pressuring a connection handler, matching the "drop on overflow"
//! suspension-point rule in spec §5.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use uuid::Uuid;

/// Identifies a session for its entire lifetime; also used as the
/// correlation id on every event the session produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One of the event kinds enumerated in spec §4.10.
#[derive(Debug, Clone)]
pub enum EventKind {
    ConnectionAccepted { ip: std::net::IpAddr },
    ConnectionRejected { ip: std::net::IpAddr, reason: String },
    VerificationStarted,
    VerificationPassed { score: i32 },
    VerificationFailed { reason: String },
    VerificationTimeout,
    DetectorFired { detector: &'static str, fatal: bool },
    BlockIssued { ip: std::net::IpAddr, reason: String },
    BlockExpired { ip: std::net::IpAddr },
    TransferBegin { backend: String },
    TransferComplete { backend: String },
}

impl EventKind {
    fn slot(&self) -> usize {
        match self {
            EventKind::ConnectionAccepted { .. } => 0,
            EventKind::ConnectionRejected { .. } => 1,
            EventKind::VerificationStarted => 2,
            EventKind::VerificationPassed { .. } => 3,
            EventKind::VerificationFailed { .. } => 4,
            EventKind::VerificationTimeout => 5,
            EventKind::DetectorFired { .. } => 6,
            EventKind::BlockIssued { .. } => 7,
            EventKind::BlockExpired { .. } => 8,
            EventKind::TransferBegin { .. } => 9,
            EventKind::TransferComplete { .. } => 10,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            EventKind::ConnectionAccepted { .. } => "connection.accepted",
            EventKind::ConnectionRejected { .. } => "connection.rejected",
            EventKind::VerificationStarted => "verification.started",
            EventKind::VerificationPassed { .. } => "verification.passed",
            EventKind::VerificationFailed { .. } => "verification.failed",
            EventKind::VerificationTimeout => "verification.timeout",
            EventKind::DetectorFired { .. } => "detector.fired",
            EventKind::BlockIssued { .. } => "block.issued",
            EventKind::BlockExpired { .. } => "block.expired",
            EventKind::TransferBegin { .. } => "transfer.begin",
            EventKind::TransferComplete { .. } => "transfer.complete",
        }
    }
}

const SLOT_COUNT: usize = 11;

#[derive(Debug, Clone)]
pub struct Event {
    pub correlation_id: SessionId,
    pub kind: EventKind,
}

/// Cheap counters for an operator-facing status report, keyed by event
/// kind. This is the "status report" half of C10's responsibility; the
/// detailed per-event stream goes out over the channel instead.
#[derive(Default)]
struct Counters([AtomicU64; SLOT_COUNT]);

impl Counters {
    fn record(&self, kind: &EventKind) {
        self.0[kind.slot()].fetch_add(1, Ordering::Relaxed);
    }
}

/// A snapshot of event counts by kind, for a status report.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventStats {
    pub connections_accepted: u64,
    pub connections_rejected: u64,
    pub verifications_started: u64,
    pub verifications_passed: u64,
    pub verifications_failed: u64,
    pub verifications_timed_out: u64,
    pub detectors_fired: u64,
    pub blocks_issued: u64,
    pub blocks_expired: u64,
    pub transfers_begun: u64,
    pub transfers_completed: u64,
}

/// The event sink. Cloning shares the same underlying channel and counters.
#[derive(Clone)]
pub struct EventSink {
    sender: flume::Sender<Event>,
    counters: Arc<Counters>,
}

/// The receiving half, handed to whatever forwards events to an external
/// sink (log exporter, metrics bridge — both out of scope for this crate).
pub struct EventStream {
    receiver: flume::Receiver<Event>,
}

impl EventStream {
    pub async fn recv(&self) -> Option<Event> {
        self.receiver.recv_async().await.ok()
    }

    pub fn try_recv(&self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }
}

impl EventSink {
    /// `capacity` bounds the channel; once full, further publishes are
    /// dropped silently (counters still update, since they are the
    /// always-on status-report path).
    pub fn new(capacity: usize) -> (Self, EventStream) {
        let (sender, receiver) = flume::bounded(capacity);
        (
            Self {
                sender,
                counters: Arc::new(Counters::default()),
            },
            EventStream { receiver },
        )
    }

    pub fn emit(&self, correlation_id: SessionId, kind: EventKind) {
        self.counters.record(&kind);
        tracing::debug!(
            correlation_id = %correlation_id,
            event = kind.name(),
            "gatekeeper event"
        );
        let event = Event {
            correlation_id,
            kind,
        };
        // Non-blocking try-offer: never back-pressures the pipeline.
        if self.sender.try_send(event).is_err() {
            tracing::trace!("event sink buffer full; dropping event");
        }
    }

    pub fn stats(&self) -> EventStats {
        let c = &self.counters.0;
        EventStats {
            connections_accepted: c[0].load(Ordering::Relaxed),
            connections_rejected: c[1].load(Ordering::Relaxed),
            verifications_started: c[2].load(Ordering::Relaxed),
            verifications_passed: c[3].load(Ordering::Relaxed),
            verifications_failed: c[4].load(Ordering::Relaxed),
            verifications_timed_out: c[5].load(Ordering::Relaxed),
            detectors_fired: c[6].load(Ordering::Relaxed),
            blocks_issued: c[7].load(Ordering::Relaxed),
            blocks_expired: c[8].load(Ordering::Relaxed),
            transfers_begun: c[9].load(Ordering::Relaxed),
            transfers_completed: c[10].load(Ordering::Relaxed),
        }
    }
}
