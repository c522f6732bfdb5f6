use thiserror::Error;

/// The reason text surfaced to the client, never more than this (spec §7:
/// "no error surface leaks to the peer beyond a reason string").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    RateLimited,
    Throttled,
    SuspiciousUsername,
    DomainNotAllowed,
    VerificationFailed,
    NoServerAvailable,
    PacketFlood,
    Oversize,
}

impl DisconnectReason {
    pub fn message(self) -> &'static str {
        match self {
            DisconnectReason::RateLimited => "Too many connections too quickly",
            DisconnectReason::Throttled => "Connection throttled",
            DisconnectReason::SuspiciousUsername => "Username pattern not allowed",
            DisconnectReason::DomainNotAllowed => "This server address is not allowed",
            DisconnectReason::VerificationFailed => "Verification failed",
            DisconnectReason::NoServerAvailable => "No server available",
            DisconnectReason::PacketFlood => "Too many packets too quickly",
            DisconnectReason::Oversize => "Packet too large",
        }
    }
}

/// Error kinds from spec §7. `PolicyViolation` (a detector verdict) isn't
/// represented here — it's recovered locally into a verdict/disconnect
/// reason and never escapes as an `Err`.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("protocol violation: {reason:?}")]
    ProtocolViolation { reason: DisconnectReason },

    #[error("resource exhausted, retry after {retry_after_ms}ms")]
    ResourceExhaustion { retry_after_ms: u64 },

    #[error("backend unavailable after retry")]
    BackendUnavailable,

    #[error("internal error: {0}")]
    Internal(String),
}
