//! Independent heuristic detectors (component C4): username morphology,
//! DNS/virtual-host, client brand, gravity, rotation, packet-timing, and
//! repeated-rotation.
//!
//! Each detector is a pure function over its inputs plus, where the data
//! model requires it, a read of shared per-pattern counters in
//! [`gatekeeper_registry::ConnectionRegistry`]. None of them touch a
//! session directly — the verification engine folds a [`Verdict`] into the
//! session's score and fail-count.

mod brand;
mod dns;
mod gravity;
mod hitbox;
mod rotation;
mod timing;
mod username;
mod world;

pub use brand::brand_verdict;
pub use dns::dns_verdict;
pub use gravity::{gravity_verdict, PositionSample};
pub use hitbox::hitbox_verdict;
pub use rotation::{repeated_rotation_verdict, rotation_verdict};
pub use timing::packet_timing_verdict;
pub use username::username_verdict;
pub use world::world_bounds_verdict;

/// The outcome of a single detector evaluation. `fatal` forces the owning
/// session to `Failed` regardless of its accumulated score; `suspicious`
/// alone only nudges the fail-count via `delta`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Verdict {
    pub ok: bool,
    pub suspicious: bool,
    pub fatal: bool,
    pub delta: i32,
}

impl Verdict {
    pub const fn ok() -> Self {
        Self {
            ok: true,
            suspicious: false,
            fatal: false,
            delta: 0,
        }
    }

    pub const fn suspicious(delta: i32) -> Self {
        Self {
            ok: false,
            suspicious: true,
            fatal: false,
            delta,
        }
    }

    pub const fn fatal(delta: i32) -> Self {
        Self {
            ok: false,
            suspicious: true,
            fatal: true,
            delta,
        }
    }
}
