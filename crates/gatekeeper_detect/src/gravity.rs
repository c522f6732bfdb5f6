use std::time::Duration;

use gatekeeper_clock::MonoTs;

use crate::Verdict;

/// One observed position update, as consumed by the gravity and rotation
/// detectors.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub y: f64,
    pub on_ground: bool,
    pub at: MonoTs,
}

const MIN_SAMPLES: usize = 5;
const MAX_ASCENT_DURATION: Duration = Duration::from_millis(1500);

/// Gravity detector (spec §4.4): flags a session still ascending, without
/// having touched the ground, for longer than 1.5s. Needs at least 5
/// samples before it has an opinion.
pub fn gravity_verdict(samples: &[PositionSample]) -> Verdict {
    if samples.len() < MIN_SAMPLES {
        return Verdict::ok();
    }

    let last = samples.last().expect("non-empty checked above");
    if last.on_ground {
        return Verdict::ok();
    }

    // Walk backward from the most recent sample through a contiguous run of
    // airborne, non-decreasing altitude. The run's start is the moment the
    // ascent began.
    let mut ascent_start = last.at;
    for window in samples.windows(2).rev() {
        let [prev, next] = window else { unreachable!() };
        if next.on_ground || next.y < prev.y {
            break;
        }
        ascent_start = prev.at;
    }

    let airborne_for = last.at.saturating_sub(ascent_start);
    if airborne_for > MAX_ASCENT_DURATION {
        Verdict::suspicious(1)
    } else {
        Verdict::ok()
    }
}
