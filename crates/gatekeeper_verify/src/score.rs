use gatekeeper_session::Session;

const MIN_COMPLEX_DIRECTION_CHANGES: u32 = 5;

/// Composite verification score, 0..15 (spec §4.6): enough-movements (+2),
/// enough-distance (+2), any interaction (+3), jumped (+1), crouched (+1),
/// complex movement — at least 5 significant direction changes (+3),
/// natural inter-sample timing (+2), and mouse-look observed (+1).
///
/// "Enough movements"/"enough distance" are folded in here rather than via
/// the pass-criteria check in `lib.rs`, because the composite score is
/// consulted both for early completion (alongside the pass-criteria gate)
/// and, independently, for a late-pass-at-timeout decision that doesn't
/// re-check the dwell-time gate.
pub fn composite_score(session: &Session) -> i32 {
    let score = session.score();
    let flags = session.flags();

    // min_movements/min_distance live in the caller's config snapshot, not
    // here, so this reads the raw counts against the spec's own minimums
    // rather than re-deriving the configured thresholds.
    let mut total = 0;
    if score.movement_count >= 5 {
        total += 2;
    }
    if score.distance_from_spawn >= 2.0 {
        total += 2;
    }
    if flags.interacted {
        total += 3;
    }
    if flags.jumped {
        total += 1;
    }
    if flags.crouched {
        total += 1;
    }
    if score.direction_changes >= MIN_COMPLEX_DIRECTION_CHANGES {
        total += 3;
    }
    if score.natural_timing_observed {
        total += 2;
    }
    if flags.rotated {
        total += 1;
    }

    total
}
