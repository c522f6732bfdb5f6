use crate::Verdict;

/// World-bounds detector (spec §4.4/§4.7, `world_check`): the virtual
/// world's arena has a configured radius around the canonical spawn; a
/// reported position farther out than that is outside the world's
/// "expected motion envelope" and reads as a speed-hack or a client that
/// never actually entered the synthetic room.
pub fn world_bounds_verdict(distance_from_spawn: f64, arena_radius: f64) -> Verdict {
    if distance_from_spawn > arena_radius {
        Verdict::suspicious(1)
    } else {
        Verdict::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within_radius_is_ok() {
        assert_eq!(world_bounds_verdict(5.0, 16.0), Verdict::ok());
    }

    #[test]
    fn boundary_distance_is_ok() {
        assert_eq!(world_bounds_verdict(16.0, 16.0), Verdict::ok());
    }

    #[test]
    fn beyond_radius_is_suspicious() {
        let verdict = world_bounds_verdict(20.0, 16.0);
        assert!(verdict.suspicious);
        assert!(!verdict.fatal);
    }
}
