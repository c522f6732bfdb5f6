use crate::Verdict;

/// Hitbox/interaction-plausibility detector (spec §4.4, `hitbox_check`): a
/// freshly spawned session has nothing to click on before it has moved at
/// least once, since the arena's only interactable sits away from the
/// canonical spawn point. An interaction with zero prior movement samples
/// reads as a scripted click rather than a player who walked up to
/// something.
pub fn hitbox_verdict(movement_samples_seen: u32) -> Verdict {
    if movement_samples_seen == 0 {
        Verdict::suspicious(1)
    } else {
        Verdict::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interaction_before_any_movement_is_suspicious() {
        let verdict = hitbox_verdict(0);
        assert!(verdict.suspicious);
        assert!(!verdict.fatal);
    }

    #[test]
    fn interaction_after_movement_is_ok() {
        assert_eq!(hitbox_verdict(3), Verdict::ok());
    }
}
