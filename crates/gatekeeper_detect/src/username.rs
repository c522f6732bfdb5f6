use gatekeeper_clock::Clock;
use gatekeeper_registry::ConnectionRegistry;
use regex::Regex;
use std::sync::OnceLock;

use crate::Verdict;

fn legitimate_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z]{4,12}$").unwrap())
}

fn alnum8_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9]{8}$").unwrap())
}

fn prefix_digits_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^([A-Za-z]+)(\d{3,})$").unwrap())
}

fn digit_run_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d{4,}").unwrap())
}

fn has_vowel(s: &str) -> bool {
    s.chars()
        .any(|c| matches!(c.to_ascii_lowercase(), 'a' | 'e' | 'i' | 'o' | 'u'))
}

/// Username-morphology detector (spec §4.4). Rules are evaluated in order;
/// the first match wins. `pattern_threshold` is the configured
/// `username_pattern_threshold`; the shared per-pattern counters live in
/// the registry because a single username only ever contributes to one
/// bucket, so the cross-username accumulation has to happen there.
pub fn username_verdict<C: Clock>(
    username: &str,
    registry: &ConnectionRegistry<C>,
    pattern_threshold: u32,
) -> Verdict {
    if username.len() < 3 || username.len() > 16 {
        return Verdict::fatal(1);
    }

    // Rule 1: a short alphabetic word containing a vowel reads as legitimate.
    if legitimate_pattern().is_match(username) && has_vowel(username) {
        return Verdict::ok();
    }

    // Rule 2: whitelist override is implicit here — "bot"/"test" only reject
    // when rule 1 didn't already clear the name.
    let lowered = username.to_ascii_lowercase();
    if lowered.contains("bot") || lowered.contains("test") {
        return Verdict::fatal(1);
    }

    // Rule 3: 8 lowercase-alnum chars with no vowel — classic bot-id shape.
    if alnum8_pattern().is_match(&lowered) && !has_vowel(&lowered) {
        return Verdict::fatal(1);
    }

    // Rule 4: alphabetic prefix + ≥3 trailing digits, bucketed by prefix.
    if let Some(caps) = prefix_digits_pattern().captures(username) {
        let prefix = caps.get(1).unwrap().as_str().to_ascii_lowercase();
        let count = registry.bump_pattern_bucket(&format!("prefix:{prefix}"));
        if count > pattern_threshold {
            return Verdict::fatal(1);
        }
        return Verdict::ok();
    }

    // Rule 5: any run of ≥4 digits, bucketed by the digit-substituted shape.
    if digit_run_pattern().is_match(username) {
        let normalized = digit_run_pattern().replace_all(username, "XXXX").into_owned();
        let count = registry.bump_pattern_bucket(&format!("digits:{normalized}"));
        if count > pattern_threshold {
            return Verdict::fatal(1);
        }
        return Verdict::ok();
    }

    // Rule 6: otherwise accept.
    Verdict::ok()
}

#[cfg(test)]
mod tests {
    use gatekeeper_clock::FakeClock;

    use super::*;

    fn registry() -> ConnectionRegistry<FakeClock> {
        ConnectionRegistry::new(FakeClock::new())
    }

    #[test]
    fn short_alphabetic_with_vowel_is_legitimate() {
        assert_eq!(username_verdict("Notch", &registry(), 5), Verdict::ok());
    }

    #[test]
    fn bot_substring_is_fatal() {
        assert!(username_verdict("SuperBot", &registry(), 5).fatal);
        assert!(username_verdict("TestUser", &registry(), 5).fatal);
    }

    #[test]
    fn eight_char_alnum_no_vowel_is_fatal() {
        assert!(username_verdict("xk4j9zq2", &registry(), 5).fatal);
    }

    #[test]
    fn too_short_or_too_long_is_fatal() {
        assert!(username_verdict("ab", &registry(), 5).fatal);
        assert!(username_verdict("a".repeat(17).as_str(), &registry(), 5).fatal);
    }

    #[test]
    fn prefix_digit_pattern_rejects_once_threshold_exceeded() {
        let reg = registry();
        for i in 0..3 {
            let verdict = username_verdict(&format!("Player{i:03}"), &reg, 3);
            assert!(verdict.ok, "occurrence {i} should still be under threshold");
        }
        let verdict = username_verdict("Player999", &reg, 3);
        assert!(verdict.fatal, "4th occurrence should exceed threshold 3");
    }
}
