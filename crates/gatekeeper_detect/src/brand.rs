use crate::Verdict;

/// Client-brand detector (spec §4.4): an empty allow-list accepts any
/// brand outright; otherwise the brand must appear verbatim in the list.
pub fn brand_verdict(brand: &str, allowed_brands: &[&str]) -> Verdict {
    if allowed_brands.is_empty() || allowed_brands.contains(&brand) {
        Verdict::ok()
    } else {
        Verdict::suspicious(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_allow_list_accepts_anything() {
        assert_eq!(brand_verdict("totally-custom-client", &[]), Verdict::ok());
    }

    #[test]
    fn known_brand_is_accepted() {
        assert_eq!(brand_verdict("vanilla", &["vanilla", "fabric"]), Verdict::ok());
    }

    #[test]
    fn unknown_brand_is_suspicious_not_fatal() {
        let verdict = brand_verdict("sketchy-bot-client", &["vanilla"]);
        assert!(verdict.suspicious);
        assert!(!verdict.fatal);
        assert_eq!(verdict.delta, 1);
    }
}
