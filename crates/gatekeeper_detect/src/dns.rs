use crate::Verdict;

/// DNS/virtual-host detector (spec §4.4): rejects a direct-IP connection
/// when `allow_direct_ip` is off, and rejects a virtual-host that isn't
/// suffix-matched by any entry in `allowed_domains` once that list is
/// non-empty. An empty allow-list is "no restriction", not "reject all".
pub fn dns_verdict(
    virtual_host: &str,
    is_direct_ip: bool,
    allow_direct_ip: bool,
    allowed_domains: &[&str],
) -> Verdict {
    if is_direct_ip && !allow_direct_ip {
        return Verdict::fatal(1);
    }

    if allowed_domains.is_empty() {
        return Verdict::ok();
    }

    let host = virtual_host.trim_end_matches('.').to_ascii_lowercase();
    let matched = allowed_domains.iter().any(|domain| {
        let domain = domain.trim_end_matches('.').to_ascii_lowercase();
        host == domain || host.ends_with(&format!(".{domain}"))
    });

    if matched {
        Verdict::ok()
    } else {
        Verdict::fatal(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_ip_rejected_when_disallowed() {
        let verdict = dns_verdict("1.2.3.4", true, false, &[]);
        assert!(verdict.fatal);
    }

    #[test]
    fn direct_ip_admitted_when_allowed() {
        let verdict = dns_verdict("1.2.3.4", true, true, &[]);
        assert!(verdict.ok);
    }

    #[test]
    fn empty_allow_list_admits_any_hostname() {
        let verdict = dns_verdict("play.example.net", false, true, &[]);
        assert!(verdict.ok);
    }

    #[test]
    fn subdomain_is_suffix_matched() {
        let verdict = dns_verdict("eu.play.example.com", false, true, &["example.com"]);
        assert!(verdict.ok);
    }

    #[test]
    fn unrelated_hostname_is_rejected() {
        let verdict = dns_verdict("play.evil.net", false, true, &["example.com"]);
        assert!(verdict.fatal);
    }
}
