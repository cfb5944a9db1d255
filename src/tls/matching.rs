//! SAN identity matching.
//!
//! DNS patterns are matched label by label: a pattern and a hostname match when
//! they have the same number of labels and every pattern label glob-matches the
//! corresponding hostname label (`*` any run of characters, `?` one character).
//! A wildcard therefore never spans a dot: `*.example.com` matches
//! `a.example.com` but neither `example.com` nor `a.b.example.com`.

use std::net::IpAddr;

use super::extract::SanSet;

/// Outcome of matching a target against a [`SanSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SanMatch {
    /// A DNS pattern matched the hostname
    Dns(String),
    /// An IP entry equals the literal IP hostname
    Ip(IpAddr),
    /// An URI entry is a prefix of the target URL
    Uri(String),
    /// Identifiers exist but none matched
    NoMatch,
    /// The set is empty
    NoIdentifiers,
}

impl SanMatch {
    /// Whether the target is covered by the certificate.
    pub fn is_match(&self) -> bool {
        matches!(self, Self::Dns(_) | Self::Ip(_) | Self::Uri(_))
    }
}

/// Parses a hostname as a literal IP, accepting the bracketed IPv6 URL form.
pub fn host_ip(host: &str) -> Option<IpAddr> {
    host.trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .ok()
}

/// First DNS pattern of `patterns` matching `host`.
pub fn match_dns<'a>(patterns: &'a [String], host: &str) -> Option<&'a str> {
    patterns
        .iter()
        .find(|p| dns_pattern_matches(p, host))
        .map(String::as_str)
}

/// First IP entry equal to `host` when `host` is a literal IP.
pub fn match_ip(ips: &[IpAddr], host: &str) -> Option<IpAddr> {
    let host_ip = host_ip(host)?;
    ips.iter().copied().find(|ip| *ip == host_ip)
}

/// First URI entry that is a prefix of `url`.
pub fn match_uri<'a>(uris: &'a [String], url: &str) -> Option<&'a str> {
    uris.iter()
        .find(|uri| url.starts_with(uri.as_str()))
        .map(String::as_str)
}

/// Matches a target against every identifier kind, DNS first, then IP, then URI.
///
/// # Arguments
///
/// * `sans` - Identifiers presented by the server
/// * `host` - Target hostname or literal IP
/// * `url` - Target URL for URI entries, if any
pub fn match_identity(sans: &SanSet, host: &str, url: Option<&str>) -> SanMatch {
    if sans.is_empty() {
        return SanMatch::NoIdentifiers;
    }
    if let Some(pattern) = match_dns(&sans.dns, host) {
        return SanMatch::Dns(pattern.to_string());
    }
    if let Some(ip) = match_ip(&sans.ips, host) {
        return SanMatch::Ip(ip);
    }
    if let Some(uri) = url.and_then(|u| match_uri(&sans.uris, u)) {
        return SanMatch::Uri(uri.to_string());
    }
    SanMatch::NoMatch
}

/// Label-wise, case-insensitive glob match of a DNS pattern.
pub fn dns_pattern_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim_end_matches('.').to_ascii_lowercase();
    let host = host.trim_end_matches('.').to_ascii_lowercase();
    if pattern.is_empty() || host.is_empty() {
        return false;
    }
    let pattern_labels: Vec<&str> = pattern.split('.').collect();
    let host_labels: Vec<&str> = host.split('.').collect();
    pattern_labels.len() == host_labels.len()
        && pattern_labels
            .iter()
            .zip(&host_labels)
            .all(|(p, h)| !h.is_empty() && glob_label(p.as_bytes(), h.as_bytes()))
}

/// Glob match within a single label.
fn glob_label(pattern: &[u8], text: &[u8]) -> bool {
    let (mut p, mut t) = (0usize, 0usize);
    // Position of the last `*` and the text index it is currently absorbing up to
    let mut backtrack: Option<(usize, usize)> = None;
    while t < text.len() {
        match pattern.get(p) {
            Some(b'*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == b'?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, absorbed)) => {
                    p = star + 1;
                    t = absorbed + 1;
                    backtrack = Some((star, absorbed + 1));
                }
                None => return false,
            },
        }
    }
    pattern[p..].iter().all(|&c| c == b'*')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn test_wildcard_matches_single_label_only() {
        assert!(dns_pattern_matches("*.example.com", "a.example.com"));
        assert!(!dns_pattern_matches("*.example.com", "example.com"));
        assert!(!dns_pattern_matches("*.example.com", "a.b.example.com"));
    }

    #[test]
    fn test_exact_and_case_insensitive() {
        assert!(dns_pattern_matches("Example.COM", "example.com"));
        assert!(dns_pattern_matches("example.com.", "example.com"));
        assert!(!dns_pattern_matches("example.com", "example.org"));
    }

    #[test]
    fn test_partial_label_wildcards() {
        assert!(dns_pattern_matches("api-*.example.com", "api-eu.example.com"));
        assert!(dns_pattern_matches("a?c.example.com", "abc.example.com"));
        assert!(!dns_pattern_matches("api-*.example.com", "web-eu.example.com"));
        assert!(dns_pattern_matches("*a*b.example.com", "xxaxxb.example.com"));
        assert!(!dns_pattern_matches("*a*b.example.com", "xxaxxbc.example.com"));
    }

    #[test]
    fn test_ip_only_matches_literal_hosts() {
        let ips = vec![IpAddr::V4(Ipv4Addr::new(192, 0, 2, 10))];
        assert_eq!(match_ip(&ips, "192.0.2.10"), Some(ips[0]));
        assert_eq!(match_ip(&ips, "example.com"), None);
        assert_eq!(host_ip("[::1]"), Some("::1".parse().unwrap()));
    }

    #[test]
    fn test_match_identity_order_and_outcomes() {
        let sans = SanSet {
            dns: vec!["*.test.local".into()],
            ips: vec![IpAddr::V4(Ipv4Addr::new(10, 1, 1, 1))],
            uris: vec!["https://svc.internal/".into()],
        };
        assert_eq!(
            match_identity(&sans, "api.test.local", None),
            SanMatch::Dns("*.test.local".into())
        );
        assert_eq!(
            match_identity(&sans, "10.1.1.1", None),
            SanMatch::Ip(IpAddr::V4(Ipv4Addr::new(10, 1, 1, 1)))
        );
        assert_eq!(
            match_identity(&sans, "svc.internal", Some("https://svc.internal/health")),
            SanMatch::Uri("https://svc.internal/".into())
        );
        assert_eq!(match_identity(&sans, "other.host", None), SanMatch::NoMatch);
        assert_eq!(
            match_identity(&SanSet::default(), "api.test.local", None),
            SanMatch::NoIdentifiers
        );
    }
}
