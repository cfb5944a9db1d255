//! Inline certificate report printed while tracing a live request.
//!
//! Purely informational: a mismatch is printed in red but never fails the
//! request.

use rustls::pki_types::CertificateDer;
use url::Url;

use super::extract::SanSet;
use super::matching::{host_ip, match_dns, match_uri};
use crate::trace::TraceLog;

/// Prints the SANs of the whole chain and whether one of them covers `url`.
///
/// DNS names are listed and matched first, then IP addresses (only when the
/// URL host is a literal IP), then URIs by prefix of the full URL.
pub fn report_inline(log: &TraceLog, chain: &[CertificateDer<'_>], url: &Url) {
    let sans = SanSet::from_chain(chain);
    if sans.is_empty() {
        log.errorln("Certificate has no Subject Alternate Name");
        return;
    }
    let display_host = url.host_str().unwrap_or_default();
    let hostname = display_host.to_ascii_lowercase();

    if !sans.dns.is_empty() {
        log.info("Certificate Subject Alternate Name domains are ");
        log.valueln(format!("{:?}", sans.dns));
        if let Some(pattern) = match_dns(&sans.dns, &hostname) {
            log.info("Certificate Subject Alternate Name domain ");
            log.value(pattern);
            log.info(" matches hostname ");
            log.valueln(display_host);
            return;
        }
    }

    if !sans.ips.is_empty() {
        let ips: Vec<String> = sans.ips.iter().map(ToString::to_string).collect();
        log.info("Certificate Subject Alternate Name ips are ");
        log.valueln(format!("{ips:?}"));
        if let Some(ip) = host_ip(&hostname).filter(|ip| sans.ips.contains(ip)) {
            log.info("Certificate Subject Alternate Name ip ");
            log.value(ip);
            log.infoln(" matches hostname");
            return;
        }
    }

    if !sans.uris.is_empty() {
        log.info("Certificate Subject Alternate Name uris are ");
        log.valueln(format!("{:?}", sans.uris));
        if let Some(uri) = match_uri(&sans.uris, url.as_str()) {
            log.info("Certificate Subject Alternate Name uri ");
            log.value(uri);
            log.infoln(" matches url");
            return;
        }
    }

    log.errorln("None of the Certificate Subject Alternate Name are valid");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::MemorySink;
    use rcgen::{CertificateParams, KeyPair, SanType};

    fn cert(sans: Vec<SanType>) -> CertificateDer<'static> {
        let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
        params.subject_alt_names = sans;
        let key = KeyPair::generate().unwrap();
        params.self_signed(&key).unwrap().der().clone()
    }

    fn report(chain: &[CertificateDer<'_>], url: &str) -> String {
        colored::control::set_override(false);
        let sink = MemorySink::new();
        let log = TraceLog::new(true, Box::new(sink.clone()));
        report_inline(&log, chain, &Url::parse(url).unwrap());
        sink.text()
    }

    #[test]
    fn test_dns_match_uses_whole_chain() {
        let leaf = cert(vec![SanType::DnsName("www.example.com".try_into().unwrap())]);
        let other = cert(vec![SanType::DnsName("*.example.com".try_into().unwrap())]);
        let text = report(&[leaf, other], "https://API.example.com/x");
        assert!(text.contains("domains are [\"www.example.com\", \"*.example.com\"]"));
        assert!(text.contains("domain *.example.com matches hostname api.example.com"));
        assert!(!text.contains("None of the"));
    }

    #[test]
    fn test_ip_match() {
        let leaf = cert(vec![SanType::IpAddress("127.0.0.1".parse().unwrap())]);
        let text = report(&[leaf], "https://127.0.0.1:8443/");
        assert!(text.contains("ip 127.0.0.1 matches hostname"));
    }

    #[test]
    fn test_uri_prefix_match() {
        let leaf = cert(vec![SanType::URI("https://svc.internal/".try_into().unwrap())]);
        let text = report(&[leaf], "https://svc.internal/health");
        assert!(text.contains("uri https://svc.internal/ matches url"));
    }

    #[test]
    fn test_no_match_and_no_sans() {
        let leaf = cert(vec![SanType::DnsName("other.org".try_into().unwrap())]);
        assert!(report(&[leaf], "https://example.com/")
            .contains("None of the Certificate Subject Alternate Name are valid"));
        let bare = cert(Vec::new());
        assert!(report(&[bare], "https://example.com/")
            .contains("Certificate has no Subject Alternate Name"));
    }
}
