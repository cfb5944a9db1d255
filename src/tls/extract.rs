//! Certificate extraction utilities.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use rustls::pki_types::CertificateDer;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::{GeneralName, ParsedExtension};

use crate::error_handling::CertificateError;

/// Subject Alternative Names of one or more certificates, deduplicated and in
/// first-seen order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SanSet {
    /// DNS name patterns (`*.example.com`)
    pub dns: Vec<String>,
    /// IP addresses
    pub ips: Vec<IpAddr>,
    /// URIs
    pub uris: Vec<String>,
}

impl SanSet {
    /// Extracts the SANs of a single certificate.
    pub fn from_certificate(cert: &X509Certificate<'_>) -> Self {
        let mut set = Self::default();
        set.extend_from(cert);
        set
    }

    /// Extracts and merges the SANs of every parseable certificate of a chain.
    ///
    /// Certificates that cannot be parsed contribute nothing.
    pub fn from_chain(chain: &[CertificateDer<'_>]) -> Self {
        let mut set = Self::default();
        for der in chain {
            match x509_parser::parse_x509_certificate(der.as_ref()) {
                Ok((_, cert)) => set.extend_from(&cert),
                Err(e) => log::debug!("Skipping unparseable certificate: {e}"),
            }
        }
        set
    }

    /// Adds the SANs of `cert` that are not already present.
    pub fn extend_from(&mut self, cert: &X509Certificate<'_>) {
        for ext in cert.extensions() {
            let ParsedExtension::SubjectAlternativeName(san) = ext.parsed_extension() else {
                continue;
            };
            for general_name in &san.general_names {
                match general_name {
                    GeneralName::DNSName(name) => push_unique(&mut self.dns, name.to_string()),
                    GeneralName::IPAddress(bytes) => {
                        if let Some(ip) = ip_from_bytes(bytes) {
                            push_unique(&mut self.ips, ip);
                        }
                    }
                    GeneralName::URI(uri) => push_unique(&mut self.uris, uri.to_string()),
                    // E-mail addresses, directory names, etc. do not identify a server
                    _ => {}
                }
            }
        }
    }

    /// True when the set holds no identifier at all.
    pub fn is_empty(&self) -> bool {
        self.dns.is_empty() && self.ips.is_empty() && self.uris.is_empty()
    }
}

fn push_unique<T: PartialEq>(list: &mut Vec<T>, value: T) {
    if !list.contains(&value) {
        list.push(value);
    }
}

/// Decodes the raw octets of an iPAddress SAN entry.
fn ip_from_bytes(bytes: &[u8]) -> Option<IpAddr> {
    match bytes.len() {
        4 => {
            let octets: [u8; 4] = bytes.try_into().ok()?;
            Some(IpAddr::V4(Ipv4Addr::from(octets)))
        }
        16 => {
            let octets: [u8; 16] = bytes.try_into().ok()?;
            Some(IpAddr::V6(Ipv6Addr::from(octets)))
        }
        _ => None,
    }
}

/// Validity window of a certificate, in Unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Validity {
    /// Not valid before this instant
    pub not_before: i64,
    /// Not valid after this instant
    pub not_after: i64,
}

/// Fields of a certificate the batch check reports on.
#[derive(Debug, Clone)]
pub struct CertificateSummary {
    /// Subject distinguished name
    pub subject: String,
    /// Validity window
    pub validity: Validity,
    /// SANs of this certificate only
    pub sans: SanSet,
}

/// Parses a DER certificate into the fields the validator needs.
///
/// # Errors
///
/// Returns `CertificateError::Parse` if the DER cannot be decoded.
pub fn summarize(der: &CertificateDer<'_>, kind: &str) -> Result<CertificateSummary, CertificateError> {
    let (_, cert) =
        x509_parser::parse_x509_certificate(der.as_ref()).map_err(|e| CertificateError::Parse {
            kind: kind.to_string(),
            reason: e.to_string(),
        })?;
    let validity = &cert.tbs_certificate.validity;
    Ok(CertificateSummary {
        subject: cert.tbs_certificate.subject.to_string(),
        validity: Validity {
            not_before: validity.not_before.timestamp(),
            not_after: validity.not_after.timestamp(),
        },
        sans: SanSet::from_certificate(&cert),
    })
}
