//! TLS certificate validation.
//!
//! Two entry points share the SAN matching and date rules:
//! - [`report_inline`] prints, during a traced request, whether the presented
//!   chain covers the request target. It never fails the request.
//! - [`check_certificates`] connects to every address of a host, without
//!   transport verification, and reports per-address findings:
//!   - SAN identity of the server certificate
//!   - validity dates of every certificate, with a grace period in days
//!   - trust from the server certificate up to the last presented one
//!
//! Uses `tokio-rustls` for the connections, `x509-parser` for certificate
//! parsing and `rustls-webpki` for chain verification.

mod batch;
mod chain;
mod extract;
mod inline;
mod matching;
mod validity;

pub use batch::{
    check_addresses, check_certificates, check_chain, has_route, resolve_target, CertCheckOptions,
    CertReport, CertTarget, CertificateCheckResult,
};
pub use chain::{classify, verify_chain, CertKind, ChainParts};
pub use extract::{summarize, CertificateSummary, SanSet, Validity};
pub use inline::report_inline;
pub use matching::{dns_pattern_matches, match_identity, SanMatch};
pub use validity::check_validity;
