//! Chain classification and trust verification.

use std::fmt;

use rustls::pki_types::{CertificateDer, TrustAnchor, UnixTime};
use webpki::{EndEntityCert, KeyUsage};

use crate::error_handling::CertificateError;
use crate::initialization::{crypto_provider, root_store};

/// Position of a certificate in a presented chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertKind {
    /// First certificate, the server's own
    Server,
    /// Strictly between the first and the last
    Intermediate,
    /// Last certificate of a chain of two or more
    Root,
}

impl CertKind {
    /// Kind of the certificate at `index` in a chain of `len` certificates.
    pub fn at(index: usize, len: usize) -> Self {
        if index == 0 {
            Self::Server
        } else if index + 1 == len {
            Self::Root
        } else {
            Self::Intermediate
        }
    }
}

impl fmt::Display for CertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Server => "server certificate",
            Self::Intermediate => "intermediate certificate",
            Self::Root => "root certificate",
        })
    }
}

/// A chain split by position.
#[derive(Debug, PartialEq, Eq)]
pub struct ChainParts<'a, T> {
    /// Leaf certificate
    pub leaf: &'a T,
    /// Certificates between the leaf and the root
    pub intermediates: &'a [T],
    /// Last certificate, absent for a chain of one
    pub root: Option<&'a T>,
}

/// Splits a chain into leaf, intermediates and root.
///
/// Returns `None` for an empty chain.
pub fn classify<T>(chain: &[T]) -> Option<ChainParts<'_, T>> {
    match chain {
        [] => None,
        [leaf] => Some(ChainParts {
            leaf,
            intermediates: &[],
            root: None,
        }),
        [leaf, intermediates @ .., root] => Some(ChainParts {
            leaf,
            intermediates,
            root: Some(root),
        }),
    }
}

/// Verifies that the leaf of `chain` chains up to its last certificate.
///
/// The last certificate is used as the only trust anchor and the middle ones as
/// the intermediate pool. A chain of one certificate is checked against the
/// system trust store instead.
///
/// # Errors
///
/// Returns `CertificateError::NoCertificate` for an empty chain and
/// `CertificateError::Chain` when path building or a signature check fails.
pub fn verify_chain(chain: &[CertificateDer<'_>], now: UnixTime) -> Result<(), CertificateError> {
    let parts = classify(chain).ok_or_else(|| CertificateError::NoCertificate("chain".into()))?;
    let leaf = EndEntityCert::try_from(parts.leaf)
        .map_err(|e| CertificateError::Chain(format!("invalid server certificate: {e}")))?;

    let presented_anchor: Vec<TrustAnchor<'_>>;
    let system = root_store();
    let anchors: &[TrustAnchor<'_>] = match parts.root {
        Some(root) => {
            let anchor = webpki::anchor_from_trusted_cert(root)
                .map_err(|e| CertificateError::Chain(format!("invalid root certificate: {e}")))?;
            presented_anchor = vec![anchor];
            &presented_anchor
        }
        None => &system.roots,
    };

    let provider = crypto_provider();
    leaf.verify_for_usage(
        provider.signature_verification_algorithms.all,
        anchors,
        parts.intermediates,
        now,
        KeyUsage::server_auth(),
        None,
        None,
    )
    .map(|_| ())
    .map_err(|e| CertificateError::Chain(e.to_string()))
}
