//! Server certificate verification that remembers what it saw.

use std::sync::{Arc, Mutex, PoisonError};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::client::WebPkiServerVerifier;
use rustls::crypto::CryptoProvider;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};

use crate::error_handling::TransportError;
use crate::initialization::{crypto_provider, root_store};

/// Chain presented during the last handshake and whether it was validated.
#[derive(Debug, Clone, Default)]
pub struct VerificationOutcome {
    /// Presented chain, leaf first
    pub chain: Vec<CertificateDer<'static>>,
    /// Whether the chain passed web PKI validation
    pub verified: bool,
}

/// Verifier wrapping the web PKI verifier over the system roots, or accepting everything in
/// insecure mode, and recording the presented chain in both cases.
#[derive(Debug)]
pub struct RecordingVerifier {
    inner: Option<Arc<WebPkiServerVerifier>>,
    provider: Arc<CryptoProvider>,
    outcome: Mutex<VerificationOutcome>,
}

impl RecordingVerifier {
    /// Creates a verifier trusting the system roots, or nothing being checked
    /// at all when `insecure` is set.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Tls` if the web PKI verifier cannot be built.
    pub fn new(insecure: bool, provider: Arc<CryptoProvider>) -> Result<Self, TransportError> {
        if insecure {
            return Ok(Self {
                inner: None,
                provider,
                outcome: Mutex::new(VerificationOutcome::default()),
            });
        }
        Self::with_roots(root_store(), provider)
    }

    /// Creates a verifier validating chains up to `roots`.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Tls` if the web PKI verifier cannot be built.
    pub fn with_roots(roots: Arc<RootCertStore>, provider: Arc<CryptoProvider>) -> Result<Self, TransportError> {
        let verifier = WebPkiServerVerifier::builder_with_provider(roots, provider.clone())
            .build()
            .map_err(|e| TransportError::Tls(rustls::Error::General(e.to_string())))?;
        Ok(Self {
            inner: Some(verifier),
            provider,
            outcome: Mutex::new(VerificationOutcome::default()),
        })
    }

    /// What the last handshake presented.
    pub fn outcome(&self) -> VerificationOutcome {
        self.outcome
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ServerCertVerifier for RecordingVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &CertificateDer<'_>,
        intermediates: &[CertificateDer<'_>],
        server_name: &ServerName<'_>,
        ocsp_response: &[u8],
        now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        let result = match &self.inner {
            Some(verifier) => {
                verifier.verify_server_cert(end_entity, intermediates, server_name, ocsp_response, now)
            }
            None => Ok(ServerCertVerified::assertion()),
        };
        let chain = std::iter::once(end_entity)
            .chain(intermediates)
            .map(|c| c.clone().into_owned())
            .collect();
        *self.outcome.lock().unwrap_or_else(PoisonError::into_inner) = VerificationOutcome {
            chain,
            verified: self.inner.is_some() && result.is_ok(),
        };
        result
    }

    fn verify_tls12_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls12_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn verify_tls13_signature(
        &self,
        message: &[u8],
        cert: &CertificateDer<'_>,
        dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        rustls::crypto::verify_tls13_signature(
            message,
            cert,
            dss,
            &self.provider.signature_verification_algorithms,
        )
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        self.provider
            .signature_verification_algorithms
            .supported_schemes()
    }
}

/// Builds a client TLS configuration.
///
/// # Arguments
///
/// * `insecure` - Skip chain and hostname validation
/// * `alpn` - Protocols offered during the handshake, in preference order
///
/// # Returns
///
/// The configuration and the verifier it uses, to read the presented chain back.
///
/// # Errors
///
/// Returns `TransportError::Tls` if the protocol versions or the verifier
/// cannot be set up.
pub fn tls_client_config(
    insecure: bool,
    alpn: Vec<Vec<u8>>,
) -> Result<(Arc<ClientConfig>, Arc<RecordingVerifier>), TransportError> {
    let provider = crypto_provider();
    let verifier = Arc::new(RecordingVerifier::new(insecure, provider.clone())?);
    let mut config = ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()?
        .dangerous()
        .with_custom_certificate_verifier(verifier.clone())
        .with_no_client_auth();
    config.alpn_protocols = alpn;
    Ok((Arc::new(config), verifier))
}
