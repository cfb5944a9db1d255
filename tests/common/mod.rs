//! Certificates and TLS servers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use rcgen::{BasicConstraints, Certificate, CertificateParams, DnType, IsCa, KeyPair};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use tokio_rustls::TlsAcceptor;

use http_inspect::initialization::init_crypto_provider;

fn test_ca() -> (Certificate, KeyPair) {
    let mut params = CertificateParams::new(Vec::<String>::new()).expect("CA params");
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.distinguished_name.push(DnType::CommonName, "Test Root CA");
    let key = KeyPair::generate().expect("CA key");
    let ca = params.self_signed(&key).expect("CA certificate");
    (ca, key)
}

/// Builds a CA and a leaf for `names` signed by it, leaf first.
pub fn chain_for(names: &[&str], common_name: &str) -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
    let (ca, ca_key) = test_ca();
    let names: Vec<String> = names.iter().map(|n| n.to_string()).collect();
    let mut leaf_params = CertificateParams::new(names).expect("Leaf params");
    leaf_params.distinguished_name.push(DnType::CommonName, common_name);
    let leaf_key = KeyPair::generate().expect("Leaf key");
    let leaf = leaf_params.signed_by(&leaf_key, &ca, &ca_key).expect("Leaf certificate");

    let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(leaf_key.serialize_der()));
    (vec![leaf.der().clone(), ca.der().clone()], key)
}

/// A `*.test.local` leaf.
pub fn wildcard_chain() -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
    chain_for(&["*.test.local"], "test.local")
}

/// A leaf for the loopback address, as an IP Subject Alternate Name.
pub fn loopback_chain() -> (Vec<CertificateDer<'static>>, PrivateKeyDer<'static>) {
    chain_for(&["127.0.0.1"], "localhost")
}

/// Server side TLS offering the `alpn` protocols, none when empty.
pub fn tls_acceptor(
    chain: Vec<CertificateDer<'static>>,
    key: PrivateKeyDer<'static>,
    alpn: &[&[u8]],
) -> TlsAcceptor {
    init_crypto_provider();
    let mut config = rustls::ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(chain, key)
        .expect("Server TLS configuration");
    config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();
    TlsAcceptor::from(Arc::new(config))
}
