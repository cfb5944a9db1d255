//! Trust store initialization.

use std::sync::{Arc, LazyLock};

use rustls::pki_types::CertificateDer;
use rustls::RootCertStore;

static ROOT_STORE: LazyLock<Arc<RootCertStore>> = LazyLock::new(|| Arc::new(load_root_store()));

/// Returns the trust store used to validate server certificates.
///
/// Loaded once from the operating system certificate store, with the bundled
/// web PKI roots as a fallback when no system root can be used.
pub fn root_store() -> Arc<RootCertStore> {
    ROOT_STORE.clone()
}

fn load_root_store() -> RootCertStore {
    let native = rustls_native_certs::load_native_certs();
    for e in &native.errors {
        log::debug!("Failed to load a system root certificate: {e}");
    }
    root_store_from(native.certs)
}

/// Builds a trust store from `certs`.
///
/// Unparseable certificates are skipped. When none is usable the store is
/// filled with the bundled web PKI roots instead.
pub fn root_store_from(certs: Vec<CertificateDer<'static>>) -> RootCertStore {
    let mut roots = RootCertStore::empty();
    let (added, ignored) = roots.add_parsable_certificates(certs);
    if ignored > 0 {
        log::debug!("Ignored {ignored} unparseable system root certificate(s)");
    }
    if added == 0 {
        log::debug!("No usable system root certificate, using the bundled web PKI roots");
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    } else {
        log::debug!("Loaded {added} system root certificate(s)");
    }
    roots
}
