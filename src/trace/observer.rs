//! Connection lifecycle observer.
//!
//! The transport calls one method per lifecycle phase, synchronously, on the
//! path of the request. Implementations must only observe: they may measure
//! time and print, but must return quickly since the request waits for them.

use std::io;
use std::net::{IpAddr, SocketAddr};

use rustls::pki_types::CertificateDer;

/// State of a finished TLS handshake as seen by the observer.
#[derive(Debug, Clone, Default)]
pub struct TlsState {
    /// ALPN protocol agreed with the server
    pub alpn: Option<Vec<u8>>,
    /// Negotiated protocol version (`TLS 1.3`)
    pub version: Option<String>,
    /// Chain presented by the server, leaf first
    pub peer_certificates: Vec<CertificateDer<'static>>,
    /// Whether the chain was validated against the trust store
    pub verified: bool,
}

impl TlsState {
    /// Negotiated ALPN protocol as text.
    pub fn alpn_str(&self) -> Option<String> {
        self.alpn
            .as_deref()
            .map(|p| String::from_utf8_lossy(p).into_owned())
    }
}

/// Lifecycle callbacks fired by [`crate::transport::Transport`].
///
/// Every method has an empty default body; [`NoTrace`] relies on them so that
/// an untraced request compiles down to nothing.
#[allow(unused_variables)]
pub trait ConnectionObserver: Send + Sync + 'static {
    /// A connection to `host_port` is requested.
    fn dial_start(&self, host_port: &str) {}

    /// Name resolution starts.
    fn dns_start(&self, host: &str) {}

    /// Name resolution finished.
    fn dns_done(&self, result: Result<&[IpAddr], &str>) {}

    /// A TCP connection attempt starts.
    fn connect_start(&self, addr: SocketAddr) {}

    /// A TCP connection attempt finished.
    fn connect_done(&self, addr: SocketAddr, error: Option<&io::Error>) {}

    /// A usable connection is available.
    fn got_conn(&self, remote: SocketAddr) {}

    /// The TLS handshake starts.
    fn tls_start(&self) {}

    /// The TLS handshake finished, successfully or not.
    fn tls_done(&self, state: &TlsState, error: Option<&str>) {}

    /// A request header is handed to the connection.
    fn wrote_header_field(&self, name: &str, values: &[String]) {}

    /// All request headers are handed to the connection.
    fn wrote_headers(&self) {}

    /// The request, body included, was flushed to the connection.
    fn wrote_request(&self, error: Option<&str>) {}

    /// The first response byte was read.
    fn first_byte(&self) {}
}

/// Observer used when tracing is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTrace;

impl ConnectionObserver for NoTrace {}
