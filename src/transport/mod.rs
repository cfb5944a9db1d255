//! Transport for the diagnostic request.
//!
//! Opens the connection step by step (resolution, TCP, TLS, HTTP handshake)
//! so that every step can be reported to a [`ConnectionObserver`]:
//! - TLS verification uses the system trust store, or nothing in insecure mode
//! - the HTTP/1.1 pin only offers `http/1.1` in ALPN
//! - the HTTP/2 pin only offers `h2` and fails if anything else was negotiated
//! - dial and handshake timeouts derive from the caller [`Deadline`]
//! - proxy environment variables are not honored, the target is always dialed directly

mod deadline;
mod io;
mod verifier;

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use hickory_resolver::TokioAsyncResolver;
use http::header::HOST;
use http::{HeaderMap, HeaderValue, Request, Response, Uri, Version};
use hyper::body::{Body, Incoming};
use hyper::client::conn::{http1, http2};
use hyper_util::rt::{TokioExecutor, TokioIo};
use rustls::pki_types::ServerName;
use rustls::ProtocolVersion;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use url::{Host, Position, Url};

use crate::error_handling::TransportError;
use crate::trace::{ConnectionObserver, TlsState};

pub use deadline::Deadline;
pub use io::{ComposedBody, Progress, RequestBody, TracedBody, TracedIo};
pub use verifier::{tls_client_config, RecordingVerifier, VerificationOutcome};

const ALPN_H2: &[u8] = b"h2";
const ALPN_HTTP1: &[u8] = b"http/1.1";

/// HTTP protocol policy of a connection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProtocolPin {
    /// Let ALPN pick, HTTP/2 preferred
    #[default]
    Auto,
    /// Never upgrade past HTTP/1.1
    Http1,
    /// Require HTTP/2
    Http2,
}

impl ProtocolPin {
    /// Protocols offered during the TLS handshake.
    pub fn alpn(&self) -> Vec<Vec<u8>> {
        match self {
            Self::Auto => vec![ALPN_H2.to_vec(), ALPN_HTTP1.to_vec()],
            Self::Http1 => vec![ALPN_HTTP1.to_vec()],
            Self::Http2 => vec![ALPN_H2.to_vec()],
        }
    }
}

/// Formats a TLS version the way it is usually written.
pub fn tls_version_name(version: ProtocolVersion) -> String {
    match version {
        ProtocolVersion::TLSv1_2 => "TLS 1.2".to_string(),
        ProtocolVersion::TLSv1_3 => "TLS 1.3".to_string(),
        other => format!("{other:?}"),
    }
}

enum Sender {
    Http1(http1::SendRequest<RequestBody>),
    Http2(http2::SendRequest<RequestBody>),
}

/// An established connection ready for one request.
pub struct Connection {
    sender: Sender,
    remote: SocketAddr,
    authority: String,
    progress: Arc<Progress>,
}

impl Connection {
    /// Negotiated HTTP version.
    pub fn version(&self) -> Version {
        match self.sender {
            Sender::Http1(_) => Version::HTTP_11,
            Sender::Http2(_) => Version::HTTP_2,
        }
    }

    /// Address of the server.
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }
}

/// Connection factory honoring the verification and pinning policy.
pub struct Transport<O> {
    observer: Arc<O>,
    resolver: Arc<TokioAsyncResolver>,
    insecure: bool,
    pin: ProtocolPin,
    deadline: Deadline,
}

impl<O: ConnectionObserver> Transport<O> {
    /// Creates a transport reporting to `observer`.
    pub fn new(
        observer: Arc<O>,
        resolver: Arc<TokioAsyncResolver>,
        insecure: bool,
        pin: ProtocolPin,
        deadline: Deadline,
    ) -> Self {
        Self {
            observer,
            resolver,
            insecure,
            pin,
            deadline,
        }
    }

    /// Connects to `url` and sends `request` on the new connection.
    ///
    /// Redirects are not followed, the first response is returned.
    ///
    /// # Errors
    ///
    /// Any `TransportError` of [`Transport::connect`] or [`Transport::send`].
    pub async fn round_trip(
        &self,
        url: &Url,
        request: Request<ComposedBody>,
    ) -> Result<Response<Incoming>, TransportError> {
        let mut connection = self.connect(url).await?;
        self.send(&mut connection, request).await
    }

    /// Resolves, dials and, for `https`, performs the TLS handshake.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Resolve`, `Connect`, `Handshake`,
    /// `ProtocolPolicy`, `Http` or `DeadlineExceeded`.
    pub async fn connect(&self, url: &Url) -> Result<Connection, TransportError> {
        let host = url
            .host()
            .ok_or_else(|| TransportError::Resolve {
                host: url.to_string(),
                reason: "URL has no host".to_string(),
            })?
            .to_owned();
        let port = url.port_or_known_default().unwrap_or(80);
        let authority = url[Position::BeforeHost..Position::AfterPort].to_string();
        if let Some((name, proxy)) = configured_proxy(url.scheme(), |name| std::env::var(name).ok()) {
            log::debug!("Ignoring {name}={proxy}, connecting directly to {authority}");
        }
        self.observer
            .dial_start(&format!("{}:{port}", url.host_str().unwrap_or_default()));

        let addrs = self.resolve(&host).await?;
        let tcp = self.dial(&addrs, port).await?;
        let remote = tcp.peer_addr().map_err(|source| TransportError::Connect {
            addr: authority.clone(),
            source,
        })?;

        if url.scheme() != "https" {
            self.observer.got_conn(remote);
            let progress = Arc::new(Progress::new(true));
            let io = TracedIo::new(tcp, self.observer.clone(), progress.clone());
            let sender = handshake_http1(io).await?;
            return Ok(Connection {
                sender,
                remote,
                authority,
                progress,
            });
        }

        let (tls, negotiated_h2) = self.tls_handshake(&host, tcp).await?;
        self.observer.got_conn(remote);
        let progress = Arc::new(Progress::new(!negotiated_h2));
        let io = TracedIo::new(tls, self.observer.clone(), progress.clone());
        let sender = if negotiated_h2 {
            handshake_http2(io).await?
        } else {
            handshake_http1(io).await?
        };
        Ok(Connection {
            sender,
            remote,
            authority,
            progress,
        })
    }

    async fn resolve(&self, host: &Host<String>) -> Result<Vec<IpAddr>, TransportError> {
        let name = match host {
            Host::Ipv4(ip) => return Ok(vec![IpAddr::V4(*ip)]),
            Host::Ipv6(ip) => return Ok(vec![IpAddr::V6(*ip)]),
            Host::Domain(name) => name,
        };
        self.observer.dns_start(name);
        let lookup = self.deadline.run(self.resolver.lookup_ip(name.as_str())).await?;
        match lookup {
            Ok(lookup) => {
                let addrs: Vec<IpAddr> = lookup.iter().collect();
                self.observer.dns_done(Ok(&addrs));
                log::debug!("Resolved {name} to {addrs:?}");
                Ok(addrs)
            }
            Err(e) => {
                let reason = e.to_string();
                self.observer.dns_done(Err(&reason));
                Err(TransportError::Resolve {
                    host: name.clone(),
                    reason,
                })
            }
        }
    }

    /// Tries every address in order until one accepts the connection.
    async fn dial(&self, addrs: &[IpAddr], port: u16) -> Result<TcpStream, TransportError> {
        let mut last_error = None;
        for ip in addrs {
            let addr = SocketAddr::new(*ip, port);
            self.observer.connect_start(addr);
            let attempt = tokio::time::timeout(self.deadline.step_timeout(), TcpStream::connect(addr))
                .await
                .unwrap_or_else(|_| {
                    Err(std::io::Error::new(
                        std::io::ErrorKind::TimedOut,
                        "connection timed out",
                    ))
                });
            match attempt {
                Ok(stream) => {
                    self.observer.connect_done(addr, None);
                    return Ok(stream);
                }
                Err(e) => {
                    self.observer.connect_done(addr, Some(&e));
                    last_error = Some((addr, e));
                }
            }
        }
        Err(match last_error {
            Some((addr, source)) => TransportError::Connect {
                addr: addr.to_string(),
                source,
            },
            None => TransportError::Resolve {
                host: format!("port {port}"),
                reason: "no address to connect to".to_string(),
            },
        })
    }

    /// Runs the TLS handshake and enforces the protocol pin.
    ///
    /// Returns the stream and whether HTTP/2 was negotiated.
    async fn tls_handshake(
        &self,
        host: &Host<String>,
        tcp: TcpStream,
    ) -> Result<(tokio_rustls::client::TlsStream<TcpStream>, bool), TransportError> {
        let server_name = match host {
            Host::Domain(name) => ServerName::try_from(name.clone()).map_err(|e| {
                TransportError::Handshake {
                    host: name.clone(),
                    reason: e.to_string(),
                }
            })?,
            Host::Ipv4(ip) => ServerName::IpAddress(IpAddr::V4(*ip).into()),
            Host::Ipv6(ip) => ServerName::IpAddress(IpAddr::V6(*ip).into()),
        };
        let (config, verifier) = tls_client_config(self.insecure, self.pin.alpn())?;
        let connector = TlsConnector::from(config);

        self.observer.tls_start();
        let handshake =
            tokio::time::timeout(self.deadline.step_timeout(), connector.connect(server_name, tcp)).await;
        let result = match handshake {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err("TLS handshake timeout".to_string()),
        };

        let outcome = verifier.outcome();
        match result {
            Ok(stream) => {
                let session = stream.get_ref().1;
                let state = TlsState {
                    alpn: session.alpn_protocol().map(<[u8]>::to_vec),
                    version: session.protocol_version().map(tls_version_name),
                    peer_certificates: session
                        .peer_certificates()
                        .map(|certs| certs.to_vec())
                        .unwrap_or(outcome.chain),
                    verified: outcome.verified,
                };
                self.observer.tls_done(&state, None);
                let negotiated_h2 = state.alpn.as_deref() == Some(ALPN_H2);
                if self.pin == ProtocolPin::Http2 && !negotiated_h2 {
                    let negotiated = state.alpn_str().unwrap_or_else(|| "http/1.1".to_string());
                    return Err(TransportError::ProtocolPolicy(negotiated));
                }
                Ok((stream, negotiated_h2))
            }
            Err(reason) => {
                let state = TlsState {
                    peer_certificates: outcome.chain,
                    verified: false,
                    ..TlsState::default()
                };
                self.observer.tls_done(&state, Some(&reason));
                Err(TransportError::Handshake {
                    host: host.to_string(),
                    reason,
                })
            }
        }
    }

    /// Sends `request` on `connection` and waits for the response head.
    ///
    /// HTTP/1.1 requests are rewritten to origin form with a leading `host`
    /// header. Every header is reported before the request is dispatched.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Http` or `TransportError::Request`.
    pub async fn send(
        &self,
        connection: &mut Connection,
        request: Request<ComposedBody>,
    ) -> Result<Response<Incoming>, TransportError> {
        let progress = connection.progress.clone();
        let request = match connection.sender {
            Sender::Http1(_) => to_origin_form(request, &connection.authority)?,
            Sender::Http2(_) => {
                let mut request = request;
                *request.version_mut() = Version::HTTP_2;
                request
            }
        };
        let request = request.map(|body| TracedBody::new(body, progress.clone()));

        for name in request.headers().keys() {
            let values: Vec<String> = request
                .headers()
                .get_all(name)
                .iter()
                .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
                .collect();
            self.observer.wrote_header_field(name.as_str(), &values);
        }
        self.observer.wrote_headers();
        if request.body().is_end_stream() {
            progress.mark_body_done();
        }

        let response = match &mut connection.sender {
            Sender::Http1(sender) => match sender.ready().await {
                Ok(()) => sender.send_request(request).await,
                Err(e) => Err(e),
            },
            Sender::Http2(sender) => match sender.ready().await {
                Ok(()) => sender.send_request(request).await,
                Err(e) => Err(e),
            },
        };
        match response {
            Ok(response) => {
                if progress.mark_request_written() {
                    self.observer.wrote_request(None);
                }
                if progress.mark_first_byte() {
                    self.observer.first_byte();
                }
                Ok(response)
            }
            Err(e) => {
                if progress.mark_request_written() {
                    self.observer.wrote_request(Some(&e.to_string()));
                }
                Err(TransportError::Http(e))
            }
        }
    }
}

/// Rewrites an absolute-form request to origin form with `host` first.
/// Finds the proxy environment variable a proxy-aware client would use for `scheme`.
fn configured_proxy(
    scheme: &str,
    var: impl Fn(&str) -> Option<String>,
) -> Option<(&'static str, String)> {
    let names: &[&'static str] = if scheme == "https" {
        &["HTTPS_PROXY", "https_proxy", "ALL_PROXY", "all_proxy"]
    } else {
        &["HTTP_PROXY", "http_proxy", "ALL_PROXY", "all_proxy"]
    };
    names
        .iter()
        .find_map(|name| var(name).filter(|v| !v.is_empty()).map(|v| (*name, v)))
}

fn to_origin_form<B>(request: Request<B>, authority: &str) -> Result<Request<B>, TransportError> {
    let (mut parts, body) = request.into_parts();
    let path = parts
        .uri
        .path_and_query()
        .map(|p| p.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());
    parts.uri = path.parse::<Uri>().map_err(http::Error::from)?;
    parts.version = Version::HTTP_11;

    let mut headers = HeaderMap::with_capacity(parts.headers.len() + 1);
    headers.insert(
        HOST,
        HeaderValue::from_str(authority).map_err(http::Error::from)?,
    );
    for (name, value) in parts.headers.iter() {
        if name != HOST {
            headers.append(name.clone(), value.clone());
        }
    }
    parts.headers = headers;
    Ok(Request::from_parts(parts, body))
}

async fn handshake_http1<S, O>(io: TracedIo<S, O>) -> Result<Sender, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    O: ConnectionObserver,
{
    let (sender, connection) = http1::handshake(TokioIo::new(io)).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            log::debug!("HTTP/1.1 connection closed with error: {e}");
        }
    });
    Ok(Sender::Http1(sender))
}

async fn handshake_http2<S, O>(io: TracedIo<S, O>) -> Result<Sender, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    O: ConnectionObserver,
{
    let (sender, connection) = http2::handshake(TokioExecutor::new(), TokioIo::new(io)).await?;
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            log::debug!("HTTP/2 connection closed with error: {e}");
        }
    });
    Ok(Sender::Http2(sender))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http_body_util::{BodyExt, Empty};

    #[test]
    fn test_alpn_per_pin() {
        assert_eq!(ProtocolPin::Auto.alpn(), vec![b"h2".to_vec(), b"http/1.1".to_vec()]);
        assert_eq!(ProtocolPin::Http1.alpn(), vec![b"http/1.1".to_vec()]);
        assert_eq!(ProtocolPin::Http2.alpn(), vec![b"h2".to_vec()]);
    }

    #[test]
    fn test_tls_version_name() {
        assert_eq!(tls_version_name(ProtocolVersion::TLSv1_3), "TLS 1.3");
        assert_eq!(tls_version_name(ProtocolVersion::TLSv1_2), "TLS 1.2");
    }

    #[test]
    fn test_origin_form_puts_host_first() {
        let request = Request::builder()
            .uri("http://example.com:8080/a/b?c=d")
            .header("user-agent", "x/1")
            .header("x-extra", "1")
            .body(Empty::<Bytes>::new().boxed_unsync())
            .unwrap();
        let request = to_origin_form(request, "example.com:8080").unwrap();
        assert_eq!(request.uri(), "/a/b?c=d");
        let names: Vec<&str> = request.headers().keys().map(|k| k.as_str()).collect();
        assert_eq!(names, vec!["host", "user-agent", "x-extra"]);
        assert_eq!(request.headers()[HOST], "example.com:8080");
    }

    #[test]
    fn test_configured_proxy_lookup() {
        let env = |name: &str| match name {
            "HTTPS_PROXY" => Some("http://proxy:3128".to_string()),
            "http_proxy" => Some(String::new()),
            "ALL_PROXY" => Some("socks5://proxy:1080".to_string()),
            _ => None,
        };
        assert_eq!(
            configured_proxy("https", env),
            Some(("HTTPS_PROXY", "http://proxy:3128".to_string()))
        );
        // empty values are skipped
        assert_eq!(
            configured_proxy("http", env),
            Some(("ALL_PROXY", "socks5://proxy:1080".to_string()))
        );
        assert_eq!(configured_proxy("http", |_| None), None);
    }
}
