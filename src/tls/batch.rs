//! Standalone certificate check across every address of a host.
//!
//! One task is spawned per resolved address. Each task writes its result into
//! a shared map and the check only reads the map once every task has joined.

use std::collections::HashMap;
use std::io::{self, Write};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, Result};
use hickory_resolver::TokioAsyncResolver;
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::ClientConfig;
use tokio::net::{TcpStream, UdpSocket};
use tokio_rustls::TlsConnector;
use url::Url;

use super::chain::{verify_chain, CertKind};
use super::extract::summarize;
use super::matching::{host_ip, match_identity, SanMatch};
use super::validity::check_validity;
use crate::config::DEFAULT_HTTPS_PORT;
use crate::error_handling::{CertificateError, ConfigError, TransportError};
use crate::transport::{tls_client_config, Deadline};

/// Host and port whose certificates are checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertTarget {
    /// Hostname or literal IP, without brackets
    pub host: String,
    /// TCP port
    pub port: u16,
    /// URL used for URI SAN entries
    pub url: String,
}

impl CertTarget {
    /// Parses `host`, `host:port`, an IP literal or an `https` URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotHttps` for a non-`https` URL,
    /// `ConfigError::InvalidUrl`, `ConfigError::MissingHost` or
    /// `ConfigError::InvalidPort`.
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let input = input.trim();
        if input.contains("://") {
            return Self::parse_url(input);
        }
        if input.is_empty() {
            return Err(ConfigError::MissingHost(input.to_string()));
        }
        if let Ok(ip) = input.parse::<IpAddr>() {
            return Ok(Self::new(ip.to_string(), DEFAULT_HTTPS_PORT));
        }
        let (host, port) = match input.strip_prefix('[') {
            Some(rest) => match rest.split_once(']') {
                Some((host, "")) => (host, None),
                Some((host, port)) => (host, Some(port.strip_prefix(':').unwrap_or(port))),
                None => return Err(ConfigError::MissingHost(input.to_string())),
            },
            None => match input.split_once(':') {
                Some((host, port)) => (host, Some(port)),
                None => (input, None),
            },
        };
        if host.is_empty() {
            return Err(ConfigError::MissingHost(input.to_string()));
        }
        let port = match port {
            Some(port) => parse_port(port)?,
            None => DEFAULT_HTTPS_PORT,
        };
        Ok(Self::new(host.to_string(), port))
    }

    fn parse_url(input: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(input).map_err(|e| ConfigError::InvalidUrl {
            url: input.to_string(),
            reason: e.to_string(),
        })?;
        if url.scheme() != "https" {
            return Err(ConfigError::NotHttps(input.to_string()));
        }
        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| ConfigError::MissingHost(input.to_string()))?;
        let host = host.trim_start_matches('[').trim_end_matches(']').to_string();
        Ok(Self {
            host,
            port: url.port().unwrap_or(DEFAULT_HTTPS_PORT),
            url: url.to_string(),
        })
    }

    fn new(host: String, port: u16) -> Self {
        let authority = match host.parse::<IpAddr>() {
            Ok(IpAddr::V6(_)) => format!("[{host}]"),
            _ => host.clone(),
        };
        let url = if port == DEFAULT_HTTPS_PORT {
            format!("https://{authority}/")
        } else {
            format!("https://{authority}:{port}/")
        };
        Self { host, port, url }
    }
}

fn parse_port(port: &str) -> Result<u16, ConfigError> {
    match port.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port),
        _ => Err(ConfigError::InvalidPort(port.to_string())),
    }
}

/// Options of the batch certificate check.
#[derive(Debug, Clone, Copy, Default)]
pub struct CertCheckOptions {
    /// Days every certificate must still be valid for
    pub grace_days: u64,
    /// Deadline of the whole check
    pub deadline: Deadline,
}

/// Result of the check of one address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateCheckResult {
    /// Checked address
    pub addr: IpAddr,
    /// False when the address has no route and was skipped
    pub ran: bool,
    /// Findings, empty when the address passed
    pub errors: Vec<CertificateError>,
}

impl CertificateCheckResult {
    fn skipped(addr: IpAddr) -> Self {
        Self {
            addr,
            ran: false,
            errors: Vec::new(),
        }
    }

    fn failed(addr: IpAddr, ran: bool, error: CertificateError) -> Self {
        Self {
            addr,
            ran,
            errors: vec![error],
        }
    }
}

/// Aggregated results, one per resolved address, in resolution order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertReport {
    /// Per-address results
    pub results: Vec<CertificateCheckResult>,
}

impl CertReport {
    /// True when no address produced an error.
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.errors.is_empty())
    }

    /// Writes one `addr: OK` line per passing address and one `addr: error`
    /// line per finding.
    pub fn write_to(&self, out: &mut impl Write) -> io::Result<()> {
        for result in &self.results {
            match (result.ran, result.errors.as_slice()) {
                (true, []) => writeln!(out, "{}: OK", result.addr)?,
                (false, []) => writeln!(out, "{}: skipped, no route to host", result.addr)?,
                (_, errors) => {
                    for error in errors {
                        writeln!(out, "{}: {error}", result.addr)?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Resolves the addresses of a target, an IP literal resolves to itself.
///
/// Duplicates are removed, the first occurrence keeps its position.
///
/// # Errors
///
/// Returns `TransportError::Resolve` when the lookup fails, or
/// `TransportError::DeadlineExceeded`.
pub async fn resolve_target(
    resolver: &TokioAsyncResolver,
    target: &CertTarget,
    deadline: Deadline,
) -> Result<Vec<IpAddr>, TransportError> {
    if let Some(ip) = host_ip(&target.host) {
        return Ok(vec![ip]);
    }
    let lookup = deadline
        .run(resolver.lookup_ip(target.host.as_str()))
        .await?
        .map_err(|e| TransportError::Resolve {
            host: target.host.clone(),
            reason: e.to_string(),
        })?;
    let mut addrs = Vec::new();
    for ip in lookup.iter() {
        if !addrs.contains(&ip) {
            addrs.push(ip);
        }
    }
    log::debug!("Resolved {} to {addrs:?}", target.host);
    Ok(addrs)
}

/// Whether the local routing table has a route to `ip`.
///
/// Connecting a UDP socket selects a route without sending anything. A
/// missing route or an address family the host cannot use means "no route".
///
/// # Errors
///
/// Returns `CertificateError::Route` for any other socket failure.
pub async fn has_route(ip: IpAddr) -> Result<bool, CertificateError> {
    let local: SocketAddr = match ip {
        IpAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
        IpAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
    };
    let socket = match UdpSocket::bind(local).await {
        Ok(socket) => socket,
        Err(e) => {
            log::debug!("Cannot bind a socket for {ip}: {e}");
            return Ok(false);
        }
    };
    match socket.connect(SocketAddr::new(ip, DEFAULT_HTTPS_PORT)).await {
        Ok(()) => Ok(true),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::NetworkUnreachable
                    | io::ErrorKind::HostUnreachable
                    | io::ErrorKind::AddrNotAvailable
            ) =>
        {
            log::debug!("No route to {ip}: {e}");
            Ok(false)
        }
        Err(e) => Err(CertificateError::Route {
            addr: ip.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Checks a presented chain against the target and the date policy.
///
/// The leaf must match `host` (or `url` through its URI entries), every
/// certificate must be valid from `now` until `now + grace_days`, and the leaf
/// must chain up to the last certificate.
///
/// # Arguments
///
/// * `chain` - Presented chain, leaf first, not empty
/// * `host` - Target hostname or literal IP
/// * `url` - Target URL for URI SAN entries
/// * `grace_days` - Grace period in days
/// * `now` - Current time
///
/// # Returns
///
/// Every finding, empty when the chain passes.
pub fn check_chain(
    chain: &[CertificateDer<'_>],
    host: &str,
    url: &str,
    grace_days: u64,
    now: UnixTime,
) -> Vec<CertificateError> {
    let mut errors = Vec::new();
    let now_secs = i64::try_from(now.as_secs()).unwrap_or(i64::MAX);
    for (index, der) in chain.iter().enumerate() {
        let kind = CertKind::at(index, chain.len());
        let summary = match summarize(der, &kind.to_string()) {
            Ok(summary) => summary,
            Err(e) => {
                errors.push(e);
                continue;
            }
        };
        log::debug!("Checking {kind} {:?}", summary.subject);
        if kind == CertKind::Server {
            match match_identity(&summary.sans, &host.to_ascii_lowercase(), Some(url)) {
                SanMatch::NoIdentifiers => errors.push(CertificateError::NoSan),
                SanMatch::NoMatch => errors.push(CertificateError::SanMismatch),
                matched => log::debug!("Server certificate matched by {matched:?}"),
            }
        }
        errors.extend(check_validity(
            &kind.to_string(),
            &summary.subject,
            summary.validity,
            now_secs,
            grace_days,
        ));
    }
    if let Err(e) = verify_chain(chain, now) {
        errors.push(e);
    }
    errors
}

/// Connects to one address and checks the presented chain.
async fn check_address(
    target: &CertTarget,
    ip: IpAddr,
    config: Arc<ClientConfig>,
    options: CertCheckOptions,
) -> CertificateCheckResult {
    match has_route(ip).await {
        Ok(true) => {}
        Ok(false) => return CertificateCheckResult::skipped(ip),
        Err(e) => return CertificateCheckResult::failed(ip, false, e),
    }
    let addr = SocketAddr::new(ip, target.port);
    log::debug!("Connecting to {addr} for {}", target.host);

    let chain = match fetch_chain(&target.host, addr, config, options.deadline).await {
        Ok(chain) => chain,
        Err(e) => return CertificateCheckResult::failed(ip, true, e),
    };
    if chain.is_empty() {
        return CertificateCheckResult::failed(ip, true, CertificateError::NoCertificate(addr.to_string()));
    }
    CertificateCheckResult {
        addr: ip,
        ran: true,
        errors: check_chain(&chain, &target.host, &target.url, options.grace_days, UnixTime::now()),
    }
}

/// Opens a TLS connection to `addr` and returns the presented chain.
async fn fetch_chain(
    host: &str,
    addr: SocketAddr,
    config: Arc<ClientConfig>,
    deadline: Deadline,
) -> Result<Vec<CertificateDer<'static>>, CertificateError> {
    let server_name = match host_ip(host) {
        Some(ip) => ServerName::IpAddress(ip.into()),
        None => ServerName::try_from(host.to_string())
            .map_err(|e| CertificateError::Connect(e.to_string()))?,
    };
    let connect = async {
        let tcp = TcpStream::connect(addr).await?;
        TlsConnector::from(config).connect(server_name, tcp).await
    };
    let stream = tokio::time::timeout(deadline.step_timeout(), connect)
        .await
        .map_err(|_| CertificateError::Connect(format!("connection to {addr} timed out")))?
        .map_err(|e| CertificateError::Connect(e.to_string()))?;
    let chain = stream
        .get_ref()
        .1
        .peer_certificates()
        .map(|certs| certs.to_vec())
        .unwrap_or_default();
    Ok(chain)
}

/// Checks every address concurrently and waits for all of them.
///
/// Always returns exactly one result per distinct address of `addrs`, in the
/// order of `addrs`.
pub async fn check_addresses(
    target: &CertTarget,
    addrs: &[IpAddr],
    options: CertCheckOptions,
) -> CertReport {
    let mut unique: Vec<IpAddr> = Vec::with_capacity(addrs.len());
    for ip in addrs {
        if !unique.contains(ip) {
            unique.push(*ip);
        }
    }

    let config = match tls_client_config(true, Vec::new()) {
        Ok((config, _)) => config,
        Err(e) => {
            let error = CertificateError::Connect(e.to_string());
            return CertReport {
                results: unique
                    .into_iter()
                    .map(|ip| CertificateCheckResult::failed(ip, false, error.clone()))
                    .collect(),
            };
        }
    };

    let results: Arc<Mutex<HashMap<IpAddr, CertificateCheckResult>>> =
        Arc::new(Mutex::new(HashMap::with_capacity(unique.len())));
    let mut handles = Vec::with_capacity(unique.len());
    for ip in &unique {
        let ip = *ip;
        let target = target.clone();
        let config = config.clone();
        let results = results.clone();
        handles.push(tokio::spawn(async move {
            let result = check_address(&target, ip, config, options).await;
            results
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(ip, result);
        }));
    }

    // Barrier: the map is only read once every task is finished
    for handle in futures::future::join_all(handles).await {
        if let Err(e) = handle {
            log::warn!("Certificate check task failed: {e}");
        }
    }

    let mut results = results.lock().unwrap_or_else(PoisonError::into_inner);
    CertReport {
        results: unique
            .into_iter()
            .map(|ip| {
                results.remove(&ip).unwrap_or_else(|| {
                    CertificateCheckResult::failed(
                        ip,
                        false,
                        CertificateError::Connect("check task did not complete".to_string()),
                    )
                })
            })
            .collect(),
    }
}

/// Parses, resolves and checks a target.
///
/// # Errors
///
/// Fails when the target cannot be parsed or resolved. Per-address findings
/// are part of the returned report, not errors.
pub async fn check_certificates(
    input: &str,
    resolver: &TokioAsyncResolver,
    options: CertCheckOptions,
) -> Result<CertReport> {
    let target = CertTarget::parse(input)?;
    let addrs = resolve_target(resolver, &target, options.deadline)
        .await
        .with_context(|| format!("failed to resolve {input}"))?;
    log::info!(
        "Checking certificates of {}:{} on {} address(es)",
        target.host,
        target.port,
        addrs.len()
    );
    Ok(check_addresses(&target, &addrs, options).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_host_and_port() {
        let t = CertTarget::parse("example.com").unwrap();
        assert_eq!((t.host.as_str(), t.port), ("example.com", 443));
        assert_eq!(t.url, "https://example.com/");
        let t = CertTarget::parse("example.com:8443").unwrap();
        assert_eq!((t.host.as_str(), t.port), ("example.com", 8443));
        assert_eq!(t.url, "https://example.com:8443/");
    }

    #[test]
    fn test_parse_ip_literals() {
        assert_eq!(CertTarget::parse("10.0.0.1").unwrap().host, "10.0.0.1");
        let v6 = CertTarget::parse("::1").unwrap();
        assert_eq!((v6.host.as_str(), v6.port), ("::1", 443));
        let v6 = CertTarget::parse("[::1]:8443").unwrap();
        assert_eq!((v6.host.as_str(), v6.port), ("::1", 8443));
        assert_eq!(v6.url, "https://[::1]:8443/");
    }

    #[test]
    fn test_parse_urls() {
        let t = CertTarget::parse("https://api.test.local:9443/health").unwrap();
        assert_eq!((t.host.as_str(), t.port), ("api.test.local", 9443));
        assert_eq!(t.url, "https://api.test.local:9443/health");
        assert_eq!(
            CertTarget::parse("http://example.com"),
            Err(ConfigError::NotHttps("http://example.com".into()))
        );
    }

    #[test]
    fn test_parse_rejects_bad_ports() {
        assert!(matches!(CertTarget::parse("example.com:0"), Err(ConfigError::InvalidPort(_))));
        assert!(matches!(
            CertTarget::parse("example.com:https"),
            Err(ConfigError::InvalidPort(_))
        ));
        assert!(matches!(CertTarget::parse(":443"), Err(ConfigError::MissingHost(_))));
    }

    #[test]
    fn test_report_lines_and_outcome() {
        let ok: IpAddr = "192.0.2.1".parse().unwrap();
        let bad: IpAddr = "192.0.2.2".parse().unwrap();
        let skipped: IpAddr = "192.0.2.3".parse().unwrap();
        let report = CertReport {
            results: vec![
                CertificateCheckResult {
                    addr: ok,
                    ran: true,
                    errors: vec![],
                },
                CertificateCheckResult {
                    addr: bad,
                    ran: true,
                    errors: vec![CertificateError::NoSan, CertificateError::SanMismatch],
                },
                CertificateCheckResult::skipped(skipped),
            ],
        };
        assert!(!report.passed());
        let mut out = Vec::new();
        report.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "192.0.2.1: OK");
        assert_eq!(lines[1], "192.0.2.2: server certificate has no Subject Alternate Name");
        assert_eq!(
            lines[2],
            "192.0.2.2: server certificate does not match any Subject Alternate Name"
        );
        assert_eq!(lines[3], "192.0.2.3: skipped, no route to host");
    }

    #[test]
    fn test_skipped_address_does_not_fail() {
        let report = CertReport {
            results: vec![CertificateCheckResult::skipped("192.0.2.1".parse().unwrap())],
        };
        assert!(report.passed());
    }

    #[tokio::test]
    async fn test_loopback_has_route() {
        assert!(has_route(IpAddr::V4(Ipv4Addr::LOCALHOST)).await.unwrap());
    }

    #[test]
    fn test_check_chain_with_ca_and_wildcard_leaf() {
        use rcgen::{BasicConstraints, CertificateParams, IsCa, KeyPair};

        let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
        ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        let ca_key = KeyPair::generate().unwrap();
        let ca = ca_params.self_signed(&ca_key).unwrap();

        let leaf_params = CertificateParams::new(vec!["*.test.local".to_string()]).unwrap();
        let leaf_key = KeyPair::generate().unwrap();
        let leaf = leaf_params.signed_by(&leaf_key, &ca, &ca_key).unwrap();

        let chain = vec![leaf.der().clone(), ca.der().clone()];
        let url = "https://api.test.local/";
        assert!(check_chain(&chain, "api.test.local", url, 0, UnixTime::now()).is_empty());
        assert_eq!(
            check_chain(&chain, "test.local", url, 0, UnixTime::now()),
            vec![CertificateError::SanMismatch]
        );
    }
}
