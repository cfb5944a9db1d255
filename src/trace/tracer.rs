//! Request timeline tracer.
//!
//! [`Tracer`] implements [`ConnectionObserver`]: every callback advances a small
//! phase state machine, records a [`TraceEvent`] and prints one timeline line.
//! Start timestamps live in a per-request [`PhaseStarts`] record; a "done"
//! callback without its "start" measures a zero duration instead of failing.

use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use url::Url;

use super::observer::{ConnectionObserver, TlsState};
use super::printer::TraceLog;
use crate::tls::report_inline;

/// Progress of a single request, in chronological order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    /// Nothing happened yet
    Idle,
    /// Resolving the target hostname
    Resolving,
    /// Opening a TCP connection
    Connecting,
    /// TCP connection established
    Connected,
    /// TLS handshake in progress
    TlsHandshaking,
    /// TLS handshake finished
    TlsDone,
    /// Request headers being written
    HeadersWriting,
    /// Request headers written
    HeadersWritten,
    /// Request body written and flushed
    RequestWritten,
    /// Waiting for the server
    AwaitingFirstByte,
    /// First response byte received
    FirstByteReceived,
}

/// Kind of a recorded lifecycle event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Connection requested
    DialStart,
    /// Resolution started
    DnsStart,
    /// Resolution finished
    DnsDone,
    /// TCP attempt started
    ConnectStart,
    /// TCP attempt finished
    ConnectDone,
    /// Connection ready for the request
    GotConn,
    /// TLS handshake started
    TlsStart,
    /// TLS handshake finished
    TlsDone,
    /// One request header written
    HeaderField,
    /// All request headers written
    HeadersWritten,
    /// Request fully written
    RequestWritten,
    /// First response byte
    FirstByte,
}

/// One entry of the request timeline.
#[derive(Debug, Clone)]
pub struct TraceEvent {
    /// What happened
    pub kind: EventKind,
    /// When it happened
    pub at: Instant,
    /// Time elapsed since the matching start event, zero for start events
    pub elapsed: Duration,
    /// Failure reported with the event
    pub error: Option<String>,
}

/// Start timestamps of the phases being measured.
#[derive(Debug, Default, Clone)]
pub struct PhaseStarts {
    dial: Option<Instant>,
    dns: Option<Instant>,
    connect: Option<Instant>,
    handshake: Option<Instant>,
    headers: Option<Instant>,
    request: Option<Instant>,
    first_byte: Option<Instant>,
}

/// Selects one timestamp of [`PhaseStarts`].
#[derive(Debug, Clone, Copy)]
enum Slot {
    Dial,
    Dns,
    Connect,
    Handshake,
    Headers,
    Request,
    FirstByte,
}

impl PhaseStarts {
    fn slot(&mut self, slot: Slot) -> &mut Option<Instant> {
        match slot {
            Slot::Dial => &mut self.dial,
            Slot::Dns => &mut self.dns,
            Slot::Connect => &mut self.connect,
            Slot::Handshake => &mut self.handshake,
            Slot::Headers => &mut self.headers,
            Slot::Request => &mut self.request,
            Slot::FirstByte => &mut self.first_byte,
        }
    }
}

#[derive(Debug)]
struct TraceState {
    phase: Phase,
    starts: PhaseStarts,
    events: Vec<TraceEvent>,
}

/// Observer printing a human-readable request timeline.
#[derive(Debug)]
pub struct Tracer {
    log: Arc<TraceLog>,
    target: Url,
    insecure: bool,
    state: Mutex<TraceState>,
}

/// Elapsed time since `start`, a missing start counts as "now".
fn since(start: Option<Instant>, now: Instant) -> Duration {
    start
        .map(|s| now.saturating_duration_since(s))
        .unwrap_or_default()
}

fn fmt_duration(d: Duration) -> String {
    format!("{d:?}")
}

impl Tracer {
    /// Creates a tracer for a request to `target`.
    ///
    /// `insecure` silences the unverified-chain warning since verification was
    /// disabled on purpose.
    pub fn new(log: Arc<TraceLog>, target: Url, insecure: bool) -> Self {
        Self {
            log,
            target,
            insecure,
            state: Mutex::new(TraceState {
                phase: Phase::Idle,
                starts: PhaseStarts::default(),
                events: Vec::new(),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, TraceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records an event and returns its elapsed duration.
    ///
    /// `start` selects the start timestamp the event measures against, `reset`
    /// the one it (re)starts.
    fn record(
        &self,
        kind: EventKind,
        phase: Option<Phase>,
        start: Option<Slot>,
        reset: Option<Slot>,
        error: Option<String>,
    ) -> Duration {
        let now = Instant::now();
        let mut state = self.state();
        let elapsed = start.map_or(Duration::ZERO, |slot| since(*state.starts.slot(slot), now));
        if let Some(slot) = reset {
            *state.starts.slot(slot) = Some(now);
        }
        if let Some(phase) = phase {
            if phase >= state.phase {
                state.phase = phase;
            } else {
                log::debug!("Out of order trace event {kind:?} in phase {:?}", state.phase);
            }
        }
        state.events.push(TraceEvent {
            kind,
            at: now,
            elapsed,
            error,
        });
        elapsed
    }

    /// Current phase of the request.
    pub fn phase(&self) -> Phase {
        self.state().phase
    }

    /// Events recorded so far, in emission order.
    pub fn events(&self) -> Vec<TraceEvent> {
        self.state().events.clone()
    }
}

impl ConnectionObserver for Tracer {
    fn dial_start(&self, host_port: &str) {
        self.record(EventKind::DialStart, None, None, Some(Slot::Dial), None);
        self.log.info("Dialing ");
        self.log.value(host_port);
        self.log.infoln("...");
    }

    fn dns_start(&self, host: &str) {
        self.record(
            EventKind::DnsStart,
            Some(Phase::Resolving),
            None,
            Some(Slot::Dns),
            None,
        );
        self.log.info("Resolving ");
        self.log.value(host);
        self.log.infoln("...");
    }

    fn dns_done(&self, result: Result<&[IpAddr], &str>) {
        let error = result.err().map(str::to_string);
        let elapsed = self.record(
            EventKind::DnsDone,
            Some(Phase::Resolving),
            Some(Slot::Dns),
            None,
            error,
        );
        match result {
            Ok(addrs) => {
                let list: Vec<String> = addrs.iter().map(|a| format!("{:?}", a.to_string())).collect();
                self.log.info("Resolved hostname to ");
                self.log.value(format!("[{}]", list.join(", ")));
            }
            Err(e) => {
                self.log.info("Could not resolve hostname : ");
                self.log.error(e);
            }
        }
        self.log.info(" in ");
        self.log.valueln(fmt_duration(elapsed));
    }

    fn connect_start(&self, addr: SocketAddr) {
        self.record(
            EventKind::ConnectStart,
            Some(Phase::Connecting),
            None,
            Some(Slot::Connect),
            None,
        );
        self.log.info("Starting connection to ");
        self.log.value(format!("tcp:{addr}"));
        self.log.infoln("...");
    }

    fn connect_done(&self, addr: SocketAddr, error: Option<&io::Error>) {
        let phase = if error.is_some() {
            Phase::Connecting
        } else {
            Phase::Connected
        };
        let elapsed = self.record(
            EventKind::ConnectDone,
            Some(phase),
            Some(Slot::Connect),
            None,
            error.map(ToString::to_string),
        );
        let addr = format!("tcp:{addr}");
        match error {
            Some(e) => {
                self.log.info("Could not establish a connection to ");
                self.log.value(addr);
                self.log.info(" after ");
                self.log.value(fmt_duration(elapsed));
                self.log.info(" : ");
                self.log.errorln(e);
            }
            None => {
                self.log.info("Established a connection to ");
                self.log.value(addr);
                self.log.info(" after ");
                self.log.valueln(fmt_duration(elapsed));
            }
        }
    }

    fn got_conn(&self, remote: SocketAddr) {
        let elapsed = self.record(
            EventKind::GotConn,
            None,
            Some(Slot::Dial),
            Some(Slot::Request),
            None,
        );
        self.log.info("Got a valid connection to ");
        self.log.value(remote);
        self.log.info(" in ");
        self.log.valueln(fmt_duration(elapsed));
    }

    fn tls_start(&self) {
        self.record(
            EventKind::TlsStart,
            Some(Phase::TlsHandshaking),
            None,
            Some(Slot::Handshake),
            None,
        );
        self.log.infoln("Starting TLS handshake...");
    }

    fn tls_done(&self, state: &TlsState, error: Option<&str>) {
        let elapsed = self.record(
            EventKind::TlsDone,
            Some(Phase::TlsDone),
            Some(Slot::Handshake),
            None,
            error.map(str::to_string),
        );
        match error {
            Some(e) => {
                self.log.info("TLS handshake failed : ");
                self.log.error(e);
            }
            None => self.log.info("TLS handshake successful"),
        }
        self.log.info(" in ");
        self.log.valueln(fmt_duration(elapsed));
        if let Some(alpn) = state.alpn_str() {
            self.log.info("ALPN negotiated protocol is ");
            self.log.valueln(alpn);
        }
        if let Some(version) = &state.version {
            self.log.info("TLS version is ");
            self.log.valueln(version);
        }
        if !state.peer_certificates.is_empty() {
            report_inline(&self.log, &state.peer_certificates, &self.target);
        }
        if error.is_none() && !state.verified && !self.insecure {
            self.log.errorln("Certificate is not verified");
        }
    }

    fn wrote_header_field(&self, name: &str, values: &[String]) {
        let first = self.state().starts.headers.is_none();
        self.record(
            EventKind::HeaderField,
            Some(Phase::HeadersWriting),
            None,
            if first { Some(Slot::Headers) } else { None },
            None,
        );
        self.log.info("Sent header ");
        self.log.value(format!("{name:?}"));
        self.log.info(" : ");
        match values {
            [single] => self.log.valueln(format!("{single:?}")),
            many => self.log.valueln(format!("{many:?}")),
        }
    }

    fn wrote_headers(&self) {
        let started = self.state().starts.headers.is_some();
        let elapsed = self.record(
            EventKind::HeadersWritten,
            Some(Phase::HeadersWritten),
            Some(Slot::Headers),
            None,
            None,
        );
        if started {
            self.log.info("All headers have been sent in ");
            self.log.valueln(fmt_duration(elapsed));
        }
    }

    fn wrote_request(&self, error: Option<&str>) {
        let elapsed = self.record(
            EventKind::RequestWritten,
            Some(Phase::AwaitingFirstByte),
            Some(Slot::Request),
            Some(Slot::FirstByte),
            error.map(str::to_string),
        );
        match error {
            Some(e) => {
                self.log.info("Failed to write request : ");
                self.log.error(e);
                self.log.info(" ");
            }
            None => self.log.info("Request is sent "),
        }
        self.log.info("in ");
        self.log.valueln(fmt_duration(elapsed));
    }

    fn first_byte(&self) {
        let elapsed = self.record(
            EventKind::FirstByte,
            Some(Phase::FirstByteReceived),
            Some(Slot::FirstByte),
            None,
            None,
        );
        self.log.info("Received first byte in ");
        self.log.valueln(fmt_duration(elapsed));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::MemorySink;

    fn tracer(sink: &MemorySink) -> Tracer {
        colored::control::set_override(false);
        let log = Arc::new(TraceLog::new(true, Box::new(sink.clone())));
        Tracer::new(log, Url::parse("http://example.com/").unwrap(), false)
    }

    #[test]
    fn test_done_without_start_measures_zero() {
        let sink = MemorySink::new();
        let t = tracer(&sink);
        t.first_byte();
        let events = t.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].elapsed, Duration::ZERO);
        assert_eq!(t.phase(), Phase::FirstByteReceived);
    }

    #[test]
    fn test_phases_advance_in_order() {
        let sink = MemorySink::new();
        let t = tracer(&sink);
        let addr: SocketAddr = "127.0.0.1:80".parse().unwrap();
        t.dial_start("example.com:80");
        assert_eq!(t.phase(), Phase::Idle);
        t.dns_start("example.com");
        assert_eq!(t.phase(), Phase::Resolving);
        t.dns_done(Ok(&[addr.ip()]));
        t.connect_start(addr);
        assert_eq!(t.phase(), Phase::Connecting);
        t.connect_done(addr, None);
        assert_eq!(t.phase(), Phase::Connected);
        t.got_conn(addr);
        t.wrote_header_field("user-agent", &["x/1".to_string()]);
        assert_eq!(t.phase(), Phase::HeadersWriting);
        t.wrote_headers();
        assert_eq!(t.phase(), Phase::HeadersWritten);
        t.wrote_request(None);
        assert_eq!(t.phase(), Phase::AwaitingFirstByte);
        t.first_byte();
        assert_eq!(t.phase(), Phase::FirstByteReceived);

        let events = t.events();
        assert!(events.windows(2).all(|w| w[0].at <= w[1].at));
        let text = sink.text();
        assert!(text.contains("Dialing example.com:80..."));
        assert!(text.contains("Resolved hostname to [\"127.0.0.1\"]"));
        assert!(text.contains("Established a connection to tcp:127.0.0.1:80"));
        assert!(text.contains("Sent header \"user-agent\" : \"x/1\""));
        assert!(text.contains("Received first byte in "));
    }

    #[test]
    fn test_failed_connect_keeps_connecting_phase() {
        let sink = MemorySink::new();
        let t = tracer(&sink);
        let addr: SocketAddr = "10.0.0.1:443".parse().unwrap();
        t.connect_start(addr);
        let err = io::Error::new(io::ErrorKind::ConnectionRefused, "refused");
        t.connect_done(addr, Some(&err));
        assert_eq!(t.phase(), Phase::Connecting);
        assert_eq!(t.events()[1].error.as_deref(), Some("refused"));
        assert!(sink.text().contains("Could not establish a connection to tcp:10.0.0.1:443"));
    }

    #[test]
    fn test_unverified_chain_warning() {
        let sink = MemorySink::new();
        let t = tracer(&sink);
        t.tls_start();
        t.tls_done(&TlsState::default(), None);
        assert!(sink.text().contains("Certificate is not verified"));
    }

    #[test]
    fn test_insecure_mode_silences_unverified_warning() {
        colored::control::set_override(false);
        let sink = MemorySink::new();
        let log = Arc::new(TraceLog::new(true, Box::new(sink.clone())));
        let t = Tracer::new(log, Url::parse("https://example.com/").unwrap(), true);
        t.tls_done(
            &TlsState {
                alpn: Some(b"h2".to_vec()),
                version: Some("TLS 1.3".into()),
                ..TlsState::default()
            },
            None,
        );
        let text = sink.text();
        assert!(!text.contains("Certificate is not verified"));
        assert!(text.contains("ALPN negotiated protocol is h2"));
        assert!(text.contains("TLS version is TLS 1.3"));
    }

    #[test]
    fn test_failed_handshake_reports_only_the_failure() {
        let sink = MemorySink::new();
        let t = tracer(&sink);
        t.tls_start();
        t.tls_done(&TlsState::default(), Some("invalid peer certificate: UnknownIssuer"));
        let text = sink.text();
        assert!(text.contains("TLS handshake failed : invalid peer certificate: UnknownIssuer"));
        assert!(!text.contains("Certificate is not verified"));
    }
}
