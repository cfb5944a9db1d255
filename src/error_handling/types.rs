//! Error type definitions.
//!
//! This module defines the error types used throughout the application, one
//! enum per error class:
//! - [`ConfigError`]: rejected at construction time, nothing is started
//! - [`TransportError`]: fatal for a live request
//! - [`CertificateError`]: per-address findings of the batch certificate check
//! - [`RenderError`]: always recovered by falling back to a simpler presenter

use log::SetLoggerError;
use reqwest::Error as ReqwestError;
use thiserror::Error;

/// Error types for initialization failures.
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)] // All variants end with "Error" by convention
pub enum InitializationError {
    /// Error initializing the logger.
    #[error("Logger initialization error: {0}")]
    LoggerError(#[from] SetLoggerError),

    /// Error initializing the HTTP client.
    #[error("HTTP client initialization error: {0}")]
    HttpClientError(#[from] ReqwestError),
}

/// Errors detected while building a client or a certificate check.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The request method is empty.
    #[error("method cannot be empty")]
    EmptyMethod,

    /// The request method contains something else than letters.
    #[error("{0}: invalid method")]
    InvalidMethod(String),

    /// Both protocol pins were requested.
    #[error("cannot force HTTP/1.1 and HTTP/2 at the same time")]
    ConflictingProtocols,

    /// HTTP/2 was pinned on a plain-text URL.
    #[error("HTTP/2 requires (de facto) a TLS connection")]
    Http2RequiresTls,

    /// The highlighting style is not part of the bundled theme set.
    #[error("{0}: unknown style")]
    UnknownStyle(String),

    /// The structured query could not be parsed.
    #[error("invalid jq filter: {0}")]
    InvalidFilter(String),

    /// A header line is not of the `name: value` form or is not a valid header.
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// The target could not be parsed as an URL.
    #[error("failed to parse url {url}: {reason}")]
    InvalidUrl {
        /// Offending input
        url: String,
        /// Parser message
        reason: String,
    },

    /// The URL scheme is not supported by the operation.
    #[error("{0} is not an HTTP(S) URL")]
    UnsupportedScheme(String),

    /// The certificate check only accepts `https` URLs.
    #[error("{0} is not an HTTPS URL")]
    NotHttps(String),

    /// The URL has no host part.
    #[error("{0} has no host")]
    MissingHost(String),

    /// The port could not be parsed or is out of range.
    #[error("invalid port: {0}")]
    InvalidPort(String),
}

/// Errors aborting a live request.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Hostname resolution failed.
    #[error("failed to resolve {host}: {reason}")]
    Resolve {
        /// Hostname being resolved
        host: String,
        /// Resolver message
        reason: String,
    },

    /// No resolved address accepted a TCP connection.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// Last address tried
        addr: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The TLS handshake failed or timed out.
    #[error("TLS handshake with {host} failed: {reason}")]
    Handshake {
        /// Server name used for the handshake
        host: String,
        /// Handshake failure
        reason: String,
    },

    /// The negotiated protocol does not match the pinned one.
    #[error("HTTP/2 was required, server negotiated {0}")]
    ProtocolPolicy(String),

    /// HTTP protocol error reported by the connection.
    #[error("request failed: {0}")]
    Http(#[from] hyper::Error),

    /// The request could not be assembled.
    #[error("failed to create request: {0}")]
    Request(#[from] http::Error),

    /// The body source could not be opened or read.
    #[error("failed to get request body: {0}")]
    Body(String),

    /// The caller deadline expired.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// TLS configuration could not be built.
    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),

    /// The response body could not be read or written out.
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// A finding of the batch certificate check for one address.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CertificateError {
    /// Routing table could not be queried.
    #[error("failed to get route for {addr}: {reason}")]
    Route {
        /// Address being routed
        addr: String,
        /// Socket error message
        reason: String,
    },

    /// TCP connection or TLS handshake failed.
    #[error("cannot connect to server or is not an HTTPS server: {0}")]
    Connect(String),

    /// The server presented no certificate.
    #[error("no certificate found for {0}")]
    NoCertificate(String),

    /// A presented certificate could not be parsed.
    #[error("{kind} could not be parsed: {reason}")]
    Parse {
        /// Chain position
        kind: String,
        /// Parser message
        reason: String,
    },

    /// The leaf certificate carries no SAN entry at all.
    #[error("server certificate has no Subject Alternate Name")]
    NoSan,

    /// No SAN entry of the leaf matches the target.
    #[error("server certificate does not match any Subject Alternate Name")]
    SanMismatch,

    /// The certificate is not valid yet.
    #[error("{kind} {subject:?} is not valid before {not_before}")]
    NotYetValid {
        /// Chain position
        kind: String,
        /// Subject distinguished name
        subject: String,
        /// RFC 3339 not-before date
        not_before: String,
    },

    /// The certificate expires before now plus the grace period.
    #[error("{kind} {subject:?} expires on {not_after}")]
    Expiring {
        /// Chain position
        kind: String,
        /// Subject distinguished name
        subject: String,
        /// RFC 3339 not-after date
        not_after: String,
    },

    /// Chain trust verification failed.
    #[error("certificate chain verification failed: {0}")]
    Chain(String),
}

/// Errors of a response presenter. Never fatal, the renderer falls back.
#[derive(Error, Debug)]
pub enum RenderError {
    /// Reading the response body failed.
    #[error("failed to read response body: {0}")]
    Read(#[from] std::io::Error),

    /// The body is not valid JSON.
    #[error("response is not valid json: {0}")]
    Json(#[from] serde_json::Error),

    /// The structured query failed at runtime.
    #[error("jq filter failed: {0}")]
    Query(String),

    /// Syntax highlighting failed.
    #[error("failed to highlight response: {0}")]
    Highlight(String),

    /// The image could not be decoded or re-encoded.
    #[error("failed to decode image: {0}")]
    Image(#[from] image::ImageError),

    /// No supported terminal graphics protocol was detected.
    #[error("terminal does not support sixel")]
    UnsupportedTerminal,

    /// The bitmap protocol needs a palette-indexed image.
    #[error("cannot use sixel output on non paletted images")]
    NotPaletted,

    /// A media tool failed.
    #[error("{0}")]
    Media(String),
}
