//! Configuration types and CLI options.
//!
//! This module defines enums and structs used for command-line argument parsing.
//! The parsed values are turned into a [`crate::ClientConfig`] (for `debug`) or a
//! [`crate::CertCheckOptions`] (for `cert`) by the binary.

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::constants::{DEFAULT_METHOD, DEFAULT_STYLE};

/// Logging level for the application.
///
/// Controls the verbosity of log output, from most restrictive (Error) to most
/// verbose (Trace).
#[derive(Clone, Debug, ValueEnum)]
pub enum LogLevel {
    /// Only error messages
    Error,
    /// Error and warning messages
    Warn,
    /// Error, warning, and informational messages
    Info,
    /// All messages except trace
    Debug,
    /// All messages including trace
    Trace,
}

impl From<LogLevel> for log::LevelFilter {
    fn from(l: LogLevel) -> Self {
        match l {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Log output format.
///
/// Controls how log messages are formatted:
/// - `Plain`: Human-readable format with colors (default)
/// - `Json`: Structured JSON format for machine parsing
#[derive(Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// Human-readable format with colors (default)
    Plain,
    /// Structured JSON format for machine parsing
    Json,
}

/// Command-line interface.
#[derive(Debug, Parser)]
#[command(name = "http_inspect", version, about = "HTTP diagnostic tools")]
pub struct Cli {
    /// Log level
    #[arg(long, value_enum, default_value = "warn", global = true)]
    pub log_level: LogLevel,

    /// Log format
    #[arg(long, value_enum, default_value = "plain", global = true)]
    pub log_format: LogFormat,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Debug an HTTP url by sending a request and see output
    Debug(DebugArgs),
    /// Check HTTPS certificate for a given hostname
    Cert(CertArgs),
}

/// Options of the `debug` subcommand.
#[derive(Debug, Args)]
pub struct DebugArgs {
    /// Target URL (`http://` is assumed when no scheme is given)
    #[arg(required_unless_present = "list_styles")]
    pub url: Option<String>,

    /// Run in insecure mode, do not verify TLS certificates
    #[arg(short = 'k', long)]
    pub insecure: bool,

    /// HTTP method to use
    #[arg(short = 'm', long, default_value = DEFAULT_METHOD)]
    pub method: String,

    /// Set request's accept header value
    #[arg(short = 'a', long)]
    pub accept: Option<String>,

    /// Use this resource as the body of the HTTP request (`-` for stdin, a path or an URL)
    #[arg(short = 'b', long)]
    pub request_body: Option<String>,

    /// Use given string as the body of the HTTP request, if set, --request-body is ignored
    #[arg(short = 'd', long)]
    pub request_body_content: Option<String>,

    /// Set request's content type header value
    #[arg(short = 'c', long)]
    pub request_content_type: Option<String>,

    /// Force request to use HTTP/1.1
    #[arg(short = '1', long)]
    pub force_http1: bool,

    /// Force request to use HTTP/2
    #[arg(short = '2', long)]
    pub force_http2: bool,

    /// Add header to the request (`name: value`), can be repeated
    #[arg(short = 'H', long = "header")]
    pub headers: Vec<String>,

    /// Force response to use given content-type
    #[arg(short = 'T', long)]
    pub force_type: Option<String>,

    /// Parse response body as json and apply given jq expression
    #[arg(short = 'j', long)]
    pub jq: Option<String>,

    /// Get raw response body, do not beautify it
    #[arg(short = 'r', long)]
    pub raw_response: bool,

    /// Style for the response body syntax highlighting, see --list-styles
    #[arg(short = 's', long, default_value = DEFAULT_STYLE)]
    pub style: String,

    /// List available highlighting styles and exit
    #[arg(long)]
    pub list_styles: bool,

    /// Trace HTTP request
    #[arg(short = 't', long)]
    pub trace: bool,

    /// Abort the whole operation after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Options of the `cert` subcommand.
#[derive(Debug, Args)]
pub struct CertArgs {
    /// Hostname, IP address, `host:port` or `https://` URL to check
    pub target: String,

    /// Set a number of days for the certificate to be valid for for NotAfter
    #[arg(short = 'd', long, default_value_t = 0)]
    pub days: u64,

    /// Abort the whole check after this many seconds
    #[arg(long)]
    pub timeout: Option<u64>,
}
