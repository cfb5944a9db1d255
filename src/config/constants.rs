//! Configuration constants.
//!
//! This module defines the constants used throughout the application,
//! including timeouts, read limits, and defaults for command options.

use std::time::Duration;

// Network operation timeouts
/// Dial and TLS handshake timeout used when the caller did not set a deadline.
pub const FALLBACK_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// DNS query timeout in seconds
pub const DNS_TIMEOUT_SECS: u64 = 3;

/// Standard port for HTTPS, used by the certificate check when none is given.
pub const DEFAULT_HTTPS_PORT: u16 = 443;

/// Default request method.
pub const DEFAULT_METHOD: &str = "GET";

/// Product token sent in the `user-agent` header of every request.
pub const USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

// Response rendering
/// Number of bytes inspected before streaming a body to an interactive terminal.
pub const BINARY_PEEK_SIZE: usize = 1024;
/// Maximum number of bytes of an audio/video body handed to the media tools (5MB).
pub const MEDIA_READ_LIMIT: usize = 5 * 1024 * 1024;
/// Message printed instead of a binary body on an interactive terminal.
pub const BINARY_OUTPUT_WARNING: &str =
    "Output contains binary data, not showing it to preserve terminal";

/// Highlighting theme used when none is configured.
pub const DEFAULT_STYLE: &str = "base16-ocean.dark";

/// Executable used to inspect audio/video bodies.
pub const MEDIA_PROBE_TOOL: &str = "ffprobe";
/// Executable used to extract a representative video frame.
pub const MEDIA_TRANSCODE_TOOL: &str = "ffmpeg";
