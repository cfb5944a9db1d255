//! Error handling.
//!
//! Error types are grouped by class:
//! - **Configuration**: detected before any I/O (bad method, conflicting pins, ...)
//! - **Transport**: resolution, dial, handshake and protocol-policy failures
//! - **Certificate**: per-address findings of the batch check
//! - **Rendering**: recovered locally by the response renderer

mod types;

// Re-export public API
pub use types::{CertificateError, ConfigError, InitializationError, RenderError, TransportError};
