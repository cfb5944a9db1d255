//! http_inspect library: HTTP diagnostic client
//!
//! This library sends one HTTP request while reporting every phase of the
//! connection (resolution, dial, TLS handshake, headers, first byte), checks
//! the certificates presented by servers, and renders response bodies for a
//! terminal (highlighted JSON/XML/HTML, structured queries, inline images,
//! media summaries).
//!
//! # Example
//!
//! ```no_run
//! use http_inspect::client::{with_accept, with_trace};
//! use http_inspect::initialization::{init_crypto_provider, init_resolver};
//! use http_inspect::{ClientConfig, Deadline};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! init_crypto_provider();
//! let config = ClientConfig::builder("https://example.com")
//!     .option(with_accept("application/json"))
//!     .option(with_trace())
//!     .build()?;
//!
//! let outcome = config.run(init_resolver(), Deadline::none()).await?;
//! println!("{} rendered as {:?}", outcome.status, outcome.decision.presenter);
//! # Ok(())
//! # }
//! ```
//!
//! # Requirements
//!
//! This library requires a Tokio runtime. Use `#[tokio::main]` in your application
//! or ensure you're calling library functions within an async context.

#![warn(missing_docs)]

pub mod client;
pub mod config;
pub mod error_handling;
pub mod initialization;
pub mod render;
pub mod resource;
pub mod tls;
pub mod trace;
pub mod transport;
mod utils;

// Re-export public API
pub use client::{ClientConfig, ClientConfigBuilder, ClientOption, RunOutcome};
pub use config::{LogFormat, LogLevel};
pub use error_handling::{CertificateError, ConfigError, RenderError, TransportError};
pub use render::{Presenter, RenderDecision};
pub use resource::BodySource;
pub use tls::{check_certificates, CertCheckOptions, CertReport, CertificateCheckResult};
pub use transport::{Deadline, ProtocolPin};
