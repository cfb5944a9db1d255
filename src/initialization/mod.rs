//! Application initialization and resource setup.
//!
//! This module provides functions to initialize the shared resources:
//! - Logger
//! - DNS resolver
//! - HTTP client used to fetch remote request bodies
//! - TLS crypto provider
//! - Trust store for server certificates

mod client;
mod logger;
mod resolver;
mod roots;

use std::sync::Arc;

use rustls::crypto::{ring::default_provider, CryptoProvider};

// Re-export public API
pub use client::init_resource_client;
pub use logger::init_logger_with;
pub use resolver::init_resolver;
pub use roots::{root_store, root_store_from};

/// Initializes the crypto provider for TLS operations.
///
/// Configures the global crypto provider for `rustls`. The transports of this
/// crate pass [`crypto_provider`] explicitly, the global default only matters
/// for dependencies building their own configuration (`reqwest`).
pub fn init_crypto_provider() {
    // The return value is ignored because reinstalling the provider is harmless
    let _ = CryptoProvider::install_default(default_provider());
}

/// Returns the crypto provider used by every TLS connection of this crate.
pub fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(default_provider())
}
