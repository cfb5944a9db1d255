//! HTTP client initialization.
//!
//! The diagnostic request itself runs on the instrumented transport in
//! [`crate::transport`]. This client only fetches request bodies given as an URL.

use reqwest::ClientBuilder;

use crate::config::{FALLBACK_CONNECT_TIMEOUT, USER_AGENT};
use crate::error_handling::InitializationError;

/// Initializes the HTTP client used to read remote body resources.
///
/// Creates a `reqwest::Client` configured with:
/// - the crate User-Agent
/// - a connect timeout of [`FALLBACK_CONNECT_TIMEOUT`]
/// - Rustls TLS backend (no native TLS)
///
/// # Errors
///
/// Returns `InitializationError::HttpClientError` if client creation fails.
pub fn init_resource_client() -> Result<reqwest::Client, InitializationError> {
    let client = ClientBuilder::new()
        .connect_timeout(FALLBACK_CONNECT_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()?;
    Ok(client)
}
