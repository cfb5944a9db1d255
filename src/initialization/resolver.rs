//! DNS resolver initialization.

use std::sync::Arc;
use std::time::Duration;

use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;

/// Initializes the DNS resolver for hostname lookups.
///
/// Uses the system configuration (`/etc/resolv.conf`) when it can be read and
/// falls back to the resolver defaults otherwise. Timeouts are short so that a
/// dead DNS server is reported quickly instead of eating the caller deadline.
///
/// # Returns
///
/// A configured `TokioAsyncResolver` wrapped in `Arc` for sharing across tasks.
pub fn init_resolver() -> Arc<TokioAsyncResolver> {
    let (config, mut opts) = match hickory_resolver::system_conf::read_system_conf() {
        Ok(system) => system,
        Err(e) => {
            log::debug!("Failed to read system DNS configuration, using defaults: {e}");
            (ResolverConfig::default(), ResolverOpts::default())
        }
    };
    opts.timeout = Duration::from_secs(crate::config::DNS_TIMEOUT_SECS);
    opts.attempts = 2;

    Arc::new(TokioAsyncResolver::tokio(config, opts))
}
