//! Caller deadline shared by every network step.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use crate::config::FALLBACK_CONNECT_TIMEOUT;
use crate::error_handling::TransportError;

/// Point in time after which a diagnostic operation is abandoned.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// No deadline: steps are bounded by the fallback timeout only.
    pub fn none() -> Self {
        Self(None)
    }

    /// Deadline at a fixed instant.
    pub fn at(instant: Instant) -> Self {
        Self(Some(instant))
    }

    /// Deadline `timeout` from now, or none.
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        Self(timeout.map(|t| Instant::now() + t))
    }

    /// The deadline instant, if any.
    pub fn instant(&self) -> Option<Instant> {
        self.0
    }

    /// Timeout for a single dial or handshake.
    ///
    /// Time left until the deadline, or [`FALLBACK_CONNECT_TIMEOUT`] without one.
    pub fn step_timeout(&self) -> Duration {
        match self.0 {
            Some(deadline) => deadline.saturating_duration_since(Instant::now()),
            None => FALLBACK_CONNECT_TIMEOUT,
        }
    }

    /// Runs `fut` to completion unless the deadline expires first.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::DeadlineExceeded` when the deadline expires, the
    /// future is dropped at that point.
    pub async fn run<F: Future>(&self, fut: F) -> Result<F::Output, TransportError> {
        match self.0 {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| TransportError::DeadlineExceeded),
            None => Ok(fut.await),
        }
    }
}
