//! Retry policy configuration and the error taxonomy the executor surfaces.

use reqwest::StatusCode;
use std::fmt;
use std::time::Duration;

/// Default number of 503 retries for [`RetryPolicy::Backoff`].
pub const DEFAULT_MAX_RETRIES: usize = 5;

/// Default backoff base; retry `n` waits `2^n` times this.
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);

/// How the executor reacts to a failed attempt.
///
/// The two arms reproduce two observed behaviors against the same upstream
/// and are deliberately kept apart; callers pick one rather than getting a
/// silent blend of both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Retry only on HTTP 503, sleeping `2^attempt * base_delay` before each
    /// retry (the first retry waits twice the base, then the delay doubles).
    /// Any other failure status and any transport error surfaces
    /// immediately. Exhausting `max_retries` fails with a
    /// [`MaxRetriesError`] wrapping the last 503.
    Backoff {
        max_retries: usize,
        base_delay: Duration,
    },
    /// Retry any non-2xx status and any transport error, with no delay and
    /// no upper bound. The call can only return success; against a
    /// persistently failing upstream it spins forever, so opt in
    /// deliberately.
    Forever,
}

impl RetryPolicy {
    /// Bounded exponential backoff with the default cap and base.
    pub fn backoff() -> Self {
        RetryPolicy::Backoff {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
        }
    }

    pub fn forever() -> Self {
        RetryPolicy::Forever
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::backoff()
    }
}

/// Backoff schedule: `base * 2^attempt`, where `attempt` counts from 1 for
/// the first retry.
pub fn backoff_delay(attempt: usize, base: Duration) -> Duration {
    base * 2u32.saturating_pow(attempt.min(u32::MAX as usize) as u32)
}

/// A non-success HTTP response, carrying the status and the raw body.
#[derive(Debug)]
pub struct StatusError {
    pub status: StatusCode,
    pub body: String,
}

impl StatusError {
    pub fn is_service_unavailable(&self) -> bool {
        self.status == StatusCode::SERVICE_UNAVAILABLE
    }
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "API error occurred with status code {}",
            self.status.as_u16()
        )
    }
}

impl std::error::Error for StatusError {}

/// Raised when [`RetryPolicy::Backoff`] runs out of attempts. Wraps the last
/// 503 encountered.
#[derive(Debug)]
pub struct MaxRetriesError {
    pub retries: usize,
    pub last: StatusError,
}

impl fmt::Display for MaxRetriesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Max retries reached after {} attempts. Last error: {}",
            self.retries, self.last
        )
    }
}

impl std::error::Error for MaxRetriesError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.last)
    }
}
