//! Retry and Error Recovery
//!
//! Exponential backoff for transport calls. HTTP 429 (honoring
//! `Retry-After`), 500/502/503 and network failures are retried; other
//! errors are returned immediately.

use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

// ---------------------------------------------------------------------------
// Retry policy
// ---------------------------------------------------------------------------

/// Configuration for retry behavior. Also the `[transport.retry]` config table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts (default 2).
    pub max_retries: u32,
    /// Base delay in milliseconds (default 1000).
    pub base_delay_ms: u64,
    /// Maximum delay in milliseconds (default 30000).
    pub max_delay_ms: u64,
    /// Backoff multiplier (default 2.0).
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 1000,
            max_delay_ms: 30000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Calculate the delay for a given attempt (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms =
            self.base_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let clamped = delay_ms.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(clamped)
    }
}

// ---------------------------------------------------------------------------
// Retryable error classification
// ---------------------------------------------------------------------------

/// Whether an error is transient and should be retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// HTTP 429. May include a Retry-After hint.
    RateLimit { retry_after: Option<Duration> },
    /// HTTP 500, 502, 503.
    ServerError,
    /// Network timeout or connection reset.
    NetworkError,
    /// Non-retryable error (4xx other than 429, auth failure, undecodable body).
    Fatal,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ErrorKind::Fatal)
    }
}

/// Classify an error from an HTTP status code.
pub fn classify_http_error(status: u16, retry_after_header: Option<&str>) -> ErrorKind {
    match status {
        429 => {
            let retry_after = retry_after_header
                .and_then(|h| h.trim().parse::<u64>().ok().map(Duration::from_secs));
            ErrorKind::RateLimit { retry_after }
        }
        500 | 502 | 503 => ErrorKind::ServerError,
        _ => ErrorKind::Fatal,
    }
}

// ---------------------------------------------------------------------------
// Retry executor
// ---------------------------------------------------------------------------

/// Execute an async operation with retry logic.
///
/// The `classify` closure maps errors to [`ErrorKind`]; fatal errors are
/// returned at once and a rate-limit `retry_after` replaces the backoff delay.
pub async fn with_retry_if<F, Fut, T, E, C>(
    policy: &RetryPolicy,
    operation_name: &str,
    classify: C,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display + Into<anyhow::Error>,
    C: Fn(&E) -> ErrorKind,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(err) => {
                let kind = classify(&err);
                if !kind.is_retryable() {
                    return Err(err.into());
                }
                if attempt >= policy.max_retries {
                    warn!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        "max retries exceeded"
                    );
                    return Err(err.into());
                }

                let delay = match kind {
                    ErrorKind::RateLimit {
                        retry_after: Some(after),
                    } => after.min(Duration::from_millis(policy.max_delay_ms)),
                    _ => policy.delay_for_attempt(attempt),
                };
                warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    err = %err,
                    "retrying after error"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
