//! Retry with exponential backoff for transient browser failures
//!
//! Only page loads are retried: a navigation that failed because the
//! connection dropped or the page load timed out is worth another attempt,
//! while a missing element or a rejected click is a property of the page and
//! is reported straight away.

use crate::config::RetryConfig;
use crate::error::{BrowserError, Error};
use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// Trait for errors that can be classified as retryable or not
pub trait IsRetryable {
    /// Returns true if the error is transient and the operation should be retried
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for Error {
    fn is_retryable(&self) -> bool {
        match self {
            Error::Browser(BrowserError::Navigation { .. }) => true,
            Error::Browser(BrowserError::Driver(msg)) => {
                let msg = msg.to_ascii_lowercase();
                msg.contains("timeout")
                    || msg.contains("timed out")
                    || msg.contains("connection")
                    || msg.contains("net::err")
            }
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::ConnectionRefused
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::Interrupted
            ),
            Error::Browser(_)
            | Error::Precondition(_)
            | Error::Config { .. }
            | Error::Session(_)
            | Error::Artifact(_)
            | Error::LoginFailed(_)
            | Error::Serialization(_) => false,
        }
    }
}

/// Execute an async operation, retrying transient failures with exponential backoff
///
/// # Arguments
///
/// * `config` - Retry settings (retry count, initial and maximum delay, backoff multiplier, jitter)
/// * `operation` - Closure producing a fresh attempt each time it is called
///
/// # Returns
///
/// The first successful result. `max_attempts` counts retries, so the
/// operation runs at most `max_attempts + 1` times; the last error is
/// returned once retries are exhausted or as soon as a non-retryable error
/// occurs. A delay that cannot be computed from the multiplier falls back to
/// `max_delay`.
///
/// # Example
///
/// ```no_run
/// use profile_export::retry::with_retry;
/// use profile_export::{BrowserDriver, Result};
/// use profile_export::config::RetryConfig;
///
/// async fn open<D: BrowserDriver>(driver: &D, url: &str) -> Result<()> {
///     with_retry(&RetryConfig::default(), move || driver.navigate(url)).await
/// }
/// ```
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: IsRetryable + std::fmt::Display,
{
    let mut attempt = 0;
    let mut delay = config.initial_delay;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempts = attempt + 1, "operation succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if e.is_retryable() && attempt < config.max_attempts => {
                attempt += 1;

                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts = config.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "operation failed, retrying"
                );

                let wait = if config.jitter { add_jitter(delay) } else { delay };
                tokio::time::sleep(wait).await;

                delay = Duration::try_from_secs_f64(delay.as_secs_f64() * config.backoff_multiplier)
                    .unwrap_or(config.max_delay)
                    .min(config.max_delay);
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(
                        error = %e,
                        attempts = attempt + 1,
                        "operation failed after all retry attempts"
                    );
                }
                return Err(e);
            }
        }
    }
}

/// Stretch a delay by a uniform random factor in [1, 2]
///
/// Spreads the retries of concurrent callers so they do not hit the service
/// in lockstep.
fn add_jitter(delay: Duration) -> Duration {
    let mut rng = rand::thread_rng();
    let jitter_factor: f64 = rng.gen_range(0.0..=1.0);
    Duration::from_secs_f64(delay.as_secs_f64() * (1.0 + jitter_factor))
}
