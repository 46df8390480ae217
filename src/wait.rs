//! Named, bounded waits
//!
//! The remote service exposes no completion signals, so every "wait until the
//! page / menu / download is ready" in the pipeline is a [`WaitPolicy`]: a
//! timeout, a poll interval and an optional backoff. Fixed settle delays are
//! policies too ([`WaitPolicy::settle`]), which keeps every delay tunable from
//! configuration and testable with tokio's paused clock.

use crate::browser::{BrowserDriver, Locator};
use crate::error::{BrowserError, Result};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Timeout-bounded polling policy
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WaitPolicy {
    /// Total time budget for the wait
    #[serde(rename = "timeout_ms", with = "crate::config::duration_ms")]
    pub timeout: Duration,

    /// Delay between probes
    #[serde(
        rename = "poll_interval_ms",
        default = "default_poll_interval",
        with = "crate::config::duration_ms"
    )]
    pub poll_interval: Duration,

    /// Growth factor applied to the poll interval after each miss (1.0 = fixed)
    #[serde(default = "default_backoff")]
    pub backoff_multiplier: f64,

    /// Upper bound for the poll interval once backoff applies
    #[serde(
        rename = "max_interval_ms",
        default = "default_max_interval",
        with = "crate::config::duration_ms"
    )]
    pub max_interval: Duration,
}

fn default_poll_interval() -> Duration {
    Duration::from_millis(250)
}

fn default_backoff() -> f64 {
    1.0
}

fn default_max_interval() -> Duration {
    Duration::from_secs(2)
}

impl WaitPolicy {
    /// Poll at a fixed interval until `timeout`
    pub fn bounded(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
            backoff_multiplier: 1.0,
            max_interval: poll_interval,
        }
    }

    /// A pure delay with nothing to probe
    pub fn fixed(delay: Duration) -> Self {
        Self::bounded(delay, delay)
    }

    /// Grow the poll interval by `multiplier` after every miss, capped at `max_interval`
    pub fn with_backoff(mut self, multiplier: f64, max_interval: Duration) -> Self {
        self.backoff_multiplier = multiplier;
        self.max_interval = max_interval;
        self
    }

    /// Sleep for the whole timeout
    pub async fn settle(&self) {
        tokio::time::sleep(self.timeout).await;
    }

    fn next_interval(&self, current: Duration) -> Duration {
        if self.backoff_multiplier <= 1.0 {
            return current;
        }
        let cap = self.max_interval.max(current);
        Duration::try_from_secs_f64(current.as_secs_f64() * self.backoff_multiplier)
            .map_or(cap, |grown| grown.min(cap))
    }
}

/// Probe until it yields `Some` or the policy's timeout elapses
///
/// The probe always runs at least once, and once more right at the deadline,
/// so a zero timeout still performs a single check.
pub async fn poll_until<F, Fut, T>(policy: &WaitPolicy, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = Instant::now() + policy.timeout;
    let mut interval = policy.poll_interval;

    loop {
        if let Some(found) = probe().await {
            return Some(found);
        }

        let now = Instant::now();
        if now >= deadline {
            return None;
        }

        tokio::time::sleep(interval.min(deadline - now)).await;
        interval = policy.next_interval(interval);
    }
}

/// Wait for at least one element matching `locator`
///
/// Driver errors while probing count as "not present yet".
pub async fn find_within<D>(driver: &D, locator: &Locator, policy: &WaitPolicy) -> Result<Vec<D::Element>>
where
    D: BrowserDriver + ?Sized,
{
    let found = poll_until(policy, move || async move {
        match driver.find_all(locator).await {
            Ok(elements) if !elements.is_empty() => Some(elements),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(%locator, error = %e, "element lookup failed, retrying");
                None
            }
        }
    })
    .await;

    found.ok_or_else(|| {
        BrowserError::ElementNotFound {
            locator: locator.to_string(),
            waited_ms: policy.timeout.as_millis() as u64,
        }
        .into()
    })
}
