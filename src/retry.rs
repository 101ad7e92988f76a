//! Retry utilities with exponential backoff and jitter.
//!
//! The agent starts alongside bpfd in the same pod, so the daemon socket is
//! often not accepting connections yet when the agent comes up. Startup
//! connections are retried with exponential backoff and jitter until the
//! daemon answers or the attempt budget runs out.
//!
//! Reconcile passes do not use this module: a failed pass is requeued after
//! the fixed [`crate::RETRY_DURATION`].
//!
//! # Example
//!
//! ```ignore
//! use bpfd_agent::retry::{retry_with_backoff, RetryConfig};
//!
//! let channel = retry_with_backoff(
//!     &RetryConfig::daemon_startup(),
//!     "connect_bpfd",
//!     || async { endpoint.connect().await },
//! ).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

/// Backoff configuration for operations that may fail transiently.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts (0 = infinite)
    pub max_attempts: u32,
    /// Delay after the first failure
    pub initial_delay: Duration,
    /// Upper bound for the delay between attempts
    pub max_delay: Duration,
    /// Multiplier applied to the delay after every failure
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 0,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(10),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Create a config with a maximum number of attempts
    pub fn with_max_attempts(attempts: u32) -> Self {
        Self {
            max_attempts: attempts,
            ..Default::default()
        }
    }

    /// Budget for reaching bpfd at startup: roughly two minutes of attempts
    /// before the agent gives up and lets the pod restart.
    pub fn daemon_startup() -> Self {
        Self::with_max_attempts(20)
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt >= self.max_attempts
    }

    fn next_delay(&self, delay: Duration) -> Duration {
        let grown = delay.as_secs_f64() * self.backoff_multiplier;
        Duration::from_secs_f64(grown.min(self.max_delay.as_secs_f64()))
    }
}

/// Spread the delay over 0.5x to 1.5x so agents restarted together by a
/// DaemonSet rollout do not hit the daemon in lockstep.
fn with_jitter(delay: Duration) -> Duration {
    let factor = rand::thread_rng().gen_range(0.5..1.5);
    Duration::from_secs_f64(delay.as_secs_f64() * factor)
}

/// Execute an async operation with exponential backoff and jitter.
///
/// Returns the first success, or the last error once `max_attempts` is
/// exhausted. With `max_attempts == 0` it retries forever.
pub async fn retry_with_backoff<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        let e = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        if config.exhausted(attempt) {
            error!(
                operation = %operation_name,
                attempt,
                error = %e,
                "Giving up after max attempts"
            );
            return Err(e);
        }

        let sleep_for = with_jitter(delay);
        warn!(
            operation = %operation_name,
            attempt,
            error = %e,
            delay_ms = sleep_for.as_millis(),
            "Attempt failed, retrying"
        );
        tokio::time::sleep(sleep_for).await;
        delay = config.next_delay(delay);
    }
}
