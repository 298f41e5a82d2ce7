//! Bounded exponential backoff for Slack calls.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::shutdown::Shutdown;

/// Retry policy for a single fallible operation.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay, jitter included.
    pub max_delay: Duration,
    /// Multiplier applied after each failed attempt.
    pub factor: f64,
    /// Total attempts including the first. 1 disables retrying.
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(60),
            factor: 2.0,
            max_attempts: 5,
        }
    }
}

impl Backoff {
    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay after failed attempt number `attempt` (1-based), before jitter.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(32) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.factor.powi(exp);
        Duration::from_millis(millis.min(self.max_delay.as_millis() as f64) as u64)
    }

    fn jittered(&self, base: Duration) -> Duration {
        let max_jitter = base.as_millis() as u64 / 4;
        let jitter = if max_jitter == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=max_jitter)
        };
        (base + Duration::from_millis(jitter)).min(self.max_delay)
    }
}

/// Why a retried operation gave up.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The last error, either permanent or after the attempt cap.
    Failed(E),
    /// Shutdown was requested while waiting between attempts.
    Cancelled(&'static str),
}

/// Run `op` until it succeeds, fails permanently, or runs out of attempts.
pub async fn retry<T, E, F, Fut>(
    policy: &Backoff,
    shutdown: &mut Shutdown,
    what: &str,
    is_transient: impl Fn(&E) -> bool,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < policy.max_attempts && is_transient(&e) => {
                let delay = policy.jittered(policy.delay_for(attempt));
                tracing::warn!(
                    error = %e,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "{what} failed, retrying"
                );
                if let Some(reason) = shutdown.sleep(delay).await {
                    return Err(RetryError::Cancelled(reason));
                }
                attempt += 1;
            }
            Err(e) => return Err(RetryError::Failed(e)),
        }
    }
}
