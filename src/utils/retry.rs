use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::service::error::ServiceError;

/// Exponential backoff for transient database failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (1-based), doubled each time and
    /// capped, plus up to 50% random jitter.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base_ms = self.base_delay.as_millis() as u64;
        let delay_ms = base_ms
            .saturating_mul(1u64 << exponent)
            .min(self.max_delay.as_millis() as u64);
        let jitter_ms = if delay_ms > 1 {
            rand::rng().random_range(0..=delay_ms / 2)
        } else {
            0
        };
        Duration::from_millis(delay_ms + jitter_ms)
    }
}

/// Runs `operation` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are exhausted. The last error is returned unchanged.
pub async fn retry_transient<T, F, Fut>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, ServiceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for_attempt(attempt);
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "transient database failure, retrying: {}",
                    err
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                if err.is_transient() {
                    tracing::error!(
                        operation = operation_name,
                        attempts = attempt,
                        "giving up after transient failures: {}",
                        err
                    );
                }
                return Err(err);
            }
        }
    }
}
