use crate::fetch::error::FetchError;
use crate::fetch::rate_limit::RateLimiter;
use log::warn;
use std::future::Future;
use std::time::Duration;

pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(60);

/// Exponential backoff for transient service failures.
///
/// Retry `n` (0-based) waits `base_delay * 2^n`, capped at `max_delay`. Only
/// [`FetchError::is_transient`] failures are retried; everything else is returned as is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryPolicy {
    /// Creates a retry policy.
    ///
    /// # Arguments
    ///
    /// * `max_retries` - Retries after the first attempt, so at most `max_retries + 1`
    ///                   attempts are made.
    /// * `base_delay` - Wait before the first retry. Each further retry doubles it.
    /// * `max_delay` - Upper bound for any single wait.
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Delay before retry number `retry` (0 is the first retry).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// Runs `attempt` until it succeeds, fails permanently or runs out of retries.
    ///
    /// Every attempt, including retries, holds its own permit from `limiter` while it
    /// runs. Backoff sleeps happen without a permit.
    pub async fn execute<T, F, Fut>(
        &self,
        limiter: &RateLimiter,
        mut attempt: F,
    ) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut retry = 0;
        loop {
            let outcome = {
                let _permit = limiter.acquire().await?;
                attempt().await
            };
            let error = match outcome {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() => error,
                Err(error) => return Err(error),
            };

            if retry >= self.max_retries {
                return Err(FetchError::ExhaustedRetries {
                    attempts: retry + 1,
                    source: Box::new(error),
                });
            }
            let delay = self.delay_for(retry);
            warn!(
                "{error}, retrying in {:?} ({}/{})",
                delay,
                retry + 1,
                self.max_retries
            );
            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }
}
