//! Concurrency and pacing limits for outbound API requests.
//!
//! The CDO API allows five requests per second per token. The limiter caps the
//! number of in-flight requests and additionally spaces successive grants, so both
//! bursts and sustained throughput stay under that ceiling.

use crate::fetch::error::FetchError;
use log::trace;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep_until, Instant};

/// Default maximum number of requests in flight.
pub const DEFAULT_MAX_CONCURRENT: usize = 5;

/// Default minimum spacing between two permit grants.
pub const DEFAULT_MIN_SPACING: Duration = Duration::from_millis(200);

/// Shared limiter gating every request issued by a client.
///
/// Clone the surrounding `Arc` to share it; all clones draw from the same pool.
#[derive(Debug)]
pub struct RateLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    min_spacing: Duration,
    next_grant: Mutex<Option<Instant>>,
}

/// Scoped permission to issue one request. The slot is released on drop.
#[derive(Debug)]
pub struct RatePermit {
    _permit: OwnedSemaphorePermit,
}

impl RateLimiter {
    /// Creates a limiter allowing `max_concurrent` permits (at least one) granted no
    /// closer together than `min_spacing`.
    pub fn new(max_concurrent: usize, min_spacing: Duration) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            min_spacing,
            next_grant: Mutex::new(None),
        }
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    pub fn min_spacing(&self) -> Duration {
        self.min_spacing
    }

    /// Number of permits currently available.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits for a free slot and for the pacing interval, then grants a permit.
    ///
    /// Dropping the returned future before it completes gives the slot back.
    pub async fn acquire(&self) -> Result<RatePermit, FetchError> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| FetchError::RateLimiterClosed)?;

        let grant_at = self.reserve_grant_slot();
        if grant_at > Instant::now() {
            trace!("Pacing request for {:?}", grant_at - Instant::now());
            sleep_until(grant_at).await;
        }
        Ok(RatePermit { _permit: permit })
    }

    /// Stops granting permits; pending and future `acquire` calls fail.
    pub fn close(&self) {
        self.semaphore.close();
    }

    fn reserve_grant_slot(&self) -> Instant {
        let mut next = self
            .next_grant
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let slot = match *next {
            Some(reserved) if reserved > now => reserved,
            _ => now,
        };
        *next = Some(slot + self.min_spacing);
        slot
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT, DEFAULT_MIN_SPACING)
    }
}
