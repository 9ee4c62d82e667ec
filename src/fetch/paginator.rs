//! Turns an offset/limit request into the complete ordered result set.

use crate::fetch::error::FetchError;
use crate::fetch::rate_limit::RateLimiter;
use crate::fetch::retry::RetryPolicy;
use crate::types::observation::Page;
use crate::types::query::{PageRequest, DEFAULT_PAGE_LIMIT};
use log::debug;
use std::future::Future;
use std::sync::Arc;

/// Offsets of every page needed to cover `total` records, `page_size` at a time.
///
/// The offsets are produced lazily, so a huge `total` costs nothing up front.
///
/// # Examples
///
/// ```
/// use noaa_cdo::fetch::paginator::page_offsets;
///
/// assert_eq!(page_offsets(3500, 1000).collect::<Vec<_>>(), vec![0, 1000, 2000, 3000]);
/// assert_eq!(page_offsets(0, 1000).count(), 0);
/// ```
pub fn page_offsets(total: u64, page_size: u32) -> impl Iterator<Item = u64> {
    let step = page_size.max(1) as usize;
    (0..total).step_by(step)
}

#[derive(Debug, Clone)]
pub struct Paginator {
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    page_size: u32,
}

impl Paginator {
    /// Creates a paginator that requests `page_size` records per page.
    ///
    /// # Arguments
    ///
    /// * `limiter` - Shared limiter every page request (and probe) goes through.
    /// * `retry` - Policy applied to each page on its own.
    /// * `page_size` - Records per page. Zero is treated as one.
    pub fn new(limiter: Arc<RateLimiter>, retry: RetryPolicy, page_size: u32) -> Self {
        Self {
            limiter,
            retry,
            page_size: page_size.max(1),
        }
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// Fetches every record matching `base`.
    ///
    /// A one-record probe learns the total first; when it is zero no page is requested.
    /// Pages are then requested in offset order, each under the retry policy and the
    /// rate limiter. If any page fails for good the pages already fetched are dropped
    /// and [`FetchError::IncompleteFetch`] names the failing offset.
    ///
    /// The total reported by the server is not trusted for allocation. A page that
    /// comes back short before the last offset ends the fetch with
    /// [`FetchError::RecordCountMismatch`] instead of requesting the rest.
    pub async fn fetch_all<R, T, F, Fut>(&self, base: &R, fetch: F) -> Result<Vec<T>, FetchError>
    where
        R: PageRequest,
        F: Fn(R) -> Fut,
        Fut: Future<Output = Result<Page<T>, FetchError>>,
    {
        let probe = base.with_window(0, 1);
        let total = self
            .retry
            .execute(&self.limiter, || fetch(probe.clone()))
            .await
            .map_err(|source| FetchError::IncompleteFetch {
                offset: 0,
                source: Box::new(source),
            })?
            .total;
        if total == 0 {
            return Ok(Vec::new());
        }

        let page_size = u64::from(self.page_size);
        debug!("Fetching {total} records in {} pages", total.div_ceil(page_size));

        let capacity = usize::try_from(total.min(page_size)).unwrap_or_default();
        let mut records = Vec::with_capacity(capacity);
        for offset in page_offsets(total, self.page_size) {
            let request = base.with_window(offset, self.page_size);
            let page = self
                .retry
                .execute(&self.limiter, || fetch(request.clone()))
                .await
                .map_err(|source| FetchError::IncompleteFetch {
                    offset,
                    source: Box::new(source),
                })?;
            let short = (page.records.len() as u64) < page_size;
            records.extend(page.records);
            if short && offset.saturating_add(page_size) < total {
                return Err(FetchError::RecordCountMismatch {
                    expected: total,
                    received: records.len() as u64,
                });
            }
        }

        let received = records.len() as u64;
        if received != total {
            return Err(FetchError::RecordCountMismatch {
                expected: total,
                received,
            });
        }
        Ok(records)
    }
}

impl Default for Paginator {
    fn default() -> Self {
        Self::new(
            Arc::new(RateLimiter::default()),
            RetryPolicy::default(),
            DEFAULT_PAGE_LIMIT,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    struct Window {
        offset: u64,
        limit: u32,
    }

    impl PageRequest for Window {
        fn offset(&self) -> u64 {
            self.offset
        }

        fn limit(&self) -> u32 {
            self.limit
        }

        fn with_window(&self, offset: u64, limit: u32) -> Self {
            Window { offset, limit }
        }
    }

    fn paginator() -> Paginator {
        Paginator::new(
            Arc::new(RateLimiter::new(5, Duration::ZERO)),
            RetryPolicy::new(1, Duration::from_millis(1), Duration::from_millis(1)),
            1000,
        )
    }

    fn serve(total: u64, request: &Window) -> Page<u64> {
        let end = (request.offset + u64::from(request.limit)).min(total);
        Page {
            total,
            records: (request.offset..end).collect(),
        }
    }

    #[tokio::test]
    async fn fetches_all_pages_in_order() {
        let seen = Mutex::new(Vec::new());
        let base = Window { offset: 0, limit: 1000 };

        let records = paginator()
            .fetch_all(&base, |request: Window| {
                seen.lock().unwrap().push(request.clone());
                let page = serve(3500, &request);
                async move { Ok::<_, FetchError>(page) }
            })
            .await
            .unwrap();

        assert_eq!(records, (0..3500).collect::<Vec<_>>());
        let seen = seen.into_inner().unwrap();
        assert_eq!(seen[0], Window { offset: 0, limit: 1 });
        let offsets: Vec<u64> = seen[1..].iter().map(|w| w.offset).collect();
        assert_eq!(offsets, vec![0, 1000, 2000, 3000]);
    }

    #[tokio::test]
    async fn empty_probe_skips_page_requests() {
        let calls = Mutex::new(0);
        let base = Window { offset: 0, limit: 1000 };

        let records = paginator()
            .fetch_all(&base, |request: Window| {
                *calls.lock().unwrap() += 1;
                let page = serve(0, &request);
                async move { Ok::<_, FetchError>(page) }
            })
            .await
            .unwrap();

        assert!(records.is_empty());
        assert_eq!(*calls.lock().unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_page_discards_partial_results() {
        let base = Window { offset: 0, limit: 1000 };

        let result = paginator()
            .fetch_all(&base, |request: Window| {
                let outcome = if request.offset == 2000 {
                    Err(FetchError::TransientService {
                        url: "data".to_string(),
                        reason: "504 Gateway Timeout".to_string(),
                    })
                } else {
                    Ok(serve(3500, &request))
                };
                async move { outcome }
            })
            .await;

        match result {
            Err(FetchError::IncompleteFetch { offset, source }) => {
                assert_eq!(offset, 2000);
                assert!(matches!(*source, FetchError::ExhaustedRetries { attempts: 2, .. }));
            }
            other => panic!("expected incomplete fetch, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn short_pages_are_reported() {
        let base = Window { offset: 0, limit: 1000 };

        let result = paginator()
            .fetch_all(&base, |request: Window| {
                let mut page = serve(1500, &request);
                if request.offset == 1000 {
                    page.records.truncate(100);
                }
                async move { Ok::<_, FetchError>(page) }
            })
            .await;

        assert!(matches!(
            result,
            Err(FetchError::RecordCountMismatch {
                expected: 1500,
                received: 1100
            })
        ));
    }

    #[tokio::test]
    async fn inflated_total_stops_at_first_short_page() {
        let claimed = u64::MAX / 4;
        let calls = Mutex::new(0);
        let base = Window { offset: 0, limit: 1000 };

        let result = paginator()
            .fetch_all(&base, |request: Window| {
                *calls.lock().unwrap() += 1;
                let page = Page {
                    total: claimed,
                    records: (request.offset..request.offset + 3).collect::<Vec<u64>>(),
                };
                async move { Ok::<_, FetchError>(page) }
            })
            .await;

        assert!(matches!(
            result,
            Err(FetchError::RecordCountMismatch { expected, received: 3 }) if expected == claimed
        ));
        assert_eq!(*calls.lock().unwrap(), 2);
    }
}
