use crate::cache::error::CacheError;
use crate::types::date_range::DateRange;
use crate::types::observation::Observation;
use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Invalid date range: start {start} must be before end {end}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },

    #[error("Maximum chunk span must be at least one year")]
    InvalidChunkSpan,

    // 502/503/504 and timeouts; the only class the retry policy retries.
    #[error("Service temporarily unavailable for {url}: {reason}")]
    TransientService { url: String, reason: String },

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Request rejected as malformed for {url}: {message}")]
    BadRequest { url: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("HTTP request failed for {url} with status {status}")]
    HttpStatus {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Network request failed for {0}")]
    Network(String, #[source] reqwest::Error),

    #[error("Failed to decode response from {0}")]
    Decode(String, #[source] serde_json::Error),

    #[error("Request failed after {attempts} attempts")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        source: Box<FetchError>,
    },

    #[error("Page at offset {offset} could not be fetched, discarding partial results")]
    IncompleteFetch {
        offset: u64,
        #[source]
        source: Box<FetchError>,
    },

    #[error("Expected {expected} records but received {received}")]
    RecordCountMismatch { expected: u64, received: u64 },

    #[error("{} of {} fetch units failed", .0.failures.len(), .0.attempted_units)]
    PartialFetch(Box<PartialFetch>),

    #[error("Rate limiter was closed")]
    RateLimiterClosed,

    #[error("Fetch was cancelled")]
    Cancelled,

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl FetchError {
    /// Failures worth retrying after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::TransientService { .. })
    }

    /// Failures that abort a whole fetch instead of failing a single unit.
    pub fn is_fatal(&self) -> bool {
        match self {
            FetchError::InvalidRange { .. }
            | FetchError::InvalidChunkSpan
            | FetchError::Authentication(_)
            | FetchError::RateLimiterClosed
            | FetchError::Cancelled
            | FetchError::Cache(_) => true,
            FetchError::ExhaustedRetries { source, .. }
            | FetchError::IncompleteFetch { source, .. } => source.is_fatal(),
            _ => false,
        }
    }

    /// Strips retry and paging wrappers from a fatal error so callers see the cause.
    pub fn into_fatal_cause(self) -> Self {
        match self {
            FetchError::ExhaustedRetries { source, .. } | FetchError::IncompleteFetch { source, .. }
                if source.is_fatal() =>
            {
                (*source).into_fatal_cause()
            }
            other => other,
        }
    }
}

/// One unit (chunk × station) that failed after retries.
#[derive(Debug)]
pub struct ChunkFailure {
    pub station: Option<String>,
    pub range: DateRange,
    pub error: FetchError,
}

impl fmt::Display for ChunkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.station {
            Some(station) => write!(f, "{station} {}: {}", self.range, self.error),
            None => write!(f, "{}: {}", self.range, self.error),
        }
    }
}

/// Outcome of a fetch where some units failed after every other unit settled.
///
/// Holds the records of the units that did succeed, in chronological order, so
/// callers can keep them and retry only the listed gaps.
#[derive(Debug)]
pub struct PartialFetch {
    pub failures: Vec<ChunkFailure>,
    pub records: Vec<Observation>,
    pub attempted_units: usize,
}

impl PartialFetch {
    /// True when no unit produced an outcome at all.
    pub fn is_total_failure(&self) -> bool {
        self.failures.len() == self.attempted_units
    }

    /// Distinct date ranges that need to be fetched again.
    pub fn failed_ranges(&self) -> Vec<DateRange> {
        let mut ranges: Vec<DateRange> = self.failures.iter().map(|f| f.range).collect();
        ranges.sort();
        ranges.dedup();
        ranges
    }
}
