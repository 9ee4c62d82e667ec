//! Half-open calendar date ranges used to bound every data request.

use crate::fetch::error::FetchError;
use chrono::NaiveDate;
use std::fmt;

/// A half-open interval of calendar dates, `[start, end)`.
///
/// Construction guarantees `start < end`. When a range is sent to the API it is
/// encoded with an inclusive end date (`end - 1 day`), so consecutive ranges that
/// share a boundary never request the same day twice.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use noaa_cdo::DateRange;
///
/// let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
/// let end = NaiveDate::from_ymd_opt(2021, 1, 1).unwrap();
/// let range = DateRange::new(start, end).unwrap();
/// assert_eq!(range.last_day(), NaiveDate::from_ymd_opt(2020, 12, 31).unwrap());
///
/// assert!(DateRange::new(end, start).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

/// A bounded sub-range produced by [`crate::split`].
pub type Chunk = DateRange;

impl DateRange {
    /// Creates a range, failing with [`FetchError::InvalidRange`] unless `start < end`.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, FetchError> {
        if start >= end {
            return Err(FetchError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Exclusive end of the range.
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Last day covered by the range, i.e. the inclusive end sent as `enddate`.
    pub fn last_day(&self) -> NaiveDate {
        // start < end, so a predecessor always exists.
        self.end.pred_opt().unwrap_or(self.start)
    }

    /// Number of days in the range.
    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
