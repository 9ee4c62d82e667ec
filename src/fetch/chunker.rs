//! Splits long date ranges into chunks the API accepts in a single query.

use crate::fetch::error::FetchError;
use crate::types::date_range::{Chunk, DateRange};
use chrono::{Months, NaiveDate};

/// Default maximum span of a single chunk, in years.
pub const DEFAULT_MAX_SPAN_YEARS: u32 = 10;

/// Splits `range` into consecutive chunks spanning at most `max_span_years` each.
///
/// Each chunk ends `max_span_years` calendar years after it starts (a February 29th
/// start clamps to February 28th). The last chunk holds the remainder, so the chunks
/// never overlap and together cover `range` exactly.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use noaa_cdo::{split, DateRange};
///
/// let d = |y, m, day| NaiveDate::from_ymd_opt(y, m, day).unwrap();
/// let chunks = split(DateRange::new(d(2000, 1, 1), d(2025, 1, 1)).unwrap(), 10).unwrap();
///
/// assert_eq!(chunks.len(), 3);
/// assert_eq!((chunks[1].start(), chunks[1].end()), (d(2010, 1, 1), d(2020, 1, 1)));
/// assert_eq!((chunks[2].start(), chunks[2].end()), (d(2020, 1, 1), d(2025, 1, 1)));
/// ```
pub fn split(range: DateRange, max_span_years: u32) -> Result<Vec<Chunk>, FetchError> {
    if max_span_years == 0 {
        return Err(FetchError::InvalidChunkSpan);
    }

    let mut chunks = Vec::new();
    let mut chunk_start = range.start();
    while chunk_start < range.end() {
        let chunk_end = match years_after(chunk_start, max_span_years) {
            Some(boundary) if boundary < range.end() => boundary,
            _ => range.end(),
        };
        chunks.push(DateRange::new(chunk_start, chunk_end)?);
        chunk_start = chunk_end;
    }
    Ok(chunks)
}

/// Validates `start < end` and splits the resulting range.
pub fn chunk_dates(
    start: NaiveDate,
    end: NaiveDate,
    max_span_years: u32,
) -> Result<Vec<Chunk>, FetchError> {
    split(DateRange::new(start, end)?, max_span_years)
}

fn years_after(date: NaiveDate, years: u32) -> Option<NaiveDate> {
    date.checked_add_months(Months::new(years.checked_mul(12)?))
}
