//! Typed request values for the CDO API and the canonical fingerprint used as the
//! blacklist key.

use crate::types::dataset::{Dataset, Units};
use crate::types::date_range::DateRange;
use bon::Builder;
use std::collections::BTreeMap;
use std::fmt;

/// Default number of records requested per page.
pub const DEFAULT_PAGE_LIMIT: u32 = 1000;

/// A request that can be windowed by offset and limit, which is all the paginator
/// needs to know about it.
pub trait PageRequest: Clone {
    /// 0-based index of the first record requested.
    fn offset(&self) -> u64;
    fn limit(&self) -> u32;
    /// Returns a copy of this request covering a different window.
    fn with_window(&self, offset: u64, limit: u32) -> Self;
}

/// One fetchable unit of observation data (`/data` endpoint).
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use noaa_cdo::{Dataset, DateRange, Query};
///
/// let range = DateRange::new(
///     NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
///     NaiveDate::from_ymd_opt(2010, 1, 1).unwrap(),
/// ).unwrap();
/// let query = Query::builder()
///     .dataset(Dataset::Gsom)
///     .range(range)
///     .location_id("FIPS:BR")
///     .station_id("GHCND:BR000352000")
///     .build();
///
/// assert_eq!(
///     query.fingerprint().as_str(),
///     "datasetid=GSOM&enddate=2009-12-31&includemetadata=true&limit=1000\
///      &locationid=FIPS:BR&startdate=2000-01-01&stationid=GHCND:BR000352000"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Builder)]
pub struct Query {
    dataset: Dataset,
    range: DateRange,
    #[builder(into)]
    location_id: Option<String>,
    #[builder(into)]
    station_id: Option<String>,
    #[builder(into)]
    datatype_id: Option<String>,
    units: Option<Units>,
    #[builder(default)]
    offset: u64,
    #[builder(default = DEFAULT_PAGE_LIMIT)]
    limit: u32,
    #[builder(default = true)]
    include_metadata: bool,
}

impl Query {
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn range(&self) -> DateRange {
        self.range
    }

    pub fn location_id(&self) -> Option<&str> {
        self.location_id.as_deref()
    }

    pub fn station_id(&self) -> Option<&str> {
        self.station_id.as_deref()
    }

    pub fn datatype_id(&self) -> Option<&str> {
        self.datatype_id.as_deref()
    }

    pub fn units(&self) -> Option<Units> {
        self.units
    }

    pub fn include_metadata(&self) -> bool {
        self.include_metadata
    }

    /// Same query restricted to another date range (used per chunk).
    pub fn with_range(&self, range: DateRange) -> Self {
        Self {
            range,
            ..self.clone()
        }
    }

    /// Same query for another station.
    pub fn with_station(&self, station_id: impl Into<String>) -> Self {
        Self {
            station_id: Some(station_id.into()),
            ..self.clone()
        }
    }

    /// Canonical blacklist key over every field except the offset.
    pub fn fingerprint(&self) -> QueryFingerprint {
        let mut fields = BTreeMap::new();
        fields.insert("datasetid", self.dataset.id().to_string());
        fields.insert("startdate", self.range.start().to_string());
        fields.insert("enddate", self.range.last_day().to_string());
        fields.insert("limit", self.limit.to_string());
        fields.insert("includemetadata", self.include_metadata.to_string());
        if let Some(location) = &self.location_id {
            fields.insert("locationid", location.clone());
        }
        if let Some(station) = &self.station_id {
            fields.insert("stationid", station.clone());
        }
        if let Some(datatype) = &self.datatype_id {
            fields.insert("datatypeid", datatype.clone());
        }
        if let Some(units) = self.units {
            fields.insert("units", units.as_str().to_string());
        }
        QueryFingerprint::from_fields(fields)
    }

    /// Query string pairs as sent to the API. The API counts offsets from 1.
    pub(crate) fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("datasetid", self.dataset.id().to_string()),
            ("startdate", self.range.start().to_string()),
            ("enddate", self.range.last_day().to_string()),
        ];
        if let Some(location) = &self.location_id {
            pairs.push(("locationid", location.clone()));
        }
        if let Some(station) = &self.station_id {
            pairs.push(("stationid", station.clone()));
        }
        if let Some(datatype) = &self.datatype_id {
            pairs.push(("datatypeid", datatype.clone()));
        }
        if let Some(units) = self.units {
            pairs.push(("units", units.as_str().to_string()));
        }
        pairs.push(("limit", self.limit.to_string()));
        pairs.push(("offset", (self.offset + 1).to_string()));
        pairs.push(("includemetadata", self.include_metadata.to_string()));
        pairs
    }
}

impl PageRequest for Query {
    fn offset(&self) -> u64 {
        self.offset
    }

    fn limit(&self) -> u32 {
        self.limit
    }

    fn with_window(&self, offset: u64, limit: u32) -> Self {
        Self {
            offset,
            limit,
            ..self.clone()
        }
    }
}

/// Listing request for the `/stations` and `/locations` endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Builder)]
pub struct CatalogQuery {
    dataset: Option<Dataset>,
    #[builder(into)]
    location_id: Option<String>,
    #[builder(into)]
    location_category_id: Option<String>,
    range: Option<DateRange>,
    #[builder(default)]
    offset: u64,
    #[builder(default = DEFAULT_PAGE_LIMIT)]
    limit: u32,
}

impl CatalogQuery {
    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn location_id(&self) -> Option<&str> {
        self.location_id.as_deref()
    }

    pub fn range(&self) -> Option<DateRange> {
        self.range
    }

    pub fn location_category_id(&self) -> Option<&str> {
        self.location_category_id.as_deref()
    }

    pub(crate) fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = Vec::new();
        if let Some(dataset) = &self.dataset {
            pairs.push(("datasetid", dataset.id().to_string()));
        }
        if let Some(location) = &self.location_id {
            pairs.push(("locationid", location.clone()));
        }
        if let Some(category) = &self.location_category_id {
            pairs.push(("locationcategoryid", category.clone()));
        }
        if let Some(range) = &self.range {
            pairs.push(("startdate", range.start().to_string()));
            pairs.push(("enddate", range.last_day().to_string()));
        }
        pairs.push(("limit", self.limit.to_string()));
        pairs.push(("offset", (self.offset + 1).to_string()));
        pairs
    }
}

impl PageRequest for CatalogQuery {
    fn offset(&self) -> u64 {
        self.offset
    }

    fn limit(&self) -> u32 {
        self.limit
    }

    fn with_window(&self, offset: u64, limit: u32) -> Self {
        Self {
            offset,
            limit,
            ..self.clone()
        }
    }
}

/// Canonical `key=value&key=value` serialization of a [`Query`], keys sorted.
///
/// Two fingerprints are equal exactly when the underlying queries agree on every
/// non-offset field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryFingerprint(String);

impl QueryFingerprint {
    fn from_fields(fields: BTreeMap<&'static str, String>) -> Self {
        let joined = fields
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join("&");
        Self(joined)
    }

    /// Wraps a line read back from durable storage.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
