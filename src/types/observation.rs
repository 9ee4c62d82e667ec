//! Records returned by the CDO API and the page envelope they arrive in.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A single observation from the `/data` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Timestamp of the observation (the API reports local midnight for daily and
    /// coarser datasets).
    pub date: NaiveDateTime,
    /// Data type id, e.g. `TAVG` or `PRCP`.
    pub datatype: String,
    /// Station id, e.g. `GHCND:BR000352000`.
    pub station: String,
    /// Comma separated quality flags, if any.
    #[serde(default)]
    pub attributes: Option<String>,
    pub value: f64,
}

/// A station as listed by the `/stations` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationSummary {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub elevation: Option<f64>,
    #[serde(default)]
    pub mindate: Option<NaiveDate>,
    #[serde(default)]
    pub maxdate: Option<NaiveDate>,
    #[serde(default)]
    pub datacoverage: Option<f64>,
}

/// A location (country, state, city, ...) as listed by the `/locations` endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSummary {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mindate: Option<NaiveDate>,
    #[serde(default)]
    pub maxdate: Option<NaiveDate>,
    #[serde(default)]
    pub datacoverage: Option<f64>,
}

/// One page of results together with the total number of records the query matches.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub total: u64,
    pub records: Vec<T>,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            total: 0,
            records: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ResultSet {
    count: u64,
}

#[derive(Debug, Deserialize)]
struct ResponseMetadata {
    resultset: ResultSet,
}

/// Raw response envelope. An empty result is sent as `{}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    #[serde(default)]
    metadata: Option<ResponseMetadata>,
    #[serde(default = "Vec::new")]
    results: Vec<T>,
}

impl<T> From<ApiResponse<T>> for Page<T> {
    fn from(response: ApiResponse<T>) -> Self {
        let total = response
            .metadata
            .map(|m| m.resultset.count)
            .unwrap_or(response.results.len() as u64);
        Page {
            total,
            records: response.results,
        }
    }
}
