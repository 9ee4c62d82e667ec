use crate::fetch::error::FetchError;
use crate::types::observation::{LocationSummary, Observation, Page, StationSummary};
use crate::types::query::{CatalogQuery, Query};
use std::future::Future;

/// Something that can answer single-page CDO requests.
///
/// Implementations perform exactly one request per call. Retries, pacing and paging
/// are layered on top by the fetch pipeline.
pub trait DataSource: Send + Sync {
    /// One page from the `/data` endpoint.
    fn data(&self, query: &Query) -> impl Future<Output = Result<Page<Observation>, FetchError>> + Send;

    /// One page from the `/stations` endpoint.
    fn stations(
        &self,
        query: &CatalogQuery,
    ) -> impl Future<Output = Result<Page<StationSummary>, FetchError>> + Send;

    /// One page from the `/locations` endpoint.
    fn locations(
        &self,
        query: &CatalogQuery,
    ) -> impl Future<Output = Result<Page<LocationSummary>, FetchError>> + Send;
}
