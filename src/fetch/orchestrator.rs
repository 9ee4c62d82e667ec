//! Drives a whole request: chunk the range, resolve stations, fetch every
//! chunk × station unit through the cache, and merge the results in order.

use crate::cache::store::CacheStore;
use crate::config::FetchConfig;
use crate::fetch::chunker::split;
use crate::fetch::error::{ChunkFailure, FetchError, PartialFetch};
use crate::fetch::paginator::Paginator;
use crate::fetch::rate_limit::RateLimiter;
use crate::fetch::retry::RetryPolicy;
use crate::fetch::source::DataSource;
use crate::types::dataset::{Dataset, Units};
use crate::types::date_range::DateRange;
use crate::types::observation::{LocationSummary, Observation};
use crate::types::query::{CatalogQuery, Query};
use bon::Builder;
use futures_util::stream::{self, StreamExt};
use log::{debug, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Observations for one location (or one station) over a date range.
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct LocationFetch {
    pub dataset: Dataset,
    #[builder(into)]
    pub location_id: String,
    pub range: DateRange,
    /// Human readable name stored in the whitelist.
    #[builder(into)]
    pub location_name: Option<String>,
    /// Restricts the fetch to these stations instead of discovering them.
    pub stations: Option<Vec<String>>,
    #[builder(into)]
    pub datatype_id: Option<String>,
    pub units: Option<Units>,
}

/// A location of a category together with the observations fetched for it.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationData {
    pub location: LocationSummary,
    pub records: Vec<Observation>,
}

#[derive(Debug)]
pub struct LocationFailure {
    pub location: LocationSummary,
    pub error: FetchError,
}

/// Outcome of fetching every location of a category. Locations are listed in
/// discovery order.
#[derive(Debug, Default)]
pub struct CategoryData {
    pub locations: Vec<LocationData>,
    pub failures: Vec<LocationFailure>,
}

impl CategoryData {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn record_count(&self) -> usize {
        self.locations.iter().map(|l| l.records.len()).sum()
    }
}

#[derive(Debug)]
struct Unit {
    query: Query,
    location_id: Option<String>,
    station: String,
}

#[derive(Debug, Default)]
struct Merged {
    records: Vec<Observation>,
    failures: Vec<ChunkFailure>,
    failed_stations: HashSet<String>,
}

// Items and serialized bytes per station, accumulated over one run.
type StationTally = Mutex<HashMap<String, (u64, u64)>>;

/// Drops repeated station ids, keeping the first occurrence of each.
fn distinct(ids: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

pub struct FetchOrchestrator<S> {
    source: Arc<S>,
    cache: Arc<CacheStore>,
    limiter: Arc<RateLimiter>,
    paginator: Paginator,
    max_chunk_span_years: u32,
    max_concurrent: usize,
    page_size: u32,
    include_metadata: bool,
}

impl<S: DataSource> FetchOrchestrator<S> {
    pub fn new(source: Arc<S>, cache: Arc<CacheStore>, config: &FetchConfig) -> Self {
        let limiter = Arc::new(RateLimiter::new(
            config.max_concurrent_requests,
            config.min_request_spacing,
        ));
        let retry = RetryPolicy::new(
            config.max_retries,
            config.retry_base_delay,
            config.retry_max_delay,
        );
        Self {
            source,
            cache,
            paginator: Paginator::new(Arc::clone(&limiter), retry, config.page_size),
            max_concurrent: limiter.max_concurrent(),
            limiter,
            max_chunk_span_years: config.max_chunk_span_years,
            page_size: config.page_size,
            include_metadata: config.include_metadata,
        }
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Fetches every station of a location over the requested range.
    ///
    /// Stations come from the request when given, from the whitelist when the location
    /// is already complete, and from the stations endpoint otherwise. Units that fail
    /// after retries are collected into [`FetchError::PartialFetch`] once every other
    /// unit has settled; authentication, range and cache failures abort right away.
    ///
    /// A location is only marked complete when discovery found at least one station
    /// and every unit succeeded. A location without stations is left out of the
    /// whitelist so later fetches discover again.
    pub async fn fetch_location(&self, request: &LocationFetch) -> Result<Vec<Observation>, FetchError> {
        let chunks = split(request.range, self.max_chunk_span_years)?;
        let location_id = request.location_id.as_str();
        let already_complete = self.cache.is_location_complete(location_id).await;

        let (stations, discovered) = match &request.stations {
            Some(stations) => (distinct(stations.iter().cloned()), false),
            None if already_complete => {
                let known = self.cache.known_stations(location_id).await;
                info!(
                    "{location_id} is complete, fetching its {} known stations",
                    known.len()
                );
                (known, false)
            }
            None => (self.discover_stations(request).await?, true),
        };
        if discovered && stations.is_empty() {
            info!("No stations found for {location_id}");
        } else if discovered {
            self.cache
                .register_location(location_id, request.location_name.as_deref(), stations.len())
                .await?;
        }

        let template = Query::builder()
            .dataset(request.dataset.clone())
            .range(request.range)
            .location_id(location_id)
            .maybe_datatype_id(request.datatype_id.clone())
            .maybe_units(request.units)
            .limit(self.page_size)
            .include_metadata(self.include_metadata)
            .build();
        let units: Vec<Unit> = chunks
            .iter()
            .flat_map(|chunk| {
                let template = &template;
                stations.iter().map(move |station| Unit {
                    query: template.with_range(*chunk).with_station(station.as_str()),
                    location_id: Some(location_id.to_string()),
                    station: station.clone(),
                })
            })
            .collect();
        info!(
            "Fetching {} {} over {}: {} chunks x {} stations",
            request.dataset,
            location_id,
            request.range,
            chunks.len(),
            stations.len()
        );

        let merged = self.run_units(&units).await?;

        for station in stations.iter().filter(|s| !merged.failed_stations.contains(*s)) {
            self.cache.record_attempt(location_id, station).await?;
        }
        if merged.failures.is_empty() && discovered && !already_complete && !stations.is_empty() {
            self.cache.mark_complete(location_id).await?;
        }
        Self::finish(merged, units.len())
    }

    /// Fetches a single station over the requested range. Only the blacklist is
    /// consulted; nothing is recorded in the whitelist.
    pub async fn fetch_station(
        &self,
        dataset: &Dataset,
        station_id: &str,
        range: DateRange,
    ) -> Result<Vec<Observation>, FetchError> {
        let chunks = split(range, self.max_chunk_span_years)?;
        let template = Query::builder()
            .dataset(dataset.clone())
            .range(range)
            .station_id(station_id)
            .limit(self.page_size)
            .include_metadata(self.include_metadata)
            .build();
        let units: Vec<Unit> = chunks
            .iter()
            .map(|chunk| Unit {
                query: template.with_range(*chunk),
                location_id: None,
                station: station_id.to_string(),
            })
            .collect();

        let merged = self.run_units(&units).await?;
        Self::finish(merged, units.len())
    }

    /// Discovers the locations of a category and fetches each of them in turn.
    pub async fn fetch_location_category(
        &self,
        dataset: &Dataset,
        category_id: &str,
        range: DateRange,
        location_limit: Option<usize>,
    ) -> Result<CategoryData, FetchError> {
        let catalog = CatalogQuery::builder()
            .dataset(dataset.clone())
            .location_category_id(category_id)
            .range(range)
            .limit(self.page_size)
            .build();
        let source = &*self.source;
        let mut locations = self
            .paginator
            .fetch_all(&catalog, |query: CatalogQuery| async move {
                source.locations(&query).await
            })
            .await
            .map_err(FetchError::into_fatal_cause)?;
        if let Some(limit) = location_limit {
            locations.truncate(limit);
        }
        info!("Found {} locations in category {category_id}", locations.len());

        let mut data = CategoryData::default();
        for location in locations {
            let request = LocationFetch::builder()
                .dataset(dataset.clone())
                .location_id(location.id.clone())
                .maybe_location_name(location.name.clone())
                .range(range)
                .build();
            match self.fetch_location(&request).await {
                Ok(records) => data.locations.push(LocationData { location, records }),
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => {
                    warn!("Fetching {} failed: {error}", location.id);
                    data.failures.push(LocationFailure { location, error });
                }
            }
        }
        Ok(data)
    }

    /// [`Self::fetch_location`], aborted with [`FetchError::Cancelled`] once `token`
    /// fires. Cache writes that already completed are kept.
    pub async fn fetch_location_until_cancelled(
        &self,
        request: &LocationFetch,
        token: &CancellationToken,
    ) -> Result<Vec<Observation>, FetchError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(FetchError::Cancelled),
            result = self.fetch_location(request) => result,
        }
    }

    pub async fn fetch_station_until_cancelled(
        &self,
        dataset: &Dataset,
        station_id: &str,
        range: DateRange,
        token: &CancellationToken,
    ) -> Result<Vec<Observation>, FetchError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(FetchError::Cancelled),
            result = self.fetch_station(dataset, station_id, range) => result,
        }
    }

    async fn discover_stations(&self, request: &LocationFetch) -> Result<Vec<String>, FetchError> {
        let catalog = CatalogQuery::builder()
            .dataset(request.dataset.clone())
            .location_id(request.location_id.as_str())
            .limit(self.page_size)
            .build();
        let source = &*self.source;
        let stations = self
            .paginator
            .fetch_all(&catalog, |query: CatalogQuery| async move {
                source.stations(&query).await
            })
            .await
            .map_err(FetchError::into_fatal_cause)?;
        debug!("Discovered {} stations for {}", stations.len(), request.location_id);
        Ok(distinct(stations.into_iter().map(|station| station.id)))
    }

    async fn run_units(&self, units: &[Unit]) -> Result<Merged, FetchError> {
        let tally = StationTally::default();
        let tally = &tally;
        let mut outcomes = stream::iter(units)
            .map(move |unit| async move { (unit, self.run_unit(unit, tally).await) })
            .buffered(self.max_concurrent);

        let mut merged = Merged::default();
        while let Some((unit, outcome)) = outcomes.next().await {
            match outcome {
                Ok(records) => merged.records.extend(records),
                Err(error) if error.is_fatal() => return Err(error.into_fatal_cause()),
                Err(error) => {
                    warn!(
                        "Unit {} {} failed: {error}",
                        unit.station,
                        unit.query.range()
                    );
                    merged.failed_stations.insert(unit.station.clone());
                    merged.failures.push(ChunkFailure {
                        station: Some(unit.station.clone()),
                        range: unit.query.range(),
                        error,
                    });
                }
            }
        }
        Ok(merged)
    }

    async fn run_unit(&self, unit: &Unit, tally: &StationTally) -> Result<Vec<Observation>, FetchError> {
        let fingerprint = unit.query.fingerprint();
        if self.cache.is_blacklisted(&fingerprint).await {
            debug!("Skipping blacklisted {} {}", unit.station, unit.query.range());
            return Ok(Vec::new());
        }

        let source = &*self.source;
        let records = self
            .paginator
            .fetch_all(&unit.query, |query: Query| async move { source.data(&query).await })
            .await?;

        if records.is_empty() {
            self.cache.record_empty(fingerprint).await?;
            return Ok(records);
        }

        if let Some(location_id) = &unit.location_id {
            let bytes = serde_json::to_vec(&records).map_or(0, |encoded| encoded.len() as u64);
            let mut tally = tally.lock().await;
            let (items, size) = tally.entry(unit.station.clone()).or_default();
            *items += records.len() as u64;
            *size += bytes;
            self.cache
                .record_success(location_id, &unit.station, *items, *size)
                .await?;
        }
        Ok(records)
    }

    fn finish(merged: Merged, attempted_units: usize) -> Result<Vec<Observation>, FetchError> {
        if merged.failures.is_empty() {
            return Ok(merged.records);
        }
        Err(FetchError::PartialFetch(Box::new(PartialFetch {
            failures: merged.failures,
            records: merged.records,
            attempted_units,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::backend::MemoryBackend;
    use crate::types::observation::{Page, StationSummary};
    use crate::types::query::PageRequest;
    use chrono::{Datelike, NaiveDate};
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    type DataFn = Box<dyn Fn(&Query) -> Result<Vec<Observation>, FetchError> + Send + Sync>;

    struct FakeSource {
        stations: HashMap<String, Vec<String>>,
        locations: Vec<LocationSummary>,
        data: DataFn,
        data_calls: StdMutex<Vec<Query>>,
        station_calls: StdMutex<usize>,
        station_queries: StdMutex<Vec<CatalogQuery>>,
    }

    impl FakeSource {
        fn new(data: DataFn) -> Self {
            Self {
                stations: HashMap::new(),
                locations: Vec::new(),
                data,
                data_calls: StdMutex::new(Vec::new()),
                station_calls: StdMutex::new(0),
                station_queries: StdMutex::new(Vec::new()),
            }
        }

        fn with_stations(mut self, location: &str, stations: &[&str]) -> Self {
            self.stations.insert(
                location.to_string(),
                stations.iter().map(|s| s.to_string()).collect(),
            );
            self
        }

        fn with_location(mut self, id: &str, name: &str) -> Self {
            self.locations.push(LocationSummary {
                id: id.to_string(),
                name: Some(name.to_string()),
                mindate: None,
                maxdate: None,
                datacoverage: None,
            });
            self
        }

        /// Full-range (non probe) data requests, in the order they were issued.
        fn page_requests(&self) -> Vec<Query> {
            self.data_calls
                .lock()
                .unwrap()
                .iter()
                .filter(|q| q.limit() > 1)
                .cloned()
                .collect()
        }
    }

    fn window<T: Clone>(all: &[T], offset: u64, limit: u32) -> Page<T> {
        let start = (offset as usize).min(all.len());
        let end = (start + limit as usize).min(all.len());
        Page {
            total: all.len() as u64,
            records: all[start..end].to_vec(),
        }
    }

    impl DataSource for FakeSource {
        async fn data(&self, query: &Query) -> Result<Page<Observation>, FetchError> {
            self.data_calls.lock().unwrap().push(query.clone());
            // Earlier chunks answer more slowly so completion order differs from
            // chunk order.
            let year = query.range().start().year();
            tokio::time::sleep(Duration::from_millis((2100 - year) as u64 * 50)).await;
            let all = (self.data)(query)?;
            Ok(window(&all, query.offset(), query.limit()))
        }

        async fn stations(&self, query: &CatalogQuery) -> Result<Page<StationSummary>, FetchError> {
            *self.station_calls.lock().unwrap() += 1;
            self.station_queries.lock().unwrap().push(query.clone());
            let location = query.location_id().unwrap_or_default();
            let Some(ids) = self.stations.get(location) else {
                return Err(FetchError::NotFound(location.to_string()));
            };
            let all: Vec<StationSummary> = ids
                .iter()
                .map(|id| StationSummary {
                    id: id.clone(),
                    name: None,
                    latitude: None,
                    longitude: None,
                    elevation: None,
                    mindate: None,
                    maxdate: None,
                    datacoverage: None,
                })
                .collect();
            Ok(window(&all, query.offset(), query.limit()))
        }

        async fn locations(&self, query: &CatalogQuery) -> Result<Page<LocationSummary>, FetchError> {
            Ok(window(&self.locations, query.offset(), query.limit()))
        }
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn observation(station: &str, date: NaiveDate) -> Observation {
        Observation {
            date: date.and_hms_opt(0, 0, 0).unwrap(),
            datatype: "TAVG".to_string(),
            station: station.to_string(),
            attributes: None,
            value: 25.0,
        }
    }

    /// Two observations per query, dated at the start of its range.
    fn two_per_chunk() -> DataFn {
        Box::new(|query: &Query| {
            let station = query.station_id().unwrap_or_default();
            let start = query.range().start();
            Ok(vec![
                observation(station, start),
                observation(station, start.succ_opt().unwrap()),
            ])
        })
    }

    fn test_config() -> FetchConfig {
        FetchConfig::builder()
            .token("test")
            .min_request_spacing(Duration::from_millis(200))
            .retry_base_delay(Duration::from_millis(10))
            .retry_max_delay(Duration::from_millis(100))
            .max_retries(2)
            .build()
    }

    async fn orchestrator(source: FakeSource) -> FetchOrchestrator<FakeSource> {
        let cache = CacheStore::open(Arc::new(MemoryBackend::new()), "CNTRY", "Countries")
            .await
            .unwrap();
        FetchOrchestrator::new(Arc::new(source), Arc::new(cache), &test_config())
    }

    fn brazil(stations: Option<Vec<String>>) -> LocationFetch {
        LocationFetch::builder()
            .dataset(Dataset::Gsom)
            .location_id("FIPS:BR")
            .location_name("Brazil")
            .range(DateRange::new(d(2000, 1, 1), d(2025, 1, 1)).unwrap())
            .maybe_stations(stations)
            .build()
    }

    #[tokio::test(start_paused = true)]
    async fn fetches_three_decade_chunks_in_order() {
        let source = FakeSource::new(two_per_chunk()).with_stations("FIPS:BR", &["GHCND:A"]);
        let orchestrator = orchestrator(source).await;

        let records = orchestrator.fetch_location(&brazil(None)).await.unwrap();

        let mut ranges: Vec<(NaiveDate, NaiveDate)> = orchestrator
            .source
            .page_requests()
            .iter()
            .map(|q| (q.range().start(), q.range().last_day()))
            .collect();
        ranges.sort();
        assert_eq!(
            ranges,
            vec![
                (d(2000, 1, 1), d(2009, 12, 31)),
                (d(2010, 1, 1), d(2019, 12, 31)),
                (d(2020, 1, 1), d(2024, 12, 31)),
            ]
        );
        let dates: Vec<NaiveDate> = records.iter().map(|r| r.date.date()).collect();
        assert_eq!(
            dates,
            vec![
                d(2000, 1, 1),
                d(2000, 1, 2),
                d(2010, 1, 1),
                d(2010, 1, 2),
                d(2020, 1, 1),
                d(2020, 1, 2),
            ]
        );

        let cache = orchestrator.cache();
        assert!(cache.is_location_complete("FIPS:BR").await);
        let entry = cache.location_entry("FIPS:BR").await.unwrap();
        assert_eq!(entry.items, 6);
        assert_eq!(entry.name, "Brazil");
        assert_eq!(entry.count.to_string(), "1/1");
    }

    #[tokio::test(start_paused = true)]
    async fn complete_location_skips_discovery() {
        let source = FakeSource::new(two_per_chunk())
            .with_stations("FIPS:BR", &["GHCND:A", "GHCND:B", "GHCND:C"]);
        let orchestrator = orchestrator(source).await;
        let cache = orchestrator.cache();
        cache.register_location("FIPS:BR", Some("Brazil"), 2).await.unwrap();
        cache.record_success("FIPS:BR", "GHCND:A", 1, 10).await.unwrap();
        cache.record_success("FIPS:BR", "GHCND:B", 1, 10).await.unwrap();
        assert!(cache.mark_complete("FIPS:BR").await.unwrap());

        orchestrator.fetch_location(&brazil(None)).await.unwrap();

        assert_eq!(*orchestrator.source.station_calls.lock().unwrap(), 0);
        let queried: HashSet<String> = orchestrator
            .source
            .page_requests()
            .iter()
            .filter_map(|q| q.station_id().map(str::to_string))
            .collect();
        assert_eq!(
            queried,
            HashSet::from(["GHCND:A".to_string(), "GHCND:B".to_string()])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn failed_units_are_collected_after_siblings_finish() {
        let data: DataFn = Box::new(|query: &Query| {
            if query.station_id() == Some("GHCND:B") && query.range().start().year() == 2010 {
                return Err(FetchError::TransientService {
                    url: "data".to_string(),
                    reason: "503 Service Unavailable".to_string(),
                });
            }
            (two_per_chunk())(query)
        });
        let source = FakeSource::new(data).with_stations("FIPS:BR", &["GHCND:A", "GHCND:B"]);
        let orchestrator = orchestrator(source).await;

        let error = orchestrator.fetch_location(&brazil(None)).await.unwrap_err();

        let FetchError::PartialFetch(partial) = error else {
            panic!("expected a partial fetch, got {error:?}");
        };
        assert_eq!(partial.attempted_units, 6);
        assert_eq!(partial.failures.len(), 1);
        assert_eq!(partial.failures[0].station.as_deref(), Some("GHCND:B"));
        assert_eq!(
            partial.failed_ranges(),
            vec![DateRange::new(d(2010, 1, 1), d(2020, 1, 1)).unwrap()]
        );
        assert!(!partial.is_total_failure());
        assert_eq!(partial.records.len(), 10);
        assert!(partial
            .records
            .windows(2)
            .all(|pair| pair[0].date <= pair[1].date));
        assert!(!orchestrator.cache().is_location_complete("FIPS:BR").await);
    }

    #[tokio::test(start_paused = true)]
    async fn every_unit_failing_is_a_total_failure() {
        let data: DataFn = Box::new(|_: &Query| {
            Err(FetchError::TransientService {
                url: "data".to_string(),
                reason: "502 Bad Gateway".to_string(),
            })
        });
        let source = FakeSource::new(data).with_stations("FIPS:BR", &["GHCND:A", "GHCND:B"]);
        let orchestrator = orchestrator(source).await;

        let error = orchestrator.fetch_location(&brazil(None)).await.unwrap_err();

        let FetchError::PartialFetch(partial) = error else {
            panic!("expected a partial fetch, got {error:?}");
        };
        assert!(partial.is_total_failure());
        assert_eq!(partial.attempted_units, 6);
        assert!(partial.records.is_empty());
        assert!(partial.failures.iter().all(|f| matches!(
            f.error,
            FetchError::IncompleteFetch { offset: 0, .. }
        )));
        assert!(!orchestrator.cache().is_location_complete("FIPS:BR").await);
    }

    #[tokio::test(start_paused = true)]
    async fn location_without_stations_is_discovered_again() {
        let source = FakeSource::new(two_per_chunk()).with_stations("FIPS:BR", &[]);
        let orchestrator = orchestrator(source).await;
        let early = LocationFetch::builder()
            .dataset(Dataset::Gsom)
            .location_id("FIPS:BR")
            .range(DateRange::new(d(1800, 1, 1), d(1801, 1, 1)).unwrap())
            .build();

        let first = orchestrator.fetch_location(&early).await.unwrap();
        assert!(first.is_empty());
        assert!(!orchestrator.cache().is_location_complete("FIPS:BR").await);
        assert!(orchestrator.cache().location_entry("FIPS:BR").await.is_none());

        let second = orchestrator.fetch_location(&brazil(None)).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(*orchestrator.source.station_calls.lock().unwrap(), 2);
        let queries = orchestrator.source.station_queries.lock().unwrap();
        assert!(queries.iter().all(|q| q.range().is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_station_ids_are_fetched_once() {
        let source =
            FakeSource::new(two_per_chunk()).with_stations("FIPS:BR", &["GHCND:A", "GHCND:A"]);
        let orchestrator = orchestrator(source).await;

        let records = orchestrator.fetch_location(&brazil(None)).await.unwrap();

        assert_eq!(records.len(), 6);
        let cache = orchestrator.cache();
        let entry = cache.location_entry("FIPS:BR").await.unwrap();
        assert_eq!(entry.items, 6);
        assert_eq!(entry.count.to_string(), "1/1");
        assert!(cache.is_location_complete("FIPS:BR").await);

        let stations = vec!["GHCND:B".to_string(), "GHCND:B".to_string()];
        let records = orchestrator
            .fetch_location(&brazil(Some(stations)))
            .await
            .unwrap();
        assert_eq!(records.len(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn supplied_stations_without_data_count_as_attempted() {
        let data: DataFn = Box::new(|query: &Query| {
            if query.station_id() == Some("GHCND:A") {
                (two_per_chunk())(query)
            } else {
                Ok(Vec::new())
            }
        });
        let orchestrator = orchestrator(FakeSource::new(data)).await;
        let stations = ["GHCND:A", "GHCND:B", "GHCND:C"].map(str::to_string).to_vec();

        orchestrator.fetch_location(&brazil(Some(stations))).await.unwrap();

        let entry = orchestrator.cache().location_entry("FIPS:BR").await.unwrap();
        assert_eq!(entry.count.to_string(), "1/3");
        assert!(!orchestrator.cache().is_location_complete("FIPS:BR").await);
    }

    #[tokio::test(start_paused = true)]
    async fn authentication_failure_aborts() {
        let data: DataFn =
            Box::new(|_: &Query| Err(FetchError::Authentication("invalid token".to_string())));
        let source = FakeSource::new(data).with_stations("FIPS:BR", &["GHCND:A", "GHCND:B"]);
        let orchestrator = orchestrator(source).await;

        let error = orchestrator.fetch_location(&brazil(None)).await.unwrap_err();
        assert!(matches!(error, FetchError::Authentication(_)), "{error:?}");
    }

    #[tokio::test]
    async fn zero_chunk_span_fails_before_any_request() {
        let cache = CacheStore::open(Arc::new(MemoryBackend::new()), "CNTRY", "")
            .await
            .unwrap();
        let config = FetchConfig::builder().token("test").max_chunk_span_years(0).build();
        let orchestrator = FetchOrchestrator::new(
            Arc::new(FakeSource::new(two_per_chunk()).with_stations("FIPS:BR", &["GHCND:A"])),
            Arc::new(cache),
            &config,
        );

        let error = orchestrator.fetch_location(&brazil(None)).await.unwrap_err();
        assert!(matches!(error, FetchError::InvalidChunkSpan));
        assert!(error.is_fatal());
        assert_eq!(*orchestrator.source.station_calls.lock().unwrap(), 0);
        assert!(orchestrator.source.data_calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn empty_units_are_blacklisted_and_skipped_next_time() {
        let data: DataFn = Box::new(|query: &Query| {
            if query.range().start().year() == 2000 {
                Ok(Vec::new())
            } else {
                (two_per_chunk())(query)
            }
        });
        let source = FakeSource::new(data);
        let orchestrator = orchestrator(source).await;
        let stations = Some(vec!["GHCND:A".to_string()]);

        let first = orchestrator.fetch_location(&brazil(stations.clone())).await.unwrap();
        assert_eq!(first.len(), 4);
        assert_eq!(orchestrator.cache().blacklist_len().await, 1);
        let requests_after_first = orchestrator.source.data_calls.lock().unwrap().len();

        let second = orchestrator.fetch_location(&brazil(stations)).await.unwrap();
        assert_eq!(second, first);
        let calls = orchestrator.source.data_calls.lock().unwrap();
        assert!(calls[requests_after_first..]
            .iter()
            .all(|q| q.range().start().year() != 2000));
    }

    #[tokio::test(start_paused = true)]
    async fn station_fetch_leaves_whitelist_alone() {
        let orchestrator = orchestrator(FakeSource::new(two_per_chunk())).await;
        let range = DateRange::new(d(1990, 1, 1), d(2010, 1, 1)).unwrap();

        let records = orchestrator
            .fetch_station(&Dataset::Ghcnd, "GHCND:A", range)
            .await
            .unwrap();

        assert_eq!(records.len(), 4);
        assert!(orchestrator.cache().whitelist().await.stations.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn category_fetch_reports_failed_locations() {
        let source = FakeSource::new(two_per_chunk())
            .with_location("FIPS:BR", "Brazil")
            .with_location("FIPS:XX", "Nowhere")
            .with_location("FIPS:AR", "Argentina")
            .with_stations("FIPS:BR", &["GHCND:A"])
            .with_stations("FIPS:AR", &["GHCND:C"]);
        let orchestrator = orchestrator(source).await;
        let range = DateRange::new(d(2000, 1, 1), d(2001, 1, 1)).unwrap();

        let data = orchestrator
            .fetch_location_category(&Dataset::Gsom, "CNTRY", range, Some(2))
            .await
            .unwrap();

        assert_eq!(data.locations.len(), 1);
        assert_eq!(data.locations[0].location.id, "FIPS:BR");
        assert_eq!(data.record_count(), 2);
        assert_eq!(data.failures.len(), 1);
        assert_eq!(data.failures[0].location.id, "FIPS:XX");
        assert!(!data.is_complete());
        let brazil = orchestrator.cache().location_entry("FIPS:BR").await.unwrap();
        assert_eq!(brazil.name, "Brazil");
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_the_fetch() {
        let source = FakeSource::new(two_per_chunk()).with_stations("FIPS:BR", &["GHCND:A"]);
        let orchestrator = orchestrator(source).await;
        let token = CancellationToken::new();
        token.cancel();

        let result = orchestrator
            .fetch_location_until_cancelled(&brazil(None), &token)
            .await;
        assert!(matches!(result, Err(FetchError::Cancelled)));
        assert!(orchestrator.source.data_calls.lock().unwrap().is_empty());

        let running = CancellationToken::new();
        let cancel = running.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            cancel.cancel();
        });
        let result = orchestrator
            .fetch_location_until_cancelled(&brazil(None), &running)
            .await;
        assert!(matches!(result, Err(FetchError::Cancelled)));
        assert_eq!(orchestrator.limiter().available(), 5);
    }
}
