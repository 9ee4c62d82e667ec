//! Main entry point: a NOAA CDO client with a persistent fetch cache.

use crate::cache::store::CacheStore;
use crate::config::FetchConfig;
use crate::error::NoaaError;
use crate::fetch::api_client::NoaaApiClient;
use crate::fetch::orchestrator::{CategoryData, FetchOrchestrator, LocationFetch};
use crate::types::dataset::{Dataset, Units};
use crate::types::date_range::DateRange;
use crate::types::observation::Observation;
use crate::utils::{ensure_cache_dir_exists, get_cache_dir};
use bon::bon;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Client for the NOAA Climate Data Online v2 API.
///
/// Long date ranges are split into chunks, every request is paced and retried, and
/// the outcome of each request is remembered: queries that returned nothing are
/// blacklisted and never asked again, and locations whose stations were all fetched
/// are marked complete so later runs skip station discovery.
///
/// # Examples
///
/// ```no_run
/// # use noaa_cdo::{Dataset, FetchConfig, Noaa, NoaaError};
/// # use chrono::NaiveDate;
/// # #[tokio::main]
/// # async fn main() -> Result<(), NoaaError> {
/// let client = Noaa::new(FetchConfig::from_env()?).await?;
///
/// let observations = client
///     .location()
///     .dataset(Dataset::Gsom)
///     .location_id("FIPS:BR")
///     .start(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap())
///     .end(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
///     .call()
///     .await?;
/// println!("Fetched {} observations", observations.len());
/// # Ok(())
/// # }
/// ```
pub struct Noaa {
    orchestrator: FetchOrchestrator<NoaaApiClient>,
    cache_folder: PathBuf,
}

#[bon]
impl Noaa {
    /// Creates a client that keeps its cache in `cache_folder`, creating the folder if
    /// needed.
    ///
    /// # Errors
    ///
    /// Fails with [`NoaaError::CacheDirCreation`] if the folder cannot be created,
    /// with [`NoaaError::Fetch`] if no token is configured and with
    /// [`NoaaError::Cache`] if a stored whitelist cannot be read.
    pub async fn with_cache_folder(
        cache_folder: PathBuf,
        config: FetchConfig,
    ) -> Result<Self, NoaaError> {
        let client = NoaaApiClient::from_config(&config)?;
        ensure_cache_dir_exists(&cache_folder).await?;
        let cache = CacheStore::open_in_folder(
            &cache_folder,
            config.whitelist_target.clone(),
            config.whitelist_description.clone(),
        )
        .await?;
        Ok(Self {
            orchestrator: FetchOrchestrator::new(Arc::new(client), Arc::new(cache), &config),
            cache_folder,
        })
    }

    /// Creates a client caching in the user's cache directory
    /// (e.g. `~/.cache/noaa_cdo_cache` on Linux).
    pub async fn new(config: FetchConfig) -> Result<Self, NoaaError> {
        let cache_folder = get_cache_dir()?;
        Self::with_cache_folder(cache_folder, config).await
    }

    /// [`Noaa::new`] with the configuration read from the environment.
    pub async fn from_env() -> Result<Self, NoaaError> {
        Self::new(FetchConfig::from_env()?).await
    }

    pub fn cache(&self) -> &Arc<CacheStore> {
        self.orchestrator.cache()
    }

    pub fn cache_folder(&self) -> &Path {
        &self.cache_folder
    }

    /// Fetches observations for every station of a location, `start` inclusive and
    /// `end` exclusive.
    ///
    /// * `.stations(..)`: optional. Only fetch these stations instead of discovering them.
    /// * `.datatype_id(..)` / `.units(..)`: optional filters passed to the API.
    /// * `.location_name(..)`: optional. Name recorded in the whitelist.
    /// * `.cancel(..)`: optional. Aborts the fetch with `Cancelled` when triggered.
    ///
    /// # Errors
    ///
    /// Besides configuration and cache errors, a fetch where some chunks failed after
    /// retries returns `FetchError::PartialFetch` carrying the failed ranges and the
    /// observations that were recovered.
    #[builder]
    pub async fn location(
        &self,
        dataset: Dataset,
        location_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        stations: Option<Vec<String>>,
        datatype_id: Option<String>,
        units: Option<Units>,
        location_name: Option<String>,
        cancel: Option<CancellationToken>,
    ) -> Result<Vec<Observation>, NoaaError> {
        let request = LocationFetch::builder()
            .dataset(dataset)
            .location_id(location_id)
            .range(DateRange::new(start, end)?)
            .maybe_stations(stations)
            .maybe_datatype_id(datatype_id)
            .maybe_units(units)
            .maybe_location_name(location_name)
            .build();
        let records = match cancel {
            Some(token) => {
                self.orchestrator
                    .fetch_location_until_cancelled(&request, &token)
                    .await?
            }
            None => self.orchestrator.fetch_location(&request).await?,
        };
        Ok(records)
    }

    /// Fetches observations for a single station, `start` inclusive and `end`
    /// exclusive. Queries that return nothing are still blacklisted.
    #[builder]
    pub async fn station(
        &self,
        dataset: Dataset,
        station_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        cancel: Option<CancellationToken>,
    ) -> Result<Vec<Observation>, NoaaError> {
        let range = DateRange::new(start, end)?;
        let records = match cancel {
            Some(token) => {
                self.orchestrator
                    .fetch_station_until_cancelled(&dataset, station_id, range, &token)
                    .await?
            }
            None => self.orchestrator.fetch_station(&dataset, station_id, range).await?,
        };
        Ok(records)
    }

    /// Fetches every location of a category (e.g. `CNTRY`), at most `location_limit`
    /// of them.
    #[builder]
    pub async fn location_category(
        &self,
        dataset: Dataset,
        category_id: &str,
        start: NaiveDate,
        end: NaiveDate,
        location_limit: Option<usize>,
    ) -> Result<CategoryData, NoaaError> {
        let range = DateRange::new(start, end)?;
        Ok(self
            .orchestrator
            .fetch_location_category(&dataset, category_id, range, location_limit)
            .await?)
    }
}
