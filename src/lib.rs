pub mod cache;
mod config;
mod error;
pub mod fetch;
mod noaa;
mod types;
mod utils;

pub use config::{ConfigError, FetchConfig};
pub use error::NoaaError;
pub use noaa::*;

pub use cache::backend::{CacheBackend, FileBackend, MemoryBackend};
pub use cache::error::CacheError;
pub use cache::store::CacheStore;
pub use cache::whitelist::{LocationMetadata, LocationStatus, StationCount, StationEntry, WhitelistStore};

pub use fetch::api_client::NoaaApiClient;
pub use fetch::chunker::{chunk_dates, split};
pub use fetch::error::{ChunkFailure, FetchError, PartialFetch};
pub use fetch::orchestrator::{CategoryData, FetchOrchestrator, LocationData, LocationFailure, LocationFetch};
pub use fetch::paginator::Paginator;
pub use fetch::rate_limit::{RateLimiter, RatePermit};
pub use fetch::retry::RetryPolicy;
pub use fetch::source::DataSource;

pub use types::dataset::{Dataset, Units};
pub use types::date_range::{Chunk, DateRange};
pub use types::observation::{LocationSummary, Observation, Page, StationSummary};
pub use types::query::{CatalogQuery, PageRequest, Query, QueryFingerprint};

pub use utils::{format_size, parse_size};
