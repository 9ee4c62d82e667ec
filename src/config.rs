//! Tunables for the fetch pipeline and how to load them from the environment.

use crate::fetch::chunker::DEFAULT_MAX_SPAN_YEARS;
use crate::fetch::rate_limit::{DEFAULT_MAX_CONCURRENT, DEFAULT_MIN_SPACING};
use crate::fetch::retry::{DEFAULT_BASE_DELAY, DEFAULT_MAX_DELAY, DEFAULT_MAX_RETRIES};
use crate::types::query::DEFAULT_PAGE_LIMIT;
use bon::Builder;
use std::env;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://www.ncei.noaa.gov/cdo-web/api/v2/";
pub const DEFAULT_WHITELIST_TARGET: &str = "CNTRY";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const TOKEN_VAR: &str = "NOAA_TOKEN";
pub const API_URL_VAR: &str = "NOAA_API_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable {0} is not set")]
    MissingVar(&'static str),

    #[error("Environment variable {0} is not valid unicode")]
    NotUnicode(&'static str),
}

/// Settings shared by the API client, the rate limiter and the orchestrator.
///
/// # Examples
///
/// ```
/// use noaa_cdo::FetchConfig;
/// use std::time::Duration;
///
/// let config = FetchConfig::builder()
///     .token("my-token")
///     .max_retries(3)
///     .build();
/// assert_eq!(config.max_concurrent_requests, 5);
/// assert_eq!(config.min_request_spacing, Duration::from_millis(200));
/// ```
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct FetchConfig {
    #[builder(into, default = DEFAULT_BASE_URL.to_string())]
    pub base_url: String,
    #[builder(into)]
    pub token: Option<String>,
    #[builder(default = DEFAULT_MAX_CONCURRENT)]
    pub max_concurrent_requests: usize,
    #[builder(default = DEFAULT_MIN_SPACING)]
    pub min_request_spacing: Duration,
    #[builder(default = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,
    #[builder(default = DEFAULT_BASE_DELAY)]
    pub retry_base_delay: Duration,
    #[builder(default = DEFAULT_MAX_DELAY)]
    pub retry_max_delay: Duration,
    #[builder(default = DEFAULT_MAX_SPAN_YEARS)]
    pub max_chunk_span_years: u32,
    #[builder(default = DEFAULT_PAGE_LIMIT)]
    pub page_size: u32,
    #[builder(default = DEFAULT_REQUEST_TIMEOUT)]
    pub request_timeout: Duration,
    #[builder(default = true)]
    pub include_metadata: bool,
    #[builder(into, default = DEFAULT_WHITELIST_TARGET.to_string())]
    pub whitelist_target: String,
    #[builder(into, default)]
    pub whitelist_description: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl FetchConfig {
    /// Defaults with the token (required) and API url (optional) taken from the
    /// environment. A `.env` file in the working directory is loaded first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        let token = read_var(TOKEN_VAR)?.ok_or(ConfigError::MissingVar(TOKEN_VAR))?;
        let base_url = read_var(API_URL_VAR)?.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Ok(Self::builder().token(token).base_url(base_url).build())
    }
}

fn read_var(name: &'static str) -> Result<Option<String>, ConfigError> {
    match env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode(name)),
    }
}
