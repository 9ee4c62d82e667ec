use crate::config::FetchConfig;
use crate::fetch::error::FetchError;
use crate::fetch::source::DataSource;
use crate::types::observation::{ApiResponse, LocationSummary, Observation, Page, StationSummary};
use crate::types::query::{CatalogQuery, Query};
use log::{debug, warn};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Single-request HTTP access to the NOAA CDO v2 API.
///
/// Every call performs exactly one GET with the configured token. Status codes are
/// mapped onto [`FetchError`] so the retry policy can tell transient failures apart.
#[derive(Debug, Clone)]
pub struct NoaaApiClient {
    client: Client,
    base_url: String,
    token: String,
}

impl NoaaApiClient {
    /// Creates a client for the API at `base_url`.
    ///
    /// # Arguments
    ///
    /// * `base_url` - API root, e.g. `https://www.ncei.noaa.gov/cdo-web/api/v2/`. A
    ///                missing trailing slash is added.
    /// * `token` - Access token sent in the `token` header of every request.
    /// * `timeout` - Per-request timeout. Timeouts are reported as transient.
    ///
    /// # Errors
    ///
    /// [`FetchError::Authentication`] for an empty token and
    /// [`FetchError::Network`] if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(FetchError::Authentication(
                "no API token configured".to_string(),
            ));
        }
        let mut base_url = base_url.into();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| FetchError::Network(base_url.clone(), e))?;
        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// [`NoaaApiClient::new`] with the URL, token and timeout of `config`.
    pub fn from_config(config: &FetchConfig) -> Result<Self, FetchError> {
        Self::new(
            config.base_url.clone(),
            config.token.clone().unwrap_or_default(),
            config.request_timeout,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        pairs: &[(&'static str, String)],
    ) -> Result<Page<T>, FetchError> {
        let url = format!("{}{}", self.base_url, endpoint);
        debug!("GET {url} {pairs:?}");

        let response = self
            .client
            .get(&url)
            .header("token", &self.token)
            .query(pairs)
            .send()
            .await
            .map_err(|e| transport_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("HTTP error for {url}: {status}");
            return Err(classify_status(&url, status, body.trim()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(&url, e))?;
        let decoded: ApiResponse<T> =
            serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode(url.clone(), e))?;
        Ok(decoded.into())
    }
}

impl DataSource for NoaaApiClient {
    async fn data(&self, query: &Query) -> Result<Page<Observation>, FetchError> {
        self.get("data", &query.query_pairs()).await
    }

    async fn stations(
        &self,
        query: &CatalogQuery,
    ) -> Result<Page<StationSummary>, FetchError> {
        self.get("stations", &query.query_pairs()).await
    }

    async fn locations(
        &self,
        query: &CatalogQuery,
    ) -> Result<Page<LocationSummary>, FetchError> {
        self.get("locations", &query.query_pairs()).await
    }
}

/// Maps a non-success status onto the error taxonomy.
pub fn classify_status(url: &str, status: StatusCode, body: &str) -> FetchError {
    match status {
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT => {
            FetchError::TransientService {
                url: url.to_string(),
                reason: status.to_string(),
            }
        }
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            FetchError::Authentication(format!("{status} from {url}"))
        }
        StatusCode::BAD_REQUEST => FetchError::BadRequest {
            url: url.to_string(),
            message: if body.is_empty() {
                status.to_string()
            } else {
                body.to_string()
            },
        },
        StatusCode::NOT_FOUND => FetchError::NotFound(url.to_string()),
        _ => FetchError::HttpStatus {
            url: url.to_string(),
            status,
        },
    }
}

fn transport_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::TransientService {
            url: url.to_string(),
            reason: "request timed out".to_string(),
        }
    } else {
        FetchError::Network(url.to_string(), error)
    }
}
