//! Overpass service configuration.
//!
//! Defaults live in `services/overpass.toml`, embedded at compile time.
//! The endpoint can be overridden with the `RESALE_MAP_OVERPASS_URL`
//! environment variable, and every value can be overridden by the CLI.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::EnrichError;
use crate::cache::ResponseCache;
use crate::client::FetchClient;
use crate::query::DEFAULT_RADIUS_METERS;
use crate::retry::RetryPolicy;
use crate::row::RowProcessor;
use crate::transport::HttpTransport;

/// Environment variable overriding [`OverpassService::base_url`].
pub const OVERPASS_URL_ENV: &str = "RESALE_MAP_OVERPASS_URL";

/// Default number of concurrent row workers.
pub const DEFAULT_WORKERS: usize = 3;

const OVERPASS_TOML: &str = include_str!("../services/overpass.toml");

/// Overpass service settings.
#[derive(Debug, Clone, Deserialize)]
pub struct OverpassService {
    /// Unique identifier (e.g. `"overpass"`).
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Interpreter endpoint.
    pub base_url: String,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Gap held after each successful request, in milliseconds.
    #[serde(default = "default_request_delay_ms")]
    pub request_delay_ms: u64,
    /// Retry policy for failed requests.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Query settings.
    #[serde(default)]
    pub query: QuerySettings,
    /// Batch settings.
    #[serde(default)]
    pub batch: BatchSettings,
}

/// `[query]` table.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct QuerySettings {
    /// Search radius around each row's coordinate.
    #[serde(default = "default_radius")]
    pub radius_meters: u32,
}

impl Default for QuerySettings {
    fn default() -> Self {
        Self {
            radius_meters: DEFAULT_RADIUS_METERS,
        }
    }
}

/// `[batch]` table.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BatchSettings {
    /// Concurrent row workers. More workers do not raise throughput past
    /// the throttle; they only queue on it.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for BatchSettings {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
        }
    }
}

const fn default_timeout_secs() -> u64 {
    60
}

const fn default_request_delay_ms() -> u64 {
    2000
}

const fn default_radius() -> u32 {
    DEFAULT_RADIUS_METERS
}

const fn default_workers() -> usize {
    DEFAULT_WORKERS
}

impl OverpassService {
    /// Parses a service definition from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::Config`] if the TOML is malformed.
    pub fn from_toml(text: &str) -> Result<Self, EnrichError> {
        toml::de::from_str(text).map_err(|e| EnrichError::Config {
            message: format!("Failed to parse Overpass service config: {e}"),
        })
    }

    /// The embedded default service, with the endpoint environment
    /// override applied.
    ///
    /// # Panics
    ///
    /// Panics if the embedded TOML is malformed (it is checked by tests).
    #[must_use]
    pub fn load() -> Self {
        let mut service = Self::from_toml(OVERPASS_TOML)
            .unwrap_or_else(|e| panic!("Embedded overpass.toml is invalid: {e}"));

        if let Ok(url) = std::env::var(OVERPASS_URL_ENV)
            && !url.trim().is_empty()
        {
            log::info!("Using Overpass endpoint from {OVERPASS_URL_ENV}: {url}");
            service.base_url = url.trim().to_string();
        }

        service
    }

    /// Per-request timeout.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Gap held after each successful request.
    #[must_use]
    pub const fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    /// Builds the HTTP transport for this service.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::Config`] if the HTTP client cannot be built.
    pub fn transport(&self) -> Result<HttpTransport, EnrichError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("resale-map/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| EnrichError::Config {
                message: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(HttpTransport::new(client, &self.base_url, self.timeout()))
    }

    /// Builds a throttled fetch client over [`Self::transport`].
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::Config`] if the HTTP client cannot be built.
    pub fn fetch_client(&self, cache: Arc<ResponseCache>) -> Result<FetchClient, EnrichError> {
        Ok(FetchClient::new(Arc::new(self.transport()?), cache)
            .with_request_delay(self.request_delay())
            .with_request_timeout(self.timeout())
            .with_retry(self.retry))
    }

    /// Builds a row processor using this service's radius.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::Config`] if the HTTP client cannot be built.
    pub fn row_processor(&self, cache: Arc<ResponseCache>) -> Result<RowProcessor, EnrichError> {
        Ok(RowProcessor::new(Arc::new(self.fetch_client(cache)?))
            .with_radius(self.query.radius_meters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_service_parses() {
        let service = OverpassService::from_toml(OVERPASS_TOML).unwrap();
        assert_eq!(service.id, "overpass");
        assert!(!service.name.is_empty());
        assert!(service.base_url.starts_with("https://"));
        assert_eq!(service.timeout(), Duration::from_secs(60));
        assert_eq!(service.request_delay(), Duration::from_secs(2));
        assert_eq!(service.retry, RetryPolicy::default());
        assert_eq!(service.query.radius_meters, 500);
        assert_eq!(service.batch.workers, 3);
    }

    #[test]
    fn optional_tables_default() {
        let service = OverpassService::from_toml(
            "id = \"local\"\nname = \"Local\"\nbase_url = \"http://localhost:12345/api/interpreter\"\n",
        )
        .unwrap();
        assert_eq!(service.timeout_secs, 60);
        assert_eq!(service.request_delay_ms, 2000);
        assert_eq!(service.retry.attempts(), 3);
        assert_eq!(service.query.radius_meters, DEFAULT_RADIUS_METERS);
        assert_eq!(service.batch.workers, DEFAULT_WORKERS);
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = OverpassService::from_toml("id = ").unwrap_err();
        assert!(matches!(err, EnrichError::Config { .. }));
    }
}
