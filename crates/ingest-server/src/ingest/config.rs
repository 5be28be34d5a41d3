//! Ingestion configuration
//!
//! Settings for polling the remote posts API (`API_ENDPOINT`,
//! `INGESTION_INTERVAL`, `API_TIMEOUT`, `RETRY_COUNT`).

use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

use crate::config::{ConfigError, EnvSource};

/// Default remote endpoint returning a JSON array of posts.
pub const DEFAULT_API_ENDPOINT: &str = "https://jsonplaceholder.typicode.com/posts";

/// Default period between ingestion cycles (5 minutes).
pub const DEFAULT_INGESTION_INTERVAL: Duration = Duration::from_secs(300);

/// Default per-request timeout.
pub const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Default maximum number of fetch attempts per cycle.
pub const DEFAULT_RETRY_COUNT: u32 = 3;

/// Unit of the linear retry backoff: attempt `n` waits `n` units.
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(1);

/// Main ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Remote endpoint polled each cycle
    pub api_endpoint: Url,
    /// Period of the recurring timer
    pub interval: Duration,
    /// Timeout applied to each HTTP request
    pub request_timeout: Duration,
    /// Maximum fetch attempts per cycle (at least 1)
    pub retry_count: u32,
    /// Base delay of the linear backoff between attempts
    pub retry_base_delay: Duration,
}

impl IngestionConfig {
    /// Load ingestion configuration from the given source
    pub fn from_source(env: &EnvSource) -> Result<Self, ConfigError> {
        let endpoint = env.string_or("API_ENDPOINT", DEFAULT_API_ENDPOINT);
        let api_endpoint = Url::parse(&endpoint).map_err(|e| ConfigError::InvalidEndpoint {
            endpoint: endpoint.clone(),
            reason: e.to_string(),
        })?;

        let retry_count = match env.parse_or("RETRY_COUNT", DEFAULT_RETRY_COUNT) {
            0 => DEFAULT_RETRY_COUNT,
            n => n,
        };

        let config = Self {
            api_endpoint,
            interval: env.duration_or("INGESTION_INTERVAL", DEFAULT_INGESTION_INTERVAL),
            request_timeout: env.duration_or("API_TIMEOUT", DEFAULT_API_TIMEOUT),
            retry_count,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.api_endpoint.scheme() {
            "http" | "https" => {},
            other => {
                return Err(ConfigError::InvalidEndpoint {
                    endpoint: self.api_endpoint.to_string(),
                    reason: format!("unsupported scheme '{}'", other),
                })
            },
        }
        if self.retry_count == 0 {
            return Err(ConfigError::Invalid(
                "RETRY_COUNT must be greater than 0".to_string(),
            ));
        }
        if self.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "INGESTION_INTERVAL must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            api_endpoint: Url::parse(DEFAULT_API_ENDPOINT).expect("default endpoint is a valid URL"),
            interval: DEFAULT_INGESTION_INTERVAL,
            request_timeout: DEFAULT_API_TIMEOUT,
            retry_count: DEFAULT_RETRY_COUNT,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
        }
    }
}
