//! Configuration management
//!
//! All settings come from the process environment (optionally seeded from a
//! `.env` file). Malformed numeric and duration values fall back to their
//! defaults; structural problems such as an unknown storage type surface as
//! [`ConfigError`] at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::ingest::config::IngestionConfig;
use crate::storage::config::{StorageConfig, StorageKind};

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8080;

/// Default grace period for each shutdown phase.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default CORS allowed origin.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "*";

/// Construction-time configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unsupported storage type: {0}")]
    UnsupportedStorage(String),

    #[error("{setting} must be set when STORAGE_TYPE={kind}")]
    MissingSetting {
        setting: &'static str,
        kind: StorageKind,
    },

    #[error("invalid API endpoint '{endpoint}': {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("{0}")]
    Invalid(String),
}

/// Source of raw configuration values.
///
/// Empty values are treated as unset.
pub struct EnvSource {
    values: Option<HashMap<String, String>>,
}

impl EnvSource {
    /// Read from the process environment
    pub fn process() -> Self {
        Self { values: None }
    }

    /// Read from a fixed set of pairs instead of the process environment
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            values: Some(
                pairs
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            ),
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let value = match &self.values {
            Some(values) => values.get(key).cloned(),
            None => std::env::var(key).ok(),
        };
        value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    pub fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    pub fn parse_or<T: FromStr>(&self, key: &str, default: T) -> T {
        match self.get(key) {
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!(key, value = %raw, "Ignoring malformed setting, using default");
                default
            }),
            None => default,
        }
    }

    /// Parse a duration such as `5m`; unparseable or zero values yield `default`
    pub fn duration_or(&self, key: &str, default: Duration) -> Duration {
        match self.get(key) {
            Some(raw) => match ingest_common::duration::parse_duration(&raw) {
                Ok(parsed) if !parsed.is_zero() => parsed,
                _ => {
                    tracing::warn!(key, value = %raw, "Ignoring malformed duration, using default");
                    default
                },
            },
            None => default,
        }
    }
}

/// Service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub ingestion: IngestionConfig,
    pub storage: StorageConfig,
    pub cors: CorsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout: Duration,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// `.env` is read once by the binary before logging starts, so its
    /// values are already in the environment here.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_source(&EnvSource::process())
    }

    /// Build configuration from an explicit source
    pub fn from_source(env: &EnvSource) -> Result<Self, ConfigError> {
        let config = Config {
            server: ServerConfig {
                host: env.string_or("SERVER_HOST", DEFAULT_SERVER_HOST),
                port: env.parse_or("SERVER_PORT", DEFAULT_SERVER_PORT),
                shutdown_timeout: env.duration_or("SHUTDOWN_TIMEOUT", DEFAULT_SHUTDOWN_TIMEOUT),
            },
            ingestion: IngestionConfig::from_source(env)?,
            storage: StorageConfig::from_source(env)?,
            cors: CorsConfig {
                allowed_origins: env
                    .string_or("CORS_ALLOWED_ORIGINS", DEFAULT_CORS_ALLOWED_ORIGIN)
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: env.parse_or("CORS_ALLOW_CREDENTIALS", false),
            },
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid(
                "Server port must be greater than 0".to_string(),
            ));
        }

        self.ingestion.validate()?;
        self.storage.validate()?;

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            },
            ingestion: IngestionConfig::default(),
            storage: StorageConfig::default(),
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let config = Config::from_source(&EnvSource::from_pairs([])).unwrap();

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(config.storage.kind, StorageKind::DynamoDb);
        assert_eq!(config.ingestion.interval, Duration::from_secs(300));
        assert_eq!(config.ingestion.retry_count, 3);
        assert_eq!(config.cors.allowed_origins, vec!["*".to_string()]);
    }

    #[test]
    fn test_malformed_values_fall_back_to_defaults() {
        let env = EnvSource::from_pairs([
            ("SERVER_PORT", "eighty"),
            ("INGESTION_INTERVAL", "often"),
            ("API_TIMEOUT", "0s"),
            ("RETRY_COUNT", "-2"),
        ]);
        let config = Config::from_source(&env).unwrap();

        assert_eq!(config.server.port, DEFAULT_SERVER_PORT);
        assert_eq!(config.ingestion.interval, Duration::from_secs(300));
        assert_eq!(config.ingestion.request_timeout, Duration::from_secs(30));
        assert_eq!(config.ingestion.retry_count, 3);
    }

    #[test]
    fn test_overrides_are_applied() {
        let env = EnvSource::from_pairs([
            ("SERVER_PORT", "9090"),
            ("INGESTION_INTERVAL", "1m30s"),
            ("API_TIMEOUT", "5s"),
            ("RETRY_COUNT", "5"),
            ("STORAGE_TYPE", "memory"),
            ("CORS_ALLOWED_ORIGINS", "http://a.test, http://b.test"),
        ]);
        let config = Config::from_source(&env).unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.ingestion.interval, Duration::from_secs(90));
        assert_eq!(config.ingestion.request_timeout, Duration::from_secs(5));
        assert_eq!(config.ingestion.retry_count, 5);
        assert_eq!(config.storage.kind, StorageKind::Memory);
        assert_eq!(config.cors.allowed_origins.len(), 2);
    }

    #[test]
    fn test_unknown_storage_type_is_rejected() {
        let env = EnvSource::from_pairs([("STORAGE_TYPE", "cassandra")]);
        let err = Config::from_source(&env).unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedStorage(ref kind) if kind == "cassandra"));
    }

    #[test]
    fn test_backend_uri_is_required() {
        let env = EnvSource::from_pairs([("STORAGE_TYPE", "postgresql")]);
        let err = Config::from_source(&env).unwrap_err();
        assert_eq!(err.to_string(), "POSTGRES_URI must be set when STORAGE_TYPE=postgresql");

        let env = EnvSource::from_pairs([("STORAGE_TYPE", "mongodb")]);
        assert!(Config::from_source(&env).is_err());
    }

    #[test]
    fn test_zero_port_is_rejected() {
        let env = EnvSource::from_pairs([("SERVER_PORT", "0"), ("STORAGE_TYPE", "memory")]);
        assert!(Config::from_source(&env).is_err());
    }

    #[test]
    fn test_empty_values_count_as_unset() {
        let env = EnvSource::from_pairs([("SERVER_HOST", "  ")]);
        assert_eq!(env.string_or("SERVER_HOST", "127.0.0.1"), "127.0.0.1");
    }
}
