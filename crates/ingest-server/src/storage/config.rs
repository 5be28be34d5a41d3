use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::{ConfigError, EnvSource};

/// Backend variants selectable through `STORAGE_TYPE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[serde(rename = "dynamodb")]
    DynamoDb,
    #[serde(rename = "mongodb")]
    MongoDb,
    #[serde(rename = "postgresql")]
    Postgres,
    Memory,
}

impl StorageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::DynamoDb => "dynamodb",
            StorageKind::MongoDb => "mongodb",
            StorageKind::Postgres => "postgresql",
            StorageKind::Memory => "memory",
        }
    }
}

impl fmt::Display for StorageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dynamodb" => Ok(StorageKind::DynamoDb),
            "mongodb" => Ok(StorageKind::MongoDb),
            "postgresql" | "postgres" => Ok(StorageKind::Postgres),
            "memory" => Ok(StorageKind::Memory),
            _ => Err(ConfigError::UnsupportedStorage(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub kind: StorageKind,
    /// Table (DynamoDB) or collection (MongoDB) holding posts
    pub table_name: String,
    pub region: String,
    /// Custom endpoint for DynamoDB Local
    pub dynamodb_endpoint: Option<String>,
    pub mongodb_uri: Option<String>,
    pub mongodb_database: String,
    pub postgres_uri: Option<String>,
    pub postgres_max_connections: u32,
}

impl StorageConfig {
    pub fn from_source(env: &EnvSource) -> Result<Self, ConfigError> {
        let kind = env.string_or("STORAGE_TYPE", "dynamodb").parse()?;

        let config = Self {
            kind,
            table_name: env.string_or("TABLE_NAME", "ingested_data"),
            region: env.string_or("AWS_REGION", "us-west-2"),
            dynamodb_endpoint: env.get("DYNAMODB_ENDPOINT"),
            mongodb_uri: env.get("MONGODB_URI"),
            mongodb_database: env.string_or("MONGODB_DATABASE", "ingestion"),
            postgres_uri: env.get("POSTGRES_URI"),
            postgres_max_connections: match env.parse_or("POSTGRES_MAX_CONNECTIONS", 5u32) {
                0 => 5,
                n => n,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.kind {
            StorageKind::MongoDb if self.mongodb_uri.is_none() => Err(ConfigError::MissingSetting {
                setting: "MONGODB_URI",
                kind: self.kind,
            }),
            StorageKind::Postgres if self.postgres_uri.is_none() => {
                Err(ConfigError::MissingSetting {
                    setting: "POSTGRES_URI",
                    kind: self.kind,
                })
            },
            _ if self.table_name.is_empty() => {
                Err(ConfigError::Invalid("TABLE_NAME cannot be empty".to_string()))
            },
            _ => Ok(()),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            kind: StorageKind::Memory,
            ..Self::default()
        }
    }

    /// Name of the table or collection holding the status record
    pub fn status_table_name(&self) -> String {
        format!("{}_status", self.table_name)
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            kind: StorageKind::DynamoDb,
            table_name: "ingested_data".to_string(),
            region: "us-west-2".to_string(),
            dynamodb_endpoint: None,
            mongodb_uri: None,
            mongodb_database: "ingestion".to_string(),
            postgres_uri: None,
            postgres_max_connections: 5,
        }
    }
}
