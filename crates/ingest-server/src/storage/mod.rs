//! Persistence for ingested posts and the ingestion status record
//!
//! Every backend implements [`Storage`]; the rest of the service only ever
//! holds an `Arc<dyn Storage>` chosen at startup by [`connect`].
//!
//! Contract shared by all backends:
//! - `store_posts` upserts by post id; re-storing an id replaces the record.
//! - `get_posts` pages over the stored records. The SQL and document
//!   backends order by ascending id; DynamoDB returns scan order. A
//!   `limit` of 0 yields an empty page on every backend.
//! - `get_post_by_id` yields `Ok(None)` for a missing id.
//! - `get_ingestion_status` yields the default `never_run` record when no
//!   status has been written.

use async_trait::async_trait;
use ingest_common::types::{IngestedPost, IngestionStatus};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

pub mod config;
pub mod dynamodb;
pub mod memory;
pub mod mongo;
pub mod postgres;

use config::{StorageConfig, StorageKind};

pub use dynamodb::DynamoStorage;
pub use memory::MemoryStorage;
pub use mongo::MongoStorage;
pub use postgres::PostgresStorage;

/// Result type alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Storage backend errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Postgres error: {0}")]
    Postgres(#[from] sqlx::Error),

    #[error("Postgres migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("DynamoDB error: {0}")]
    Dynamo(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Storage is closed")]
    Closed,

    #[error("Storage configuration error: {0}")]
    Config(String),
}

/// Polymorphic persistence contract
#[async_trait]
pub trait Storage: Send + Sync {
    /// Backend this instance talks to
    fn kind(&self) -> StorageKind;

    /// Upsert posts by id
    async fn store_posts(&self, posts: &[IngestedPost]) -> StorageResult<()>;

    async fn get_posts(&self, limit: usize, offset: usize) -> StorageResult<Vec<IngestedPost>>;

    async fn get_post_by_id(&self, id: i64) -> StorageResult<Option<IngestedPost>>;

    /// Replace the singleton status record
    async fn update_ingestion_status(&self, status: &IngestionStatus) -> StorageResult<()>;

    async fn get_ingestion_status(&self) -> StorageResult<IngestionStatus>;

    /// Release connections; later calls may fail with [`StorageError::Closed`]
    async fn close(&self) -> StorageResult<()>;
}

/// Connect to the backend named by `config.kind`.
///
/// Tables, collections, and schema are created when missing, so a fresh
/// database is usable immediately.
pub async fn connect(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    info!(backend = %config.kind, "Connecting storage backend");

    let storage: Arc<dyn Storage> = match config.kind {
        StorageKind::DynamoDb => Arc::new(DynamoStorage::connect(config).await?),
        StorageKind::MongoDb => Arc::new(MongoStorage::connect(config).await?),
        StorageKind::Postgres => Arc::new(PostgresStorage::connect(config).await?),
        StorageKind::Memory => Arc::new(MemoryStorage::new()),
    };

    info!(backend = %storage.kind(), "Storage backend ready");
    Ok(storage)
}
