//! MongoDB backend
//!
//! Posts live in the `TABLE_NAME` collection with a unique index on `id`.
//! The status record is a single document with `_id: "ingestion_status"` in
//! the `<TABLE_NAME>_status` collection.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use ingest_common::types::{IngestedPost, IngestionStatus, RunStatus};
use mongodb::{
    bson::doc,
    options::IndexOptions,
    Client, Collection, IndexModel,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, instrument};

use super::config::{StorageConfig, StorageKind};
use super::{Storage, StorageError, StorageResult};

const STATUS_DOCUMENT_ID: &str = "ingestion_status";

#[derive(Debug, Serialize, Deserialize)]
struct StatusDocument {
    #[serde(rename = "_id")]
    id: String,
    last_successful_run: Option<DateTime<Utc>>,
    last_attempt: Option<DateTime<Utc>>,
    status: RunStatus,
    #[serde(default)]
    error_message: Option<String>,
    records_ingested: i64,
}

impl From<&IngestionStatus> for StatusDocument {
    fn from(status: &IngestionStatus) -> Self {
        Self {
            id: STATUS_DOCUMENT_ID.to_string(),
            last_successful_run: status.last_successful_run,
            last_attempt: status.last_attempt,
            status: status.status,
            error_message: status.error_message.clone(),
            records_ingested: status.records_ingested,
        }
    }
}

impl From<StatusDocument> for IngestionStatus {
    fn from(doc: StatusDocument) -> Self {
        Self {
            last_successful_run: doc.last_successful_run,
            last_attempt: doc.last_attempt,
            status: doc.status,
            error_message: doc.error_message,
            records_ingested: doc.records_ingested,
        }
    }
}

pub struct MongoStorage {
    client: Client,
    posts: Collection<IngestedPost>,
    status: Collection<StatusDocument>,
    closed: AtomicBool,
}

impl MongoStorage {
    pub async fn connect(config: &StorageConfig) -> StorageResult<Self> {
        let uri = config.mongodb_uri.as_deref().ok_or_else(|| {
            StorageError::Config("MONGODB_URI must be set for the mongodb backend".to_string())
        })?;

        let client = Client::with_uri_str(uri).await?;
        let database = client.database(&config.mongodb_database);
        database.run_command(doc! { "ping": 1 }).await?;

        let posts = database.collection::<IngestedPost>(&config.table_name);
        let status = database.collection::<StatusDocument>(&config.status_table_name());

        let index = IndexModel::builder()
            .keys(doc! { "id": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        posts.create_index(index).await?;

        info!(
            database = %config.mongodb_database,
            collection = %config.table_name,
            "Connected to MongoDB"
        );

        Ok(Self {
            client,
            posts,
            status,
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for MongoStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::MongoDb
    }

    #[instrument(skip(self, posts), fields(count = posts.len()))]
    async fn store_posts(&self, posts: &[IngestedPost]) -> StorageResult<()> {
        self.ensure_open()?;
        for post in posts {
            self.posts
                .replace_one(doc! { "id": post.id }, post)
                .upsert(true)
                .await?;
        }
        debug!("Stored posts in MongoDB");
        Ok(())
    }

    async fn get_posts(&self, limit: usize, offset: usize) -> StorageResult<Vec<IngestedPost>> {
        self.ensure_open()?;
        // The driver treats a zero limit as "no limit"
        if limit == 0 {
            return Ok(Vec::new());
        }
        let cursor = self
            .posts
            .find(doc! {})
            .sort(doc! { "id": 1 })
            .skip(u64::try_from(offset).unwrap_or(u64::MAX))
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .await?;

        Ok(cursor.try_collect().await?)
    }

    async fn get_post_by_id(&self, id: i64) -> StorageResult<Option<IngestedPost>> {
        self.ensure_open()?;
        Ok(self.posts.find_one(doc! { "id": id }).await?)
    }

    async fn update_ingestion_status(&self, status: &IngestionStatus) -> StorageResult<()> {
        self.ensure_open()?;
        self.status
            .replace_one(
                doc! { "_id": STATUS_DOCUMENT_ID },
                StatusDocument::from(status),
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn get_ingestion_status(&self) -> StorageResult<IngestionStatus> {
        self.ensure_open()?;
        let doc = self
            .status
            .find_one(doc! { "_id": STATUS_DOCUMENT_ID })
            .await?;
        Ok(doc.map(IngestionStatus::from).unwrap_or_default())
    }

    async fn close(&self) -> StorageResult<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.client.clone().shutdown().await;
        info!("MongoDB client shut down");
        Ok(())
    }
}
