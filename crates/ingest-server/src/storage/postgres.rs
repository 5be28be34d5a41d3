//! PostgreSQL backend

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ingest_common::types::{IngestedPost, IngestionStatus};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::config::{StorageConfig, StorageKind};
use super::{Storage, StorageError, StorageResult};

const STATUS_ROW_ID: i16 = 1;

#[derive(Debug, sqlx::FromRow)]
struct PostRow {
    id: i64,
    user_id: i64,
    title: String,
    body: String,
    ingested_at: DateTime<Utc>,
    source: String,
}

impl From<PostRow> for IngestedPost {
    fn from(row: PostRow) -> Self {
        Self {
            owner_id: row.user_id,
            id: row.id,
            title: row.title,
            body: row.body,
            ingested_at: row.ingested_at,
            source: row.source,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct StatusRow {
    last_successful_run: Option<DateTime<Utc>>,
    last_attempt: Option<DateTime<Utc>>,
    status: String,
    error_message: Option<String>,
    records_ingested: i64,
}

impl TryFrom<StatusRow> for IngestionStatus {
    type Error = StorageError;

    fn try_from(row: StatusRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse()
            .map_err(|e: ingest_common::CommonError| StorageError::InvalidRecord(e.to_string()))?;

        Ok(Self {
            last_successful_run: row.last_successful_run,
            last_attempt: row.last_attempt,
            status,
            error_message: row.error_message,
            records_ingested: row.records_ingested,
        })
    }
}

pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Open a pool against `POSTGRES_URI` and apply pending migrations
    pub async fn connect(config: &StorageConfig) -> StorageResult<Self> {
        let uri = config.postgres_uri.as_deref().ok_or_else(|| {
            StorageError::Config("POSTGRES_URI must be set for the postgresql backend".to_string())
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(config.postgres_max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(uri)
            .await?;

        sqlx::migrate!("../../migrations").run(&pool).await?;
        info!("PostgreSQL migrations completed");

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.pool.is_closed() {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Postgres
    }

    #[instrument(skip(self, posts), fields(count = posts.len()))]
    async fn store_posts(&self, posts: &[IngestedPost]) -> StorageResult<()> {
        self.ensure_open()?;
        let mut tx = self.pool.begin().await?;

        for post in posts {
            sqlx::query(
                r#"
                INSERT INTO posts (id, user_id, title, body, ingested_at, source)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (id) DO UPDATE SET
                    user_id = EXCLUDED.user_id,
                    title = EXCLUDED.title,
                    body = EXCLUDED.body,
                    ingested_at = EXCLUDED.ingested_at,
                    source = EXCLUDED.source
                "#,
            )
            .bind(post.id)
            .bind(post.owner_id)
            .bind(&post.title)
            .bind(&post.body)
            .bind(post.ingested_at)
            .bind(&post.source)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!("Stored posts in PostgreSQL");
        Ok(())
    }

    async fn get_posts(&self, limit: usize, offset: usize) -> StorageResult<Vec<IngestedPost>> {
        self.ensure_open()?;
        let rows = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, user_id, title, body, ingested_at, source
            FROM posts
            ORDER BY id
            LIMIT $1 OFFSET $2
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .bind(i64::try_from(offset).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(IngestedPost::from).collect())
    }

    async fn get_post_by_id(&self, id: i64) -> StorageResult<Option<IngestedPost>> {
        self.ensure_open()?;
        let row = sqlx::query_as::<_, PostRow>(
            r#"
            SELECT id, user_id, title, body, ingested_at, source
            FROM posts
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(IngestedPost::from))
    }

    async fn update_ingestion_status(&self, status: &IngestionStatus) -> StorageResult<()> {
        self.ensure_open()?;
        sqlx::query(
            r#"
            INSERT INTO ingestion_status
                (id, last_successful_run, last_attempt, status, error_message, records_ingested)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE SET
                last_successful_run = EXCLUDED.last_successful_run,
                last_attempt = EXCLUDED.last_attempt,
                status = EXCLUDED.status,
                error_message = EXCLUDED.error_message,
                records_ingested = EXCLUDED.records_ingested
            "#,
        )
        .bind(STATUS_ROW_ID)
        .bind(status.last_successful_run)
        .bind(status.last_attempt)
        .bind(status.status.as_str())
        .bind(status.error_message.as_deref())
        .bind(status.records_ingested)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_ingestion_status(&self) -> StorageResult<IngestionStatus> {
        self.ensure_open()?;
        let row = sqlx::query_as::<_, StatusRow>(
            r#"
            SELECT last_successful_run, last_attempt, status, error_message, records_ingested
            FROM ingestion_status
            WHERE id = $1
            "#,
        )
        .bind(STATUS_ROW_ID)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Ok(IngestionStatus::default()),
        }
    }

    async fn close(&self) -> StorageResult<()> {
        self.pool.close().await;
        info!("PostgreSQL pool closed");
        Ok(())
    }
}
