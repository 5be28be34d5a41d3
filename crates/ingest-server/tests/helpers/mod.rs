//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use ingest_common::types::{IngestedPost, IngestionStatus, PLACEHOLDER_API_SOURCE};
use ingest_server::{
    api::{create_router, AppState},
    config::CorsConfig,
    storage::{config::StorageKind, MemoryStorage, Storage, StorageError, StorageResult},
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt; // for `oneshot`

pub fn sample_post(id: i64) -> IngestedPost {
    IngestedPost {
        owner_id: (id % 3) + 1,
        id,
        title: format!("Title {id}"),
        body: format!("Body {id}"),
        ingested_at: Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap(),
        source: PLACEHOLDER_API_SOURCE.to_string(),
    }
}

/// Memory backend holding posts `1..=count`
pub async fn seeded_storage(count: i64) -> Arc<MemoryStorage> {
    let storage = Arc::new(MemoryStorage::new());
    let posts: Vec<_> = (1..=count).map(sample_post).collect();
    storage.store_posts(&posts).await.unwrap();
    storage
}

pub fn test_app(storage: Arc<dyn Storage>) -> Router {
    let cors = CorsConfig {
        allowed_origins: vec!["*".to_string()],
        allow_credentials: false,
    };
    create_router(AppState::new(storage), &cors)
}

/// Issue a GET and decode the JSON body
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// Backend where every operation fails
pub struct BrokenStorage;

#[async_trait]
impl Storage for BrokenStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Memory
    }

    async fn store_posts(&self, _posts: &[IngestedPost]) -> StorageResult<()> {
        Err(StorageError::Dynamo("connection refused".to_string()))
    }

    async fn get_posts(&self, _limit: usize, _offset: usize) -> StorageResult<Vec<IngestedPost>> {
        Err(StorageError::Dynamo("connection refused".to_string()))
    }

    async fn get_post_by_id(&self, _id: i64) -> StorageResult<Option<IngestedPost>> {
        Err(StorageError::Dynamo("connection refused".to_string()))
    }

    async fn update_ingestion_status(&self, _status: &IngestionStatus) -> StorageResult<()> {
        Err(StorageError::Dynamo("connection refused".to_string()))
    }

    async fn get_ingestion_status(&self) -> StorageResult<IngestionStatus> {
        Err(StorageError::Dynamo("connection refused".to_string()))
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}
