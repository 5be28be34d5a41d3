//! In-process backend used for local runs and tests

use async_trait::async_trait;
use ingest_common::types::{IngestedPost, IngestionStatus};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use super::config::StorageKind;
use super::{Storage, StorageError, StorageResult};

#[derive(Debug, Default)]
pub struct MemoryStorage {
    posts: RwLock<BTreeMap<i64, IngestedPost>>,
    status: RwLock<Option<IngestionStatus>>,
    closed: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::Memory
    }

    async fn store_posts(&self, posts: &[IngestedPost]) -> StorageResult<()> {
        self.ensure_open()?;
        let mut stored = self.posts.write().await;
        for post in posts {
            stored.insert(post.id, post.clone());
        }
        Ok(())
    }

    async fn get_posts(&self, limit: usize, offset: usize) -> StorageResult<Vec<IngestedPost>> {
        self.ensure_open()?;
        let stored = self.posts.read().await;
        Ok(stored.values().skip(offset).take(limit).cloned().collect())
    }

    async fn get_post_by_id(&self, id: i64) -> StorageResult<Option<IngestedPost>> {
        self.ensure_open()?;
        Ok(self.posts.read().await.get(&id).cloned())
    }

    async fn update_ingestion_status(&self, status: &IngestionStatus) -> StorageResult<()> {
        self.ensure_open()?;
        *self.status.write().await = Some(status.clone());
        Ok(())
    }

    async fn get_ingestion_status(&self) -> StorageResult<IngestionStatus> {
        self.ensure_open()?;
        Ok(self.status.read().await.clone().unwrap_or_default())
    }

    async fn close(&self) -> StorageResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ingest_common::types::{RunStatus, PLACEHOLDER_API_SOURCE};

    fn post(id: i64, title: &str) -> IngestedPost {
        IngestedPost {
            owner_id: 1,
            id,
            title: title.to_string(),
            body: format!("body {id}"),
            ingested_at: Utc::now(),
            source: PLACEHOLDER_API_SOURCE.to_string(),
        }
    }

    #[tokio::test]
    async fn test_store_upserts_by_id() {
        let storage = MemoryStorage::new();
        storage.store_posts(&[post(1, "first"), post(2, "second")]).await.unwrap();
        storage.store_posts(&[post(1, "replaced")]).await.unwrap();

        let all = storage.get_posts(10, 0).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(storage.get_post_by_id(1).await.unwrap().unwrap().title, "replaced");
    }

    #[tokio::test]
    async fn test_pagination_orders_by_id() {
        let storage = MemoryStorage::new();
        let posts: Vec<_> = (1..=5).rev().map(|id| post(id, "t")).collect();
        storage.store_posts(&posts).await.unwrap();

        let page: Vec<i64> = storage
            .get_posts(2, 1)
            .await
            .unwrap()
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(page, vec![2, 3]);

        assert!(storage.get_posts(10, 10).await.unwrap().is_empty());
        assert!(storage.get_posts(0, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_post_is_none() {
        let storage = MemoryStorage::new();
        assert!(storage.get_post_by_id(42).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_status_replaces_singleton() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.get_ingestion_status().await.unwrap().status, RunStatus::NeverRun);

        let now = Utc::now();
        storage
            .update_ingestion_status(&IngestionStatus::succeeded(now, now, 3))
            .await
            .unwrap();
        let status = storage.get_ingestion_status().await.unwrap();
        assert_eq!(status.status, RunStatus::Success);
        assert_eq!(status.records_ingested, 3);
    }

    #[tokio::test]
    async fn test_closed_storage_rejects_calls() {
        let storage = MemoryStorage::new();
        storage.close().await.unwrap();
        storage.close().await.unwrap();
        assert!(matches!(storage.get_posts(1, 0).await, Err(StorageError::Closed)));
    }
}
