//! DynamoDB backend
//!
//! Posts are items keyed by numeric `id` in `TABLE_NAME`; the status record
//! is the item `id = "ingestion_status"` in `<TABLE_NAME>_status`. Both tables
//! are created on connect when missing (on-demand billing).

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_dynamodb::{
    error::DisplayErrorContext,
    types::{
        AttributeDefinition, AttributeValue, BillingMode, KeySchemaElement, KeyType,
        ScalarAttributeType, TableStatus,
    },
    Client,
};
use chrono::{DateTime, Utc};
use ingest_common::types::{IngestedPost, IngestionStatus};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::config::{StorageConfig, StorageKind};
use super::{Storage, StorageError, StorageResult};

const STATUS_ITEM_ID: &str = "ingestion_status";
const TABLE_READY_POLL: Duration = Duration::from_secs(1);
const TABLE_READY_ATTEMPTS: u32 = 60;

type Item = HashMap<String, AttributeValue>;

fn dynamo_err<E: std::error::Error + 'static>(err: E) -> StorageError {
    StorageError::Dynamo(DisplayErrorContext(&err).to_string())
}

pub struct DynamoStorage {
    client: Client,
    table_name: String,
    status_table_name: String,
    closed: AtomicBool,
}

impl DynamoStorage {
    pub async fn connect(config: &StorageConfig) -> StorageResult<Self> {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .load()
            .await;

        let mut builder = aws_sdk_dynamodb::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.dynamodb_endpoint {
            builder = builder.endpoint_url(endpoint);
        }
        let client = Client::from_conf(builder.build());

        let storage = Self {
            client,
            table_name: config.table_name.clone(),
            status_table_name: config.status_table_name(),
            closed: AtomicBool::new(false),
        };

        storage
            .ensure_table(&storage.table_name, ScalarAttributeType::N)
            .await?;
        storage
            .ensure_table(&storage.status_table_name, ScalarAttributeType::S)
            .await?;

        info!(
            region = %config.region,
            table = %storage.table_name,
            "Connected to DynamoDB"
        );

        Ok(storage)
    }

    /// Create `table` with hash key `id` unless it already exists, then wait
    /// for it to become active
    async fn ensure_table(&self, table: &str, key_type: ScalarAttributeType) -> StorageResult<()> {
        match self.client.describe_table().table_name(table).send().await {
            Ok(_) => return self.wait_until_active(table).await,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) => {},
            Err(err) => return Err(dynamo_err(err)),
        }

        info!(table, "Creating DynamoDB table");
        self.client
            .create_table()
            .table_name(table)
            .key_schema(
                KeySchemaElement::builder()
                    .attribute_name("id")
                    .key_type(KeyType::Hash)
                    .build()
                    .map_err(dynamo_err)?,
            )
            .attribute_definitions(
                AttributeDefinition::builder()
                    .attribute_name("id")
                    .attribute_type(key_type)
                    .build()
                    .map_err(dynamo_err)?,
            )
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await
            .map_err(dynamo_err)?;

        self.wait_until_active(table).await
    }

    async fn wait_until_active(&self, table: &str) -> StorageResult<()> {
        for _ in 0..TABLE_READY_ATTEMPTS {
            let output = self
                .client
                .describe_table()
                .table_name(table)
                .send()
                .await
                .map_err(dynamo_err)?;

            if output.table().and_then(|t| t.table_status()) == Some(&TableStatus::Active) {
                return Ok(());
            }
            debug!(table, "Waiting for DynamoDB table to become active");
            tokio::time::sleep(TABLE_READY_POLL).await;
        }

        Err(StorageError::Dynamo(format!(
            "table {table} did not become active"
        )))
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for DynamoStorage {
    fn kind(&self) -> StorageKind {
        StorageKind::DynamoDb
    }

    #[instrument(skip(self, posts), fields(count = posts.len()))]
    async fn store_posts(&self, posts: &[IngestedPost]) -> StorageResult<()> {
        self.ensure_open()?;
        for post in posts {
            self.client
                .put_item()
                .table_name(&self.table_name)
                .set_item(Some(post_to_item(post)))
                .send()
                .await
                .map_err(dynamo_err)?;
        }
        debug!("Stored posts in DynamoDB");
        Ok(())
    }

    async fn get_posts(&self, limit: usize, offset: usize) -> StorageResult<Vec<IngestedPost>> {
        self.ensure_open()?;
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut posts = Vec::with_capacity(limit.min(100));
        let mut skipped = 0usize;
        let mut start_key: Option<Item> = None;

        loop {
            let output = self
                .client
                .scan()
                .table_name(&self.table_name)
                .set_exclusive_start_key(start_key.take())
                .send()
                .await
                .map_err(dynamo_err)?;

            for item in output.items() {
                if skipped < offset {
                    skipped += 1;
                    continue;
                }
                posts.push(item_to_post(item)?);
                if posts.len() == limit {
                    return Ok(posts);
                }
            }

            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => return Ok(posts),
            }
        }
    }

    async fn get_post_by_id(&self, id: i64) -> StorageResult<Option<IngestedPost>> {
        self.ensure_open()?;
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key("id", AttributeValue::N(id.to_string()))
            .send()
            .await
            .map_err(dynamo_err)?;

        output.item().map(item_to_post).transpose()
    }

    async fn update_ingestion_status(&self, status: &IngestionStatus) -> StorageResult<()> {
        self.ensure_open()?;
        self.client
            .put_item()
            .table_name(&self.status_table_name)
            .set_item(Some(status_to_item(status)))
            .send()
            .await
            .map_err(dynamo_err)?;
        Ok(())
    }

    async fn get_ingestion_status(&self) -> StorageResult<IngestionStatus> {
        self.ensure_open()?;
        let output = self
            .client
            .get_item()
            .table_name(&self.status_table_name)
            .key("id", AttributeValue::S(STATUS_ITEM_ID.to_string()))
            .send()
            .await
            .map_err(dynamo_err)?;

        match output.item() {
            Some(item) => item_to_status(item),
            None => Ok(IngestionStatus::default()),
        }
    }

    async fn close(&self) -> StorageResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

// ============================================================================
// Item marshalling
// ============================================================================

fn post_to_item(post: &IngestedPost) -> Item {
    HashMap::from([
        ("id".to_string(), AttributeValue::N(post.id.to_string())),
        ("userId".to_string(), AttributeValue::N(post.owner_id.to_string())),
        ("title".to_string(), AttributeValue::S(post.title.clone())),
        ("body".to_string(), AttributeValue::S(post.body.clone())),
        (
            "ingested_at".to_string(),
            AttributeValue::S(post.ingested_at.to_rfc3339()),
        ),
        ("source".to_string(), AttributeValue::S(post.source.clone())),
    ])
}

fn item_to_post(item: &Item) -> StorageResult<IngestedPost> {
    Ok(IngestedPost {
        owner_id: number(item, "userId")?,
        id: number(item, "id")?,
        title: string(item, "title")?,
        body: string(item, "body")?,
        ingested_at: timestamp(item, "ingested_at")?,
        source: string(item, "source")?,
    })
}

fn status_to_item(status: &IngestionStatus) -> Item {
    let mut item = HashMap::from([
        ("id".to_string(), AttributeValue::S(STATUS_ITEM_ID.to_string())),
        (
            "status".to_string(),
            AttributeValue::S(status.status.as_str().to_string()),
        ),
        (
            "records_ingested".to_string(),
            AttributeValue::N(status.records_ingested.to_string()),
        ),
    ]);
    if let Some(at) = status.last_successful_run {
        item.insert("last_successful_run".to_string(), AttributeValue::S(at.to_rfc3339()));
    }
    if let Some(at) = status.last_attempt {
        item.insert("last_attempt".to_string(), AttributeValue::S(at.to_rfc3339()));
    }
    if let Some(message) = &status.error_message {
        item.insert("error_message".to_string(), AttributeValue::S(message.clone()));
    }
    item
}

fn item_to_status(item: &Item) -> StorageResult<IngestionStatus> {
    let status = string(item, "status")?
        .parse()
        .map_err(|e: ingest_common::CommonError| StorageError::InvalidRecord(e.to_string()))?;

    Ok(IngestionStatus {
        last_successful_run: optional(item, "last_successful_run", timestamp)?,
        last_attempt: optional(item, "last_attempt", timestamp)?,
        status,
        error_message: optional(item, "error_message", string)?,
        records_ingested: optional(item, "records_ingested", number)?.unwrap_or(0),
    })
}

fn attribute<'a>(item: &'a Item, name: &str) -> StorageResult<&'a AttributeValue> {
    item.get(name)
        .ok_or_else(|| StorageError::InvalidRecord(format!("missing attribute '{name}'")))
}

fn number(item: &Item, name: &str) -> StorageResult<i64> {
    let raw = attribute(item, name)?
        .as_n()
        .map_err(|_| StorageError::InvalidRecord(format!("attribute '{name}' is not a number")))?;
    raw.parse()
        .map_err(|_| StorageError::InvalidRecord(format!("attribute '{name}' is not an integer")))
}

fn string(item: &Item, name: &str) -> StorageResult<String> {
    attribute(item, name)?
        .as_s()
        .cloned()
        .map_err(|_| StorageError::InvalidRecord(format!("attribute '{name}' is not a string")))
}

fn timestamp(item: &Item, name: &str) -> StorageResult<DateTime<Utc>> {
    let raw = string(item, name)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidRecord(format!("attribute '{name}': {e}")))
}

fn optional<T>(
    item: &Item,
    name: &str,
    read: fn(&Item, &str) -> StorageResult<T>,
) -> StorageResult<Option<T>> {
    if item.contains_key(name) {
        read(item, name).map(Some)
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use ingest_common::types::{RunStatus, PLACEHOLDER_API_SOURCE};

    #[test]
    fn test_post_item_uses_wire_attribute_names() {
        let post = IngestedPost {
            owner_id: 4,
            id: 12,
            title: "title".to_string(),
            body: "body".to_string(),
            ingested_at: Utc.with_ymd_and_hms(2024, 3, 1, 8, 30, 0).unwrap(),
            source: PLACEHOLDER_API_SOURCE.to_string(),
        };
        let item = post_to_item(&post);

        assert_eq!(item["id"], AttributeValue::N("12".to_string()));
        assert_eq!(item["userId"], AttributeValue::N("4".to_string()));
        assert_eq!(item_to_post(&item).unwrap(), post);
    }

    #[test]
    fn test_status_item_omits_unset_fields() {
        let item = status_to_item(&IngestionStatus::default());
        assert!(!item.contains_key("error_message"));
        assert!(!item.contains_key("last_attempt"));

        let status = item_to_status(&item).unwrap();
        assert_eq!(status.status, RunStatus::NeverRun);
        assert!(status.last_successful_run.is_none());
    }

    #[test]
    fn test_malformed_item_is_invalid_record() {
        let mut item = post_to_item(&IngestedPost {
            owner_id: 1,
            id: 1,
            title: String::new(),
            body: String::new(),
            ingested_at: Utc::now(),
            source: PLACEHOLDER_API_SOURCE.to_string(),
        });
        item.insert("id".to_string(), AttributeValue::S("one".to_string()));
        assert!(matches!(item_to_post(&item), Err(StorageError::InvalidRecord(_))));

        item.remove("title");
        assert!(matches!(item_to_post(&item), Err(StorageError::InvalidRecord(_))));
    }

    #[tokio::test]
    #[ignore] // Requires DynamoDB Local on DYNAMODB_ENDPOINT
    async fn test_store_and_read_back() {
        let config = StorageConfig {
            dynamodb_endpoint: Some(
                std::env::var("DYNAMODB_ENDPOINT")
                    .unwrap_or_else(|_| "http://localhost:8000".to_string()),
            ),
            table_name: "ingested_data_test".to_string(),
            ..StorageConfig::default()
        };
        let storage = DynamoStorage::connect(&config).await.unwrap();

        let now = Utc::now();
        let post = IngestedPost {
            owner_id: 1,
            id: 1,
            title: "t".to_string(),
            body: "b".to_string(),
            ingested_at: now,
            source: PLACEHOLDER_API_SOURCE.to_string(),
        };
        storage.store_posts(&[post]).await.unwrap();
        assert!(storage.get_post_by_id(1).await.unwrap().is_some());
        assert_eq!(storage.get_posts(1, 0).await.unwrap().len(), 1);
        assert!(storage.get_posts(0, 0).await.unwrap().is_empty());

        storage
            .update_ingestion_status(&IngestionStatus::succeeded(now, now, 1))
            .await
            .unwrap();
        assert_eq!(
            storage.get_ingestion_status().await.unwrap().status,
            RunStatus::Success
        );
    }
}
