//! Data ingestion
//!
//! - **config**: `API_ENDPOINT`, `INGESTION_INTERVAL`, `API_TIMEOUT`, `RETRY_COUNT`
//! - **fetcher**: HTTP client with linear-backoff retries
//! - **transform**: attaches ingestion time and source tag
//! - **service**: the periodic [`Ingestor`] loop

pub mod config;
pub mod fetcher;
pub mod service;
pub mod transform;

pub use config::IngestionConfig;
pub use fetcher::{retry_with_backoff, FetchError, PostFetcher, RetryPolicy};
pub use service::{IngestError, Ingestor, IngestorState};
pub use transform::{transform, transform_at};
