//! Ingestion Server Library
//!
//! Periodically pulls posts from a remote HTTP API, stamps them with
//! ingestion metadata, stores them in a configurable backend, and serves the
//! stored data through a small read-only REST API.
//!
//! # Overview
//!
//! - **Ingestion**: fetch with linear-backoff retries, transform, store; one
//!   immediate cycle then one per `INGESTION_INTERVAL`
//! - **Storage**: one [`storage::Storage`] trait with DynamoDB, MongoDB,
//!   PostgreSQL, and in-memory implementations selected by `STORAGE_TYPE`
//! - **API Endpoints**: `/health`, `/posts`, `/posts/:id`, `/status`
//! - **Configuration**: environment-based, optionally seeded from `.env`
//! - **Middleware**: CORS and request tracing
//!
//! # Example
//!
//! ```no_run
//! use ingest_server::{app, config::Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     dotenvy::dotenv().ok();
//!     let config = Config::load()?;
//!     app::run(config).await
//! }
//! ```

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod ingest;
pub mod middleware;
pub mod storage;

// Re-export commonly used types
pub use error::AppError;
pub use storage::{Storage, StorageError};
