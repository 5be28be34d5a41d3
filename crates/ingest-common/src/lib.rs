//! Ingestion Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, utilities, and error handling for the ingestion workspace.
//!
//! # Overview
//!
//! - **Error Handling**: Common error type and result alias
//! - **Durations**: Parsing of duration strings such as `5m` or `1h30m`
//! - **Logging**: Centralized `tracing` subscriber setup
//! - **Types**: Post records and the ingestion status record
//!
//! # Example
//!
//! ```no_run
//! use ingest_common::duration::parse_duration;
//!
//! fn interval() -> ingest_common::Result<std::time::Duration> {
//!     parse_duration("5m")
//! }
//! ```

pub mod duration;
pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{CommonError, Result};
