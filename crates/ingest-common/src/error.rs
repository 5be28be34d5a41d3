//! Error types shared across the ingestion workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Main error type for the common crate
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Invalid duration '{0}'")]
    InvalidDuration(String),

    #[error("Invalid ingestion status: {0}")]
    InvalidStatus(String),
}
