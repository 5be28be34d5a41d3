//! Common types used across the ingestion workspace

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Source tag stamped on every ingested post.
pub const PLACEHOLDER_API_SOURCE: &str = "placeholder_api";

/// A post as returned by the remote API.
///
/// The remote API names the owner field `userId`; `ownerId` is accepted as an
/// alias when decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    #[serde(rename = "userId", alias = "ownerId")]
    pub owner_id: i64,
    pub id: i64,
    pub title: String,
    pub body: String,
}

/// A post enriched with ingestion metadata, as persisted by storage backends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestedPost {
    #[serde(rename = "userId", alias = "ownerId")]
    pub owner_id: i64,
    pub id: i64,
    pub title: String,
    pub body: String,
    pub ingested_at: DateTime<Utc>,
    pub source: String,
}

impl IngestedPost {
    /// Attach ingestion metadata to a post
    pub fn from_post(post: Post, ingested_at: DateTime<Utc>, source: impl Into<String>) -> Self {
        Self {
            owner_id: post.owner_id,
            id: post.id,
            title: post.title,
            body: post.body,
            ingested_at,
            source: source.into(),
        }
    }
}

/// Outcome of the most recent ingestion run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    NeverRun,
    Running,
    Success,
    Failure,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::NeverRun => "never_run",
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failure => "failure",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = crate::CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "never_run" => Ok(RunStatus::NeverRun),
            "running" => Ok(RunStatus::Running),
            "success" => Ok(RunStatus::Success),
            "failure" => Ok(RunStatus::Failure),
            _ => Err(crate::CommonError::InvalidStatus(s.to_string())),
        }
    }
}

/// The singleton ingestion status record.
///
/// A deployment holds exactly one of these. Backends return
/// `IngestionStatus::default()` (status `never_run`) when none has been
/// written yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct IngestionStatus {
    pub last_successful_run: Option<DateTime<Utc>>,
    pub last_attempt: Option<DateTime<Utc>>,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub records_ingested: i64,
}

impl IngestionStatus {
    /// Status marking a cycle that has just begun
    pub fn running(previous: &IngestionStatus, attempt_at: DateTime<Utc>) -> Self {
        Self {
            last_successful_run: previous.last_successful_run,
            last_attempt: Some(attempt_at),
            status: RunStatus::Running,
            error_message: None,
            records_ingested: previous.records_ingested,
        }
    }

    /// Status marking a cycle that stored `records` posts
    pub fn succeeded(attempt_at: DateTime<Utc>, finished_at: DateTime<Utc>, records: i64) -> Self {
        Self {
            last_successful_run: Some(finished_at),
            last_attempt: Some(attempt_at),
            status: RunStatus::Success,
            error_message: None,
            records_ingested: records,
        }
    }

    /// Status marking a failed cycle; the last successful run is preserved
    pub fn failed(previous: &IngestionStatus, attempt_at: DateTime<Utc>, error: String) -> Self {
        Self {
            last_successful_run: previous.last_successful_run,
            last_attempt: Some(attempt_at),
            status: RunStatus::Failure,
            error_message: Some(error),
            records_ingested: 0,
        }
    }

    pub fn is_never_run(&self) -> bool {
        self.status == RunStatus::NeverRun
    }
}
