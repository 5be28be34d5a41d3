//! Periodic ingestion loop

use chrono::Utc;
use ingest_common::types::IngestionStatus;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use super::config::IngestionConfig;
use super::fetcher::{FetchError, PostFetcher};
use super::transform::transform;
use crate::storage::{Storage, StorageError};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to fetch posts: {0}")]
    Fetch(#[source] FetchError),

    #[error("failed to store posts: {0}")]
    Store(#[source] StorageError),

    #[error("initial ingestion failed: {0}")]
    Initial(#[source] Box<IngestError>),

    #[error("ingestion cancelled")]
    Cancelled,
}

impl IngestError {
    pub fn is_cancelled(&self) -> bool {
        match self {
            IngestError::Cancelled => true,
            IngestError::Initial(inner) => inner.is_cancelled(),
            _ => false,
        }
    }
}

impl From<FetchError> for IngestError {
    fn from(err: FetchError) -> Self {
        match err {
            FetchError::Cancelled => IngestError::Cancelled,
            other => IngestError::Fetch(other),
        }
    }
}

/// Lifecycle of an [`Ingestor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestorState {
    Idle,
    Running,
    Waiting,
    Stopped,
}

/// Drives fetch, transform, and store: one cycle immediately, then one per
/// interval until cancelled. Never runs two cycles at once.
pub struct Ingestor {
    fetcher: PostFetcher,
    storage: Arc<dyn Storage>,
    interval: Duration,
    state: watch::Sender<IngestorState>,
}

impl Ingestor {
    pub fn new(fetcher: PostFetcher, storage: Arc<dyn Storage>, interval: Duration) -> Self {
        let (state, _) = watch::channel(IngestorState::Idle);
        Self {
            fetcher,
            storage,
            interval,
            state,
        }
    }

    pub fn from_config(
        config: &IngestionConfig,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, FetchError> {
        Ok(Self::new(PostFetcher::new(config)?, storage, config.interval))
    }

    pub fn subscribe(&self) -> watch::Receiver<IngestorState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> IngestorState {
        *self.state.borrow()
    }

    fn set_state(&self, state: IngestorState) {
        self.state.send_replace(state);
    }

    /// Run until `cancel` fires.
    ///
    /// A failed first cycle is returned as [`IngestError::Initial`] without
    /// entering the periodic loop. Later cycle failures are logged and the
    /// loop keeps going. Cancellation yields [`IngestError::Cancelled`].
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), IngestError> {
        info!(
            endpoint = %self.fetcher.endpoint(),
            interval_secs = self.interval.as_secs_f64(),
            backend = %self.storage.kind(),
            "Starting ingestor"
        );

        let mut status = self.load_status().await;

        if let Err(err) = self.run_cycle(&cancel, &mut status).await {
            self.set_state(IngestorState::Stopped);
            if err.is_cancelled() {
                return Err(err);
            }
            return Err(IngestError::Initial(Box::new(err)));
        }

        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            self.set_state(IngestorState::Waiting);

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Ingestor stopping");
                    self.set_state(IngestorState::Stopped);
                    return Err(IngestError::Cancelled);
                }
                _ = ticker.tick() => {
                    match self.run_cycle(&cancel, &mut status).await {
                        Ok(_) => {},
                        Err(IngestError::Cancelled) => {
                            info!("Ingestor stopping mid-cycle");
                            self.set_state(IngestorState::Stopped);
                            return Err(IngestError::Cancelled);
                        },
                        Err(err) => error!(error = %err, "Ingestion cycle failed"),
                    }
                }
            }
        }
    }

    /// One fetch, transform, store pass, bracketed by status writes
    #[instrument(skip_all)]
    async fn run_cycle(
        &self,
        cancel: &CancellationToken,
        status: &mut IngestionStatus,
    ) -> Result<usize, IngestError> {
        self.set_state(IngestorState::Running);
        let attempt_at = Utc::now();
        self.record_status(&IngestionStatus::running(status, attempt_at))
            .await;

        let result = self.ingest(cancel).await;

        *status = match &result {
            Ok(count) => {
                info!(records = count, "Ingestion cycle completed");
                IngestionStatus::succeeded(attempt_at, Utc::now(), *count as i64)
            },
            Err(err) => IngestionStatus::failed(status, attempt_at, err.to_string()),
        };
        self.record_status(status).await;

        result
    }

    async fn ingest(&self, cancel: &CancellationToken) -> Result<usize, IngestError> {
        let posts = self.fetcher.fetch(cancel).await?;
        let posts = transform(posts);

        tokio::select! {
            _ = cancel.cancelled() => Err(IngestError::Cancelled),
            stored = self.storage.store_posts(&posts) => {
                stored.map_err(IngestError::Store)?;
                Ok(posts.len())
            }
        }
    }

    async fn load_status(&self) -> IngestionStatus {
        match self.storage.get_ingestion_status().await {
            Ok(status) => status,
            Err(err) => {
                warn!(error = %err, "Could not load previous ingestion status");
                IngestionStatus::default()
            },
        }
    }

    async fn record_status(&self, status: &IngestionStatus) {
        if let Err(err) = self.storage.update_ingestion_status(status).await {
            warn!(error = %err, status = %status.status, "Failed to record ingestion status");
        }
    }
}
