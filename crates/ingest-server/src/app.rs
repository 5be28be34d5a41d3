//! Process supervisor
//!
//! Runs the API server and the [`Ingestor`] side by side and shuts them down
//! in order: cancel the run token, drain the server, wait for the ingestor,
//! then close storage. Each wait is bounded by `SHUTDOWN_TIMEOUT`.

use anyhow::{anyhow, Context, Result};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::api::{self, AppState};
use crate::config::Config;
use crate::ingest::{IngestError, Ingestor};
use crate::storage::{self, Storage};

/// Connect storage and run until a shutdown signal or a fatal error
pub async fn run(config: Config) -> Result<()> {
    let storage = storage::connect(&config.storage)
        .await
        .context("failed to initialize storage")?;

    run_with_storage(config, storage, shutdown_signal()).await
}

/// Run the service over an already connected backend until `shutdown`
/// resolves, the ingestor fails its first cycle, or the server stops.
pub async fn run_with_storage<F>(
    config: Config,
    storage: Arc<dyn Storage>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()> + Send,
{
    let cancel = CancellationToken::new();
    let grace = config.server.shutdown_timeout;

    let (listener, ingestor) = match prepare(&config, storage.clone()).await {
        Ok(parts) => parts,
        Err(e) => {
            error!("Startup failed: {:#}", e);
            close_storage(storage.as_ref(), grace).await;
            return Err(e);
        },
    };

    let mut ingest_task: JoinHandle<Result<(), IngestError>> = tokio::spawn({
        let cancel = cancel.clone();
        async move { ingestor.start(cancel).await }
    });

    let app = api::create_router(AppState::new(storage.clone()), &config.cors);
    let mut server_task: JoinHandle<std::io::Result<()>> = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(cancel.cancelled_owned())
                .await
        }
    });

    let mut server_done = false;
    let mut ingest_done = false;

    let mut outcome = tokio::select! {
        _ = shutdown => {
            info!("Starting graceful shutdown");
            Ok(())
        }
        joined = &mut ingest_task => {
            ingest_done = true;
            ingest_outcome(joined)
        }
        joined = &mut server_task => {
            server_done = true;
            server_outcome(joined)
        }
    };

    cancel.cancel();

    if !server_done {
        info!("Waiting up to {:?} for in-flight requests", grace);
        match tokio::time::timeout(grace, &mut server_task).await {
            Ok(joined) => outcome = outcome.and(server_outcome(joined)),
            Err(_) => {
                warn!("Server did not drain within {:?}, aborting", grace);
                server_task.abort();
            },
        }
    }

    if !ingest_done {
        match tokio::time::timeout(grace, &mut ingest_task).await {
            Ok(joined) => outcome = outcome.and(ingest_outcome(joined)),
            Err(_) => {
                warn!("Ingestor did not stop within {:?}, aborting", grace);
                ingest_task.abort();
            },
        }
    }

    close_storage(storage.as_ref(), grace).await;

    match &outcome {
        Ok(()) => info!("Shutdown complete"),
        Err(e) => error!("Shutdown after failure: {:#}", e),
    }
    outcome
}

/// Bind the listener and build the ingestor; nothing is spawned yet
async fn prepare(
    config: &Config,
    storage: Arc<dyn Storage>,
) -> Result<(tokio::net::TcpListener, Ingestor)> {
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| format!("invalid listen address {}", config.server.host))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!("Server listening on {}", listener.local_addr()?);

    let ingestor = Ingestor::from_config(&config.ingestion, storage)?;
    Ok((listener, ingestor))
}

fn ingest_outcome(joined: Result<Result<(), IngestError>, JoinError>) -> Result<()> {
    match joined {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) if e.is_cancelled() => Ok(()),
        Ok(Err(e)) => Err(e.into()),
        Err(e) => Err(anyhow!("ingestor task failed: {e}")),
    }
}

fn server_outcome(joined: Result<std::io::Result<()>, JoinError>) -> Result<()> {
    match joined {
        Ok(result) => result.context("server error"),
        Err(e) => Err(anyhow!("server task failed: {e}")),
    }
}

async fn close_storage(storage: &dyn Storage, grace: Duration) {
    match tokio::time::timeout(grace, storage.close()).await {
        Ok(Ok(())) => info!(backend = %storage.kind(), "Storage closed"),
        Ok(Err(e)) => warn!("Failed to close storage: {}", e),
        Err(_) => warn!("Storage did not close within {:?}", grace),
    }
}

/// Resolves on Ctrl+C or SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, StorageError};
    use url::Url;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(server: &MockServer) -> Config {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        config.server.shutdown_timeout = Duration::from_secs(2);
        config.ingestion.api_endpoint = Url::parse(&format!("{}/posts", server.uri())).unwrap();
        config.ingestion.retry_count = 1;
        config.ingestion.interval = Duration::from_secs(3600);
        config
    }

    #[tokio::test]
    async fn test_initial_failure_shuts_down_and_closes_storage() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let storage = Arc::new(MemoryStorage::new());
        let err = run_with_storage(
            test_config(&server),
            storage.clone(),
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("initial ingestion failed"));
        assert!(matches!(storage.get_posts(1, 0).await, Err(StorageError::Closed)));
    }

    #[tokio::test]
    async fn test_shutdown_signal_stops_cleanly() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
            .mount(&server)
            .await;

        let storage = Arc::new(MemoryStorage::new());
        run_with_storage(
            test_config(&server),
            storage.clone(),
            tokio::time::sleep(Duration::from_millis(200)),
        )
        .await
        .unwrap();

        assert!(matches!(storage.get_ingestion_status().await, Err(StorageError::Closed)));
    }

    #[tokio::test]
    async fn test_invalid_listen_address_closes_storage() {
        let server = MockServer::start().await;
        let mut config = test_config(&server);
        config.server.host = "not a host".to_string();

        let storage = Arc::new(MemoryStorage::new());
        let err = run_with_storage(config, storage.clone(), std::future::pending::<()>())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("invalid listen address"));
        assert!(matches!(storage.get_posts(1, 0).await, Err(StorageError::Closed)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_port_in_use_closes_storage() {
        let server = MockServer::start().await;
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let mut config = test_config(&server);
        config.server.port = taken.local_addr().unwrap().port();

        let storage = Arc::new(MemoryStorage::new());
        let err = run_with_storage(config, storage.clone(), std::future::pending::<()>())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("failed to bind"));
        assert!(matches!(storage.get_ingestion_status().await, Err(StorageError::Closed)));
    }
}
