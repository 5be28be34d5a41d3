//! Ingestion server - main entry point

use anyhow::Result;
use ingest_common::logging::{init_logging, LogConfig};
use tracing::info;

use ingest_server::{app, config::Config};

#[tokio::main]
async fn main() -> Result<()> {
    // Seed the environment from `.env` so LOG_* and config keys both see it
    dotenvy::dotenv().ok();

    // Defaults first; LOG_* environment variables take precedence
    let log_config = LogConfig::builder()
        .log_file_prefix("ingest-server")
        .filter_directives("ingest_server=info,tower_http=info,sqlx=warn")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    info!("Starting ingestion server");

    let config = Config::load()?;
    info!(
        backend = %config.storage.kind,
        endpoint = %config.ingestion.api_endpoint,
        "Configuration loaded - server will bind to {}:{}",
        config.server.host,
        config.server.port
    );

    app::run(config).await
}
