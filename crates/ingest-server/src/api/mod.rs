//! REST API over stored posts and ingestion status

pub mod handlers;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::config::CorsConfig;
use crate::middleware;
use crate::storage::Storage;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<dyn Storage>,
}

impl AppState {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }
}

/// Build the router with all routes and middleware
pub fn create_router(state: AppState, cors: &CorsConfig) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/posts", get(handlers::list_posts))
        .route("/posts/", get(handlers::missing_post_id))
        .route("/posts/:id", get(handlers::get_post))
        .route("/status", get(handlers::ingestion_status))
        .with_state(state)
        // Apply layers from innermost to outermost
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(cors))
}
