//! IoT telemetry ingestion into a hierarchical document store, with a
//! batched retention sweeper that keeps the store bounded.

pub mod config;
pub mod db;
pub mod ingest;
pub mod models;
pub mod observability;
pub mod retention;
pub mod routes;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::{
    config::ServiceConfig,
    db::{DbResult, StorePool},
    ingest::IngestionHandler,
    retention::Sweeper,
};

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServiceConfig>,
    pub store: Arc<StorePool>,
    /// Shared by the scheduled worker and on-demand sweeps.
    pub sweeper: Arc<Sweeper>,
    pub ingestion: Arc<IngestionHandler>,
}

impl AppState {
    /// Open the configured store, running migrations if enabled.
    ///
    /// `cancel` stops in-flight sweeps at their next page boundary.
    pub async fn new(config: ServiceConfig, cancel: CancellationToken) -> DbResult<Self> {
        let store = StorePool::from_config(&config.store).await?;
        if config.store.run_migrations() {
            store.run_migrations().await?;
        }
        Ok(Self::with_store(config, store, cancel))
    }

    pub fn with_store(config: ServiceConfig, store: StorePool, cancel: CancellationToken) -> Self {
        let documents = store.documents();
        let sweeper = Sweeper::new(Arc::clone(&documents), config.retention.clone())
            .with_cancellation(cancel);
        let ingestion = IngestionHandler::new(
            documents,
            config.ingestion.topic.clone(),
            config.retention.layout.events_collection.clone(),
        );

        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            sweeper: Arc::new(sweeper),
            ingestion: Arc::new(ingestion),
        }
    }
}

pub fn build_app(config: &ServiceConfig, state: AppState) -> Router {
    let mut app = Router::new()
        // Health check endpoints
        .route("/health", get(routes::health::health_check))
        .route("/health/live", get(routes::health::liveness))
        .route("/health/ready", get(routes::health::readiness))
        // Pub/Sub push subscription target
        .route("/v1/ingest/pubsub", post(routes::ingest::pubsub_push))
        .nest("/admin/v1", routes::admin_routes());

    if config.observability.metrics.enabled {
        app = app.route("/metrics", get(routes::health::metrics));
    }

    app.layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.server.body_limit_bytes))
        .with_state(state)
}
