//! Shared helpers for router tests, plus end-to-end flows across ingestion
//! and retention.


use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    AppState, build_app,
    config::ServiceConfig,
    db::{DbError, DbResult, DocumentStore, StorePool, WriteBatch},
    models::{CollectionPath, Document, DocumentPath},
};

/// Router and state over a fresh in-memory store with default config.
pub fn test_app() -> (Router, AppState) {
    app_for(ServiceConfig::default(), StorePool::in_memory())
}

pub fn test_app_with_store(documents: Arc<dyn DocumentStore>) -> (Router, AppState) {
    app_for(ServiceConfig::default(), StorePool::from_documents(documents))
}

pub fn app_for(config: ServiceConfig, store: StorePool) -> (Router, AppState) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let state = AppState::with_store(config.clone(), store, CancellationToken::new());
    (build_app(&config, state.clone()), state)
}

/// A store whose every operation fails.
pub struct UnavailableStore;

fn unavailable() -> DbError {
    DbError::Internal("store unavailable".into())
}

#[async_trait]
impl DocumentStore for UnavailableStore {
    async fn list_collections(&self) -> DbResult<Vec<CollectionPath>> {
        Err(unavailable())
    }

    async fn list_documents(&self, _: &CollectionPath) -> DbResult<Vec<DocumentPath>> {
        Err(unavailable())
    }

    async fn set(&self, _: &DocumentPath, _: Value) -> DbResult<()> {
        Err(unavailable())
    }

    async fn get(&self, _: &DocumentPath) -> DbResult<Option<Document>> {
        Err(unavailable())
    }

    async fn query_expired(
        &self,
        _: &CollectionPath,
        _: f64,
        _: usize,
    ) -> DbResult<Vec<DocumentPath>> {
        Err(unavailable())
    }

    async fn count_expired(&self, _: &CollectionPath, _: f64) -> DbResult<u64> {
        Err(unavailable())
    }

    async fn commit(&self, _: WriteBatch) -> DbResult<usize> {
        Err(unavailable())
    }

    async fn health_check(&self) -> DbResult<()> {
        Err(unavailable())
    }
}

#[tokio::test]
async fn test_unhealthy_store_fails_readiness() {
    use axum::body::Body;
    use http::{Request, StatusCode};
    use tower::ServiceExt;

    let (app, _) = test_app_with_store(Arc::new(UnavailableStore));
    let response = app
        .oneshot(Request::get("/health/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
