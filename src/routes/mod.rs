pub mod error;
pub mod generate;
pub mod health;
pub mod ingest;
pub mod retention;

use axum::{Router, routing::post};

pub use error::{ApiError, ErrorInfo, ErrorResponse};

use crate::AppState;

/// Operator endpoints, mounted under `/admin/v1`.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/retention/sweep", post(retention::run_sweep))
        .route("/telemetry/generate", post(generate::generate_telemetry))
}
