use axum::{
    Json,
    extract::{Query, State},
};
use serde::Deserialize;

use super::ApiError;
use crate::{
    AppState,
    observability::metrics,
    retention::{SweepOptions, SweepReport},
};

#[derive(Debug, Default, Deserialize)]
pub struct SweepParams {
    /// Count instead of delete. Defaults to `retention.dry_run`.
    pub dry_run: Option<bool>,
    /// Explicit cutoff in epoch seconds. Only narrows the sweep: anything
    /// later than `now - retention_period` is clamped to it.
    pub cutoff: Option<f64>,
}

/// Run a retention sweep and wait for it to finish.
///
/// Runs regardless of `retention.enabled`, which only controls the schedule.
/// Responds 500 if any listing, query or commit fails; pages committed before
/// the failure stay deleted.
#[tracing::instrument(name = "admin.retention.sweep", skip(state))]
pub async fn run_sweep(
    State(state): State<AppState>,
    Query(params): Query<SweepParams>,
) -> Result<Json<SweepReport>, ApiError> {
    if let Some(cutoff) = params.cutoff
        && !cutoff.is_finite()
    {
        return Err(ApiError::BadRequest("cutoff must be a finite number".into()));
    }

    let start = std::time::Instant::now();
    let result = state
        .sweeper
        .run_with(SweepOptions {
            cutoff: params.cutoff,
            dry_run: params.dry_run,
        })
        .await;
    let elapsed = start.elapsed().as_secs_f64();

    match result {
        Ok(report) => {
            metrics::record_retention_sweep(report.status(), elapsed);
            Ok(Json(report))
        }
        Err(e) => {
            metrics::record_retention_sweep("error", elapsed);
            Err(e.into())
        }
    }
}
