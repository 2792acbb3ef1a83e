use axum::{
    Json,
    extract::{Query, State},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::{
    AppState,
    ingest::{GenerateSummary, IngestOutcome, TelemetryGenerator},
    models::epoch_seconds,
};

#[derive(Debug, Default, Deserialize)]
pub struct GenerateParams {
    /// Write one reading from the reference device instead of a backfill.
    #[serde(default)]
    pub sample: bool,
    pub devices: Option<u32>,
    pub days: Option<u32>,
    pub readings_per_day: Option<u32>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum GenerateResponse {
    Backfill(GenerateSummary),
    Sample(IngestOutcome),
}

/// Seed the store with test telemetry.
///
/// Query parameters override `[ingestion.generator]` for this request.
#[tracing::instrument(name = "admin.telemetry.generate", skip(state))]
pub async fn generate_telemetry(
    State(state): State<AppState>,
    Query(params): Query<GenerateParams>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let mut config = state.config.ingestion.generator.clone();
    if let Some(devices) = params.devices {
        config.devices = devices;
    }
    if let Some(days) = params.days {
        config.days = days;
    }
    if let Some(readings) = params.readings_per_day {
        config.readings_per_day = readings;
    }
    let generator =
        TelemetryGenerator::new(config).map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let now = Utc::now();

    if params.sample {
        let outcome = state
            .ingestion
            .handle(generator.sample(epoch_seconds(now)))
            .await?;
        return Ok(Json(GenerateResponse::Sample(outcome)));
    }

    let summary = generator
        .run(
            &state.ingestion,
            epoch_seconds(now),
            state.sweeper.cutoff_at(now),
        )
        .await?;
    Ok(Json(GenerateResponse::Backfill(summary)))
}
