use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};

use super::ApiError;
use crate::{AppState, ingest::PushEnvelope};

/// Pub/Sub push endpoint.
///
/// 204 acknowledges the message. 400 marks it as permanently invalid so the
/// subscription can dead-letter it. 500 asks for redelivery.
#[tracing::instrument(name = "ingest.pubsub", skip(state, payload))]
pub async fn pubsub_push(
    State(state): State<AppState>,
    payload: Result<Json<PushEnvelope>, JsonRejection>,
) -> Result<StatusCode, ApiError> {
    let Json(envelope) = payload.map_err(|e| ApiError::InvalidMessage(e.body_text()))?;

    if let Some(subscription) = &envelope.subscription {
        tracing::debug!(subscription = %subscription, "Received push message");
    }

    let message = envelope.into_message()?;
    state.ingestion.handle(message).await?;

    Ok(StatusCode::NO_CONTENT)
}
