//! Telemetry ingestion.
//!
//! Device messages arrive as Pub/Sub push requests, are validated, and are
//! written verbatim to `<registry>/<device>/<topic>/<subFolder>/events/<id>`.
//! The test-data generator writes through the same handler.

mod generator;
mod handler;
mod pubsub;

pub use generator::{GenerateSummary, TelemetryGenerator};
pub use handler::{IngestOutcome, IngestionHandler};
pub use pubsub::{PubsubMessage, PushEnvelope};

use crate::{db::DbError, models::PathError};

/// Errors raised while ingesting a telemetry message.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Invalid device attributes: {0}")]
    InvalidAttributes(#[from] validator::ValidationErrors),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Invalid document path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("Invalid generator settings: {0}")]
    InvalidGenerator(String),

    #[error("Failed to store telemetry: {0}")]
    Store(#[from] DbError),
}

impl IngestError {
    /// Whether the message itself is at fault. Redelivering it cannot succeed.
    pub fn is_invalid_message(&self) -> bool {
        !matches!(self, IngestError::Store(_))
    }
}
