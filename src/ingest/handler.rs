use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use validator::Validate;

use super::IngestError;
use crate::{
    db::DocumentStore,
    models::{CollectionPath, DocumentPath, TelemetryMessage, TimestampField},
    observability::metrics,
};

/// Where a message was written.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub path: DocumentPath,
    /// False when the body has no numeric `timestamp`; retention will never
    /// delete the document.
    pub prunable: bool,
}

/// Writes telemetry messages to the document store.
pub struct IngestionHandler {
    store: Arc<dyn DocumentStore>,
    topic: String,
    events_collection: String,
}

impl IngestionHandler {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        topic: impl Into<String>,
        events_collection: impl Into<String>,
    ) -> Self {
        Self {
            store,
            topic: topic.into(),
            events_collection: events_collection.into(),
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Document path for a message. Attributes are validated first, so no
    /// path is built from a message missing a required field.
    pub fn event_path(&self, message: &TelemetryMessage) -> Result<DocumentPath, IngestError> {
        let attrs = &message.attributes;
        attrs.validate()?;

        let path = CollectionPath::root(&attrs.device_registry_id)?
            .doc(&attrs.device_id)?
            .collection(&self.topic)?
            .doc(&attrs.sub_folder)?
            .collection(&self.events_collection)?
            .doc(&message.document_id())?;
        Ok(path)
    }

    /// Store one message, overwriting any event with the same id.
    pub async fn handle(&self, message: TelemetryMessage) -> Result<IngestOutcome, IngestError> {
        let path = match self.event_path(&message) {
            Ok(path) => path,
            Err(e) => {
                metrics::record_telemetry_ingested("rejected");
                tracing::warn!(
                    error = %e,
                    message_id = message.message_id.as_deref(),
                    "Rejected telemetry message"
                );
                return Err(e);
            }
        };

        let timestamp = message.timestamp();
        tracing::debug!(path = %path, payload = ?message.body, "Storing telemetry");

        if let Err(e) = self.store.set(&path, Value::Object(message.body)).await {
            metrics::record_telemetry_ingested("error");
            tracing::error!(path = %path, error = %e, "Failed to write telemetry");
            return Err(e.into());
        }

        let prunable = timestamp.is_prunable();
        match timestamp {
            TimestampField::Numeric(_) => metrics::record_telemetry_ingested("stored"),
            TimestampField::NonNumeric | TimestampField::Missing => {
                metrics::record_telemetry_ingested("stored_unprunable");
                tracing::warn!(
                    path = %path,
                    timestamp = ?timestamp,
                    "Stored telemetry without a numeric timestamp, retention will never delete it"
                );
            }
        }

        Ok(IngestOutcome { path, prunable })
    }
}
