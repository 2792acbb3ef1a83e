//! Pub/Sub push subscription envelope.
//!
//! A push subscription POSTs each message as:
//!
//! ```json
//! {
//!   "message": {
//!     "attributes": {"deviceId": "re-2.0-0000002", "deviceRegistryId": "RebelEspresso", "subFolder": "telemetry"},
//!     "data": "eyJ0aW1lc3RhbXAiOjE3MDAwMDAwMDB9",
//!     "messageId": "2070443601311540",
//!     "publishTime": "2023-11-14T22:13:20Z"
//!   },
//!   "subscription": "projects/rebelthings/subscriptions/iot-events-push"
//! }
//! ```

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::IngestError;
use crate::models::{DeviceAttributes, TelemetryMessage};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEnvelope {
    pub message: PubsubMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PubsubMessage {
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    /// Base64-encoded payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publish_time: Option<DateTime<Utc>>,
}

impl PubsubMessage {
    /// Build a message carrying `message`'s attributes and JSON body.
    pub fn encode(message: &TelemetryMessage) -> Result<Self, IngestError> {
        let attributes = match serde_json::to_value(&message.attributes) {
            Ok(Value::Object(map)) => map
                .into_iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k, s.to_string())))
                .collect(),
            Ok(_) => HashMap::new(),
            Err(e) => return Err(IngestError::InvalidMessage(e.to_string())),
        };
        let data = serde_json::to_vec(&message.body)
            .map_err(|e| IngestError::InvalidMessage(e.to_string()))?;

        Ok(Self {
            attributes,
            data: Some(BASE64.encode(data)),
            message_id: message.message_id.clone(),
            publish_time: message.publish_time,
        })
    }

    /// Decode the payload into a telemetry message.
    ///
    /// The payload must be base64 of a JSON object. Attributes are taken as
    /// delivered and validated later, when the storage path is built.
    pub fn decode(self) -> Result<TelemetryMessage, IngestError> {
        let data = self
            .data
            .filter(|d| !d.is_empty())
            .ok_or_else(|| IngestError::InvalidMessage("message has no data".to_string()))?;
        let bytes = BASE64
            .decode(data.as_bytes())
            .map_err(|e| IngestError::InvalidMessage(format!("data is not valid base64: {e}")))?;
        let body: Value = serde_json::from_slice(&bytes)
            .map_err(|e| IngestError::InvalidMessage(format!("data is not valid JSON: {e}")))?;
        let Value::Object(body) = body else {
            return Err(IngestError::InvalidMessage(
                "data must be a JSON object".to_string(),
            ));
        };

        Ok(TelemetryMessage {
            attributes: DeviceAttributes::from_map(&self.attributes),
            body,
            message_id: self.message_id,
            publish_time: self.publish_time,
        })
    }
}

impl PushEnvelope {
    pub fn into_message(self) -> Result<TelemetryMessage, IngestError> {
        self.message.decode()
    }
}
