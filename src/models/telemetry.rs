use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

use super::{document::TIMESTAMP_FIELD, path::validate_segment, validators::validate_path_segment};

/// Attributes attached to every device telemetry message.
///
/// The three required fields select the storage location. The optional ones
/// are carried by the device bridge but do not affect where data is written.
/// Missing required fields deserialize as empty strings and fail validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAttributes {
    /// Device identifier, e.g. `re-2.0-0000002`
    #[serde(default)]
    #[validate(length(min = 1, max = 1500), custom(function = "validate_path_segment"))]
    pub device_id: String,

    /// Registry the device belongs to; becomes the root collection
    #[serde(default)]
    #[validate(length(min = 1, max = 1500), custom(function = "validate_path_segment"))]
    pub device_registry_id: String,

    /// Telemetry sub-folder the message was published to
    #[serde(default)]
    #[validate(length(min = 1, max = 1500), custom(function = "validate_path_segment"))]
    pub sub_folder: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 1500))]
    pub device_num_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 1500))]
    pub device_registry_location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 1500))]
    pub project_id: Option<String>,
}

impl DeviceAttributes {
    /// Build attributes from a raw string map, as delivered by the message bus.
    ///
    /// Unknown keys are ignored.
    pub fn from_map(map: &HashMap<String, String>) -> Self {
        let get = |key: &str| map.get(key).cloned();
        Self {
            device_id: get("deviceId").unwrap_or_default(),
            device_registry_id: get("deviceRegistryId").unwrap_or_default(),
            sub_folder: get("subFolder").unwrap_or_default(),
            device_num_id: get("deviceNumId"),
            device_registry_location: get("deviceRegistryLocation"),
            project_id: get("projectId"),
        }
    }
}

/// How a message body carries its `timestamp` field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TimestampField {
    /// Numeric epoch seconds; the document can be pruned.
    Numeric(f64),
    /// Present but not a number; stored and never pruned.
    NonNumeric,
    /// Absent; stored and never pruned.
    Missing,
}

impl TimestampField {
    pub fn is_prunable(&self) -> bool {
        matches!(self, TimestampField::Numeric(_))
    }
}

/// One inbound telemetry message.
#[derive(Debug, Clone)]
pub struct TelemetryMessage {
    pub attributes: DeviceAttributes,
    /// JSON object body, stored verbatim
    pub body: Map<String, Value>,
    pub message_id: Option<String>,
    pub publish_time: Option<DateTime<Utc>>,
}

impl TelemetryMessage {
    pub fn timestamp(&self) -> TimestampField {
        match self.body.get(TIMESTAMP_FIELD) {
            Some(value) => match value.as_f64() {
                Some(ts) if ts.is_finite() => TimestampField::Numeric(ts),
                _ => TimestampField::NonNumeric,
            },
            None => TimestampField::Missing,
        }
    }

    /// Document id for this message.
    ///
    /// The body's `timestamp` rendered as text (numbers in shortest form, so
    /// `1700000000.0` becomes `1700000000`; strings verbatim). When that is absent or not a usable path segment the
    /// message id is used, and failing that a random UUID.
    pub fn document_id(&self) -> String {
        let from_timestamp = self.body.get(TIMESTAMP_FIELD).and_then(|value| match value {
            Value::Number(n) => Some(match (n.as_i64(), n.as_u64(), n.as_f64()) {
                (Some(i), _, _) => i.to_string(),
                (_, Some(u), _) => u.to_string(),
                (_, _, Some(f)) => f.to_string(),
                _ => n.to_string(),
            }),
            Value::String(s) => Some(s.clone()),
            _ => None,
        });

        from_timestamp
            .into_iter()
            .chain(self.message_id.clone())
            .find(|id| validate_segment(id).is_ok())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }
}

/// A single espresso machine reading, as produced by the test-data generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    pub timestamp: f64,
    pub boiler_temp: f64,
    pub boiler_setpoint: f64,
    pub boiler_heat_duty: f64,
    pub brew_temp: f64,
}

impl TelemetryReading {
    /// A nominal reading taken at `timestamp`.
    pub fn sample(timestamp: f64) -> Self {
        Self {
            timestamp,
            boiler_temp: 92.0,
            boiler_setpoint: 119.0,
            boiler_heat_duty: 5.0,
            brew_temp: 67.5,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn attributes() -> DeviceAttributes {
        DeviceAttributes {
            device_id: "re-2.0-0000002".to_string(),
            device_registry_id: "RebelEspresso".to_string(),
            sub_folder: "telemetry".to_string(),
            ..Default::default()
        }
    }

    fn message(body: Value, message_id: Option<&str>) -> TelemetryMessage {
        TelemetryMessage {
            attributes: attributes(),
            body: body.as_object().cloned().unwrap(),
            message_id: message_id.map(String::from),
            publish_time: None,
        }
    }

    #[test]
    fn test_attributes_deserialize_camel_case() {
        let attrs: DeviceAttributes = serde_json::from_value(json!({
            "deviceId": "re-2.0-0000002",
            "deviceNumId": "3187732082407108",
            "deviceRegistryId": "RebelEspresso",
            "deviceRegistryLocation": "asia-east1",
            "projectId": "rebelthings",
            "subFolder": "telemetry"
        }))
        .unwrap();
        assert_eq!(attrs.device_registry_id, "RebelEspresso");
        assert_eq!(attrs.device_num_id.as_deref(), Some("3187732082407108"));
        assert!(attrs.validate().is_ok());
    }

    #[test]
    fn test_missing_required_attribute_fails_validation() {
        let attrs: DeviceAttributes = serde_json::from_value(json!({
            "deviceId": "re-2.0-0000002",
            "subFolder": "telemetry"
        }))
        .unwrap();
        let errors = attrs.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("device_registry_id"));
    }

    #[test]
    fn test_attribute_with_slash_fails_validation() {
        let attrs = DeviceAttributes {
            device_id: "dev/evil".to_string(),
            ..attributes()
        };
        let errors = attrs.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("device_id"));
    }

    #[test]
    fn test_from_map() {
        let map: HashMap<String, String> = [
            ("deviceId", "d1"),
            ("deviceRegistryId", "r1"),
            ("subFolder", "telemetry"),
            ("unrelated", "x"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let attrs = DeviceAttributes::from_map(&map);
        assert_eq!(attrs.device_id, "d1");
        assert_eq!(attrs.device_registry_id, "r1");
        assert_eq!(attrs.project_id, None);
        assert!(attrs.validate().is_ok());
    }

    #[test]
    fn test_timestamp_classification() {
        assert_eq!(
            message(json!({"timestamp": 1700000000.25}), None).timestamp(),
            TimestampField::Numeric(1700000000.25)
        );
        assert_eq!(
            message(json!({"timestamp": "yesterday"}), None).timestamp(),
            TimestampField::NonNumeric
        );
        assert_eq!(message(json!({"temp": 1}), None).timestamp(), TimestampField::Missing);
    }

    #[test]
    fn test_document_id_prefers_timestamp() {
        assert_eq!(
            message(json!({"timestamp": 1700000000}), Some("m-1")).document_id(),
            "1700000000"
        );
        assert_eq!(
            message(json!({"timestamp": 1700000000.5}), Some("m-1")).document_id(),
            "1700000000.5"
        );
        assert_eq!(
            message(json!({"timestamp": 1700000000.0}), Some("m-1")).document_id(),
            "1700000000"
        );
        assert_eq!(
            message(json!({"timestamp": "2023-11-14"}), Some("m-1")).document_id(),
            "2023-11-14"
        );
    }

    #[test]
    fn test_document_id_fallbacks() {
        assert_eq!(message(json!({"temp": 1}), Some("m-1")).document_id(), "m-1");
        // Strings that are not valid segments fall through to the message id
        assert_eq!(
            message(json!({"timestamp": "a/b"}), Some("m-1")).document_id(),
            "m-1"
        );

        let id = message(json!({"temp": 1}), None).document_id();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }

    #[test]
    fn test_sample_reading_shape() {
        let value = serde_json::to_value(TelemetryReading::sample(10.0)).unwrap();
        assert_eq!(value["timestamp"], 10.0);
        assert_eq!(value["boiler_setpoint"], 119.0);
        assert_eq!(value["brew_temp"], 67.5);
    }
}
