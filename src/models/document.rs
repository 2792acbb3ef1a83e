use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::DocumentPath;

/// Name of the field retention compares against the cutoff.
pub const TIMESTAMP_FIELD: &str = "timestamp";

/// A stored document.
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub path: DocumentPath,
    pub data: Value,
    /// Comparable timestamp in epoch seconds, extracted when the document was written.
    pub timestamp: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Extract the comparable `timestamp` of a document body.
///
/// Only a top-level JSON number counts. Strings, missing fields and non-object
/// bodies yield `None`, and such documents never match a retention query.
pub fn extract_timestamp(data: &Value) -> Option<f64> {
    data.get(TIMESTAMP_FIELD)
        .and_then(Value::as_f64)
        .filter(|ts| ts.is_finite())
}

/// Fractional seconds since the Unix epoch, the unit telemetry timestamps use.
pub fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp() as f64 + f64::from(at.timestamp_subsec_micros()) / 1_000_000.0
}
