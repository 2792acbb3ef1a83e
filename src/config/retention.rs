//! Telemetry retention configuration.
//!
//! Configures the sweep that prunes telemetry event documents older than the
//! retention window.
//!
//! # Example
//!
//! ```toml
//! [retention]
//! enabled = true
//! interval_hours = 24
//! retention_period_secs = 604800
//! page_size = 500
//! max_duration_secs = 300
//!
//! [retention.layout]
//! topic = "iot-events"
//! sub_folder = "telemetry"
//! events_collection = "events"
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::{db::MAX_BATCH_WRITES, models::validate_segment};

/// Telemetry retention configuration.
///
/// When enabled, a background worker sweeps every device's events
/// sub-collection on a fixed interval and deletes documents whose
/// `timestamp` is at or before `now - retention_period_secs`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct RetentionConfig {
    /// Whether the scheduled sweep runs. On-demand sweeps are always available.
    /// Default: true
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// How often to run the sweep (in hours).
    /// Default: 24 (once per day)
    #[serde(default = "default_interval_hours")]
    pub interval_hours: u64,

    /// Run the first sweep immediately instead of waiting one interval.
    /// Default: false
    #[serde(default)]
    pub run_on_startup: bool,

    /// Age after which telemetry is deleted, in seconds.
    /// Default: 604800 (7 days)
    #[serde(default = "default_retention_period_secs")]
    pub retention_period_secs: u64,

    /// Documents deleted per atomic batch. Must be between 1 and 500.
    /// Default: 500
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Upper bound on one sweep, in seconds. Checked between pages: the
    /// in-flight commit always completes and the next sweep resumes the rest.
    /// Set to 0 for no limit.
    /// Default: 300
    #[serde(default = "default_max_duration_secs")]
    pub max_duration_secs: u64,

    /// Number of devices swept in parallel. Pages within one device are
    /// always deleted one after another.
    /// Default: 1
    #[serde(default = "default_device_concurrency")]
    pub device_concurrency: usize,

    /// If true, count what would be deleted without deleting anything.
    /// Default: false
    #[serde(default)]
    pub dry_run: bool,

    /// Where telemetry events live beneath each device document.
    #[serde(default)]
    pub layout: TelemetryLayout,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_hours: default_interval_hours(),
            run_on_startup: false,
            retention_period_secs: default_retention_period_secs(),
            page_size: default_page_size(),
            max_duration_secs: default_max_duration_secs(),
            device_concurrency: default_device_concurrency(),
            dry_run: false,
            layout: TelemetryLayout::default(),
        }
    }
}

impl RetentionConfig {
    /// Get the sweep interval as a Duration.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_hours.saturating_mul(3600))
    }

    /// Get the retention window as a Duration.
    pub fn retention_period(&self) -> Duration {
        Duration::from_secs(self.retention_period_secs)
    }

    /// Get the sweep time limit, `None` when unlimited.
    pub fn max_duration(&self) -> Option<Duration> {
        (self.max_duration_secs > 0).then(|| Duration::from_secs(self.max_duration_secs))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 || self.page_size > MAX_BATCH_WRITES {
            return Err(ConfigError::Validation(format!(
                "retention.page_size must be between 1 and {MAX_BATCH_WRITES}, got {}",
                self.page_size
            )));
        }
        if self.interval_hours == 0 {
            return Err(ConfigError::Validation(
                "retention.interval_hours must be at least 1".into(),
            ));
        }
        if self.device_concurrency == 0 {
            return Err(ConfigError::Validation(
                "retention.device_concurrency must be at least 1".into(),
            ));
        }
        self.layout.validate()
    }
}

fn default_true() -> bool {
    true
}

fn default_interval_hours() -> u64 {
    24
}

fn default_retention_period_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_page_size() -> usize {
    MAX_BATCH_WRITES
}

fn default_max_duration_secs() -> u64 {
    300
}

fn default_device_concurrency() -> usize {
    1
}

/// Names of the path segments between a device document and its events.
///
/// Events live at `<registry>/<device>/<topic>/<sub_folder>/<events_collection>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct TelemetryLayout {
    /// Sub-collection of each device named after the message topic.
    /// Default: "iot-events"
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Document beneath the topic collection holding the events.
    /// Default: "telemetry"
    #[serde(default = "default_sub_folder")]
    pub sub_folder: String,

    /// Collection holding one document per event.
    /// Default: "events"
    #[serde(default = "default_events_collection")]
    pub events_collection: String,
}

impl Default for TelemetryLayout {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            sub_folder: default_sub_folder(),
            events_collection: default_events_collection(),
        }
    }
}

impl TelemetryLayout {
    fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("topic", &self.topic),
            ("sub_folder", &self.sub_folder),
            ("events_collection", &self.events_collection),
        ] {
            validate_segment(value).map_err(|e| {
                ConfigError::Validation(format!("retention.layout.{name}: {e}"))
            })?;
        }
        Ok(())
    }
}

pub(crate) fn default_topic() -> String {
    "iot-events".to_string()
}

fn default_sub_folder() -> String {
    "telemetry".to_string()
}

fn default_events_collection() -> String {
    "events".to_string()
}
