//! Telemetry ingestion configuration.
//!
//! # Example
//!
//! ```toml
//! [ingestion]
//! topic = "iot-events"
//! region = "australia-southeast1"
//!
//! [ingestion.generator]
//! registry_id = "RebelEspresso"
//! devices = 3
//! days = 10
//! readings_per_day = 10
//! ```

use serde::{Deserialize, Serialize};

use super::{ConfigError, retention::default_topic};
use crate::models::validate_segment;

/// Telemetry ingestion configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct IngestionConfig {
    /// Topic telemetry is published to. Also the name of the per-device
    /// sub-collection events are written under.
    /// Default: "iot-events"
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Deployment region, reported in logs and health output.
    /// Default: "australia-southeast1"
    #[serde(default = "default_region")]
    pub region: String,

    /// Test-data generator defaults.
    #[serde(default)]
    pub generator: GeneratorConfig,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            region: default_region(),
            generator: GeneratorConfig::default(),
        }
    }
}

impl IngestionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_segment(&self.topic)
            .map_err(|e| ConfigError::Validation(format!("ingestion.topic: {e}")))?;
        self.generator.validate()
    }
}

fn default_region() -> String {
    "australia-southeast1".to_string()
}

/// Defaults for the test-data generator.
///
/// Devices are named `<device_prefix><start_id - n>` for `n` in `1..=devices`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "json-schema", derive(schemars::JsonSchema))]
#[serde(deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Registry generated devices belong to.
    #[serde(default = "default_registry_id")]
    pub registry_id: String,

    #[serde(default = "default_device_prefix")]
    pub device_prefix: String,

    #[serde(default = "default_start_id")]
    pub start_id: u64,

    /// Number of devices to generate.
    #[serde(default = "default_devices")]
    pub devices: u32,

    /// Number of days of history to generate, counting back from now.
    #[serde(default = "default_days")]
    pub days: u32,

    /// Readings per device per day, one second apart.
    #[serde(default = "default_readings_per_day")]
    pub readings_per_day: u32,

    #[serde(default = "default_sub_folder")]
    pub sub_folder: String,

    #[serde(default = "default_registry_location")]
    pub registry_location: String,

    #[serde(default = "default_project_id")]
    pub project_id: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            registry_id: default_registry_id(),
            device_prefix: default_device_prefix(),
            start_id: default_start_id(),
            devices: default_devices(),
            days: default_days(),
            readings_per_day: default_readings_per_day(),
            sub_folder: default_sub_folder(),
            registry_location: default_registry_location(),
            project_id: default_project_id(),
        }
    }
}

impl GeneratorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        validate_segment(&self.registry_id)
            .map_err(|e| ConfigError::Validation(format!("ingestion.generator.registry_id: {e}")))?;
        validate_segment(&self.sub_folder)
            .map_err(|e| ConfigError::Validation(format!("ingestion.generator.sub_folder: {e}")))?;
        if u64::from(self.devices) > self.start_id {
            return Err(ConfigError::Validation(
                "ingestion.generator.devices cannot exceed start_id".into(),
            ));
        }
        Ok(())
    }
}

fn default_registry_id() -> String {
    "RebelEspresso".to_string()
}

fn default_device_prefix() -> String {
    "re-2.0-".to_string()
}

fn default_start_id() -> u64 {
    9_999_999
}

fn default_devices() -> u32 {
    3
}

fn default_days() -> u32 {
    10
}

fn default_readings_per_day() -> u32 {
    10
}

fn default_sub_folder() -> String {
    "telemetry".to_string()
}

fn default_registry_location() -> String {
    "asia-east1".to_string()
}

fn default_project_id() -> String {
    "rebelthings".to_string()
}
