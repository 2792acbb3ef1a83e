//! Test-data generator.
//!
//! Produces espresso machine readings for a handful of devices spread over
//! the past few days, so the retention sweep has something to delete.

use serde::Serialize;

use super::{IngestError, IngestionHandler};
use crate::{
    config::GeneratorConfig,
    models::{DeviceAttributes, TelemetryMessage, TelemetryReading, TimestampField},
};

const SECS_PER_DAY: f64 = 86_400.0;

/// Counts from one generator run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerateSummary {
    pub devices: u32,
    pub documents: u64,
    /// Documents whose timestamp is already past the given cutoff.
    pub expired: u64,
}

pub struct TelemetryGenerator {
    config: GeneratorConfig,
}

impl TelemetryGenerator {
    /// Fails if `devices` exceeds `start_id`, since device ids count down
    /// from `start_id`.
    pub fn new(config: GeneratorConfig) -> Result<Self, IngestError> {
        if u64::from(config.devices) > config.start_id {
            return Err(IngestError::InvalidGenerator(format!(
                "devices ({}) cannot exceed start_id ({})",
                config.devices, config.start_id
            )));
        }
        Ok(Self { config })
    }

    /// Attributes of the `n`th generated device, counting from 1.
    pub fn device_attributes(&self, n: u32) -> DeviceAttributes {
        let c = &self.config;
        DeviceAttributes {
            device_id: format!(
                "{}{}",
                c.device_prefix,
                c.start_id.saturating_sub(u64::from(n))
            ),
            device_registry_id: c.registry_id.clone(),
            sub_folder: c.sub_folder.clone(),
            device_num_id: Some(n.to_string()),
            device_registry_location: Some(c.registry_location.clone()),
            project_id: Some(c.project_id.clone()),
        }
    }

    /// Readings for every device, day and offset, with
    /// `timestamp = now - day * 86400 - offset`.
    pub fn backfill(&self, now: f64) -> impl Iterator<Item = TelemetryMessage> + '_ {
        let c = &self.config;
        (1..=c.devices).flat_map(move |n| {
            let attributes = self.device_attributes(n);
            (0..c.days).flat_map(move |day| {
                let attributes = attributes.clone();
                (0..c.readings_per_day).map(move |offset| {
                    let ts = now - f64::from(day) * SECS_PER_DAY - f64::from(offset);
                    reading_message(attributes.clone(), ts)
                })
            })
        })
    }

    /// A single reading from the reference device, timestamped `now`.
    pub fn sample(&self, now: f64) -> TelemetryMessage {
        let attributes = DeviceAttributes {
            device_id: "re-2.0-0000002".to_string(),
            device_registry_id: self.config.registry_id.clone(),
            sub_folder: self.config.sub_folder.clone(),
            device_num_id: Some("3187732082407108".to_string()),
            device_registry_location: Some(self.config.registry_location.clone()),
            project_id: Some(self.config.project_id.clone()),
        };
        reading_message(attributes, now)
    }

    /// Write the backfill through `handler`. Stops at the first failure.
    pub async fn run(
        &self,
        handler: &IngestionHandler,
        now: f64,
        cutoff: f64,
    ) -> Result<GenerateSummary, IngestError> {
        let mut summary = GenerateSummary {
            devices: self.config.devices,
            ..Default::default()
        };

        for message in self.backfill(now) {
            let expired = matches!(message.timestamp(), TimestampField::Numeric(ts) if ts <= cutoff);
            handler.handle(message).await?;
            summary.documents += 1;
            if expired {
                summary.expired += 1;
            }
        }

        tracing::info!(
            devices = summary.devices,
            documents = summary.documents,
            expired = summary.expired,
            registry = %self.config.registry_id,
            "Generated test telemetry"
        );
        Ok(summary)
    }
}

fn reading_message(attributes: DeviceAttributes, timestamp: f64) -> TelemetryMessage {
    let body = match serde_json::to_value(TelemetryReading::sample(timestamp)) {
        Ok(serde_json::Value::Object(map)) => map,
        _ => serde_json::Map::new(),
    };
    TelemetryMessage {
        attributes,
        body,
        message_id: None,
        publish_time: None,
    }
}
