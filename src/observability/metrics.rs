//! Prometheus metrics for the retention service.
//!
//! Provides metrics for:
//! - Retention sweeps (outcome, duration, documents deleted)
//! - Telemetry ingestion outcomes

#[cfg(feature = "prometheus")]
use std::sync::OnceLock;

#[cfg(feature = "prometheus")]
use metrics::{counter, histogram};
#[cfg(feature = "prometheus")]
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use crate::config::MetricsConfig;

/// Global Prometheus handle for the metrics endpoint.
#[cfg(feature = "prometheus")]
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Initialize the metrics system with the given configuration.
#[cfg(feature = "prometheus")]
pub fn init_metrics(config: &MetricsConfig) -> Result<(), MetricsError> {
    if !config.enabled {
        return Ok(());
    }

    let builder = PrometheusBuilder::new()
        .set_buckets_for_metric(
            metrics_exporter_prometheus::Matcher::Full(
                "retention_sweep_duration_seconds".to_string(),
            ),
            &config.sweep_duration_buckets_secs,
        )
        .map_err(|e| MetricsError::Setup(e.to_string()))?;

    let handle = builder.install_recorder().map_err(MetricsError::Install)?;

    PROMETHEUS_HANDLE
        .set(handle)
        .map_err(|_| MetricsError::Setup("Metrics already initialized".to_string()))?;

    Ok(())
}

/// Initialize the metrics system (no-op without prometheus feature).
#[cfg(not(feature = "prometheus"))]
pub fn init_metrics(_config: &MetricsConfig) -> Result<(), MetricsError> {
    Ok(())
}

/// Get the Prometheus handle for rendering metrics.
#[cfg(feature = "prometheus")]
pub fn get_prometheus_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ─────────────────────────────────────────────────────────────────────────────
// Metric Recording Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Record telemetry documents deleted by a retention sweep.
pub fn record_retention_deletion(count: u64) {
    #[cfg(feature = "prometheus")]
    {
        counter!("retention_deletions_total").increment(count);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = count;
    }
}

/// Record the outcome of one retention sweep.
///
/// `status` is one of `success`, `timed_out`, `cancelled` or `error`.
pub fn record_retention_sweep(status: &str, duration_secs: f64) {
    #[cfg(feature = "prometheus")]
    {
        counter!("retention_sweeps_total", "status" => status.to_string()).increment(1);
        histogram!("retention_sweep_duration_seconds").record(duration_secs);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = (status, duration_secs);
    }
}

/// Record one ingested telemetry message.
///
/// `status` is one of `stored`, `stored_unprunable`, `rejected` or `error`.
pub fn record_telemetry_ingested(status: &str) {
    #[cfg(feature = "prometheus")]
    {
        counter!("telemetry_ingested_total", "status" => status.to_string()).increment(1);
    }
    #[cfg(not(feature = "prometheus"))]
    {
        let _ = status;
    }
}

/// Metrics errors.
#[derive(Debug, thiserror::Error)]
pub enum MetricsError {
    #[error("Failed to set up metrics: {0}")]
    Setup(String),

    #[cfg(feature = "prometheus")]
    #[error("Failed to install metrics recorder: {0}")]
    Install(#[from] metrics_exporter_prometheus::BuildError),
}
