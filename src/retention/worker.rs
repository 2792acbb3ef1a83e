//! Scheduled retention worker.
//!
//! Runs a sweep every `interval_hours` until cancelled. A failed sweep is
//! logged and recorded; the worker keeps going and the next run retries.

use std::{sync::Arc, time::Duration};

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::sweep::Sweeper;
use crate::observability::metrics;

/// Starts the retention worker as a background task.
///
/// The worker runs in a loop, sweeping at the configured interval, until
/// `cancel` fires. A sweep in progress stops at its next page boundary.
pub async fn start_retention_worker(sweeper: Arc<Sweeper>, cancel: CancellationToken) {
    let config = sweeper.config();
    if !config.enabled {
        tracing::info!("Retention worker disabled by configuration");
        return;
    }

    let dry_run_msg = if config.dry_run { " (DRY RUN)" } else { "" };
    tracing::info!(
        interval_hours = config.interval_hours,
        retention_period_secs = config.retention_period_secs,
        page_size = config.page_size,
        max_duration_secs = config.max_duration_secs,
        device_concurrency = config.device_concurrency,
        dry_run = config.dry_run,
        "Starting retention worker{}",
        dry_run_msg
    );

    let interval = config.interval();

    if !config.run_on_startup && !wait(interval, &cancel).await {
        tracing::info!("Retention worker stopped");
        return;
    }

    loop {
        run_scheduled_sweep(&sweeper).await;

        if !wait(interval, &cancel).await {
            break;
        }
    }

    tracing::info!("Retention worker stopped");
}

/// Sleep for `interval`. Returns false if cancelled first.
async fn wait(interval: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(interval) => true,
    }
}

async fn run_scheduled_sweep(sweeper: &Sweeper) {
    let start = Instant::now();
    match sweeper.run().await {
        Ok(report) => {
            metrics::record_retention_sweep(report.status(), start.elapsed().as_secs_f64());
            if report.documents_deleted == 0 {
                tracing::debug!(
                    devices = report.devices_swept,
                    "Retention run complete, no documents to delete"
                );
            }
        }
        Err(e) => {
            metrics::record_retention_sweep("error", start.elapsed().as_secs_f64());
            tracing::error!(error = %e, "Error running retention sweep");
        }
    }
}
