use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt, future};
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{
    discovery::{SweepTarget, discover_targets},
    page::delete_expired_page,
};
use crate::{
    config::RetentionConfig,
    db::{DbError, DocumentStore},
    models::{CollectionPath, DocumentPath, epoch_seconds},
    observability::metrics,
};

/// Errors that abort a sweep. Pages committed before the error stay deleted.
#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("Failed to discover devices: {0}")]
    Discovery(#[source] DbError),

    #[error("Failed to sweep {device}: {source}")]
    Device {
        device: DocumentPath,
        #[source]
        source: DbError,
    },
}

/// Per-invocation overrides for a sweep.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepOptions {
    /// Delete events at or before this epoch-seconds value instead of
    /// `now - retention_period`. Clamped to `now - retention_period`: an
    /// override can narrow a sweep but never reach newer events.
    pub cutoff: Option<f64>,
    /// Override the configured dry-run setting.
    pub dry_run: Option<bool>,
}

/// Outcome for one device.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSweep {
    pub device: DocumentPath,
    pub events: CollectionPath,
    /// Delete pages issued, including the final empty one.
    pub pages: u64,
    /// Documents deleted, or in a dry run the number that would be.
    pub deleted: u64,
    /// The sweep stopped before this device's page loop found nothing.
    pub stopped_early: bool,
}

/// Outcome of a sweep.
#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub cutoff: f64,
    pub dry_run: bool,
    pub devices_swept: usize,
    pub pages: u64,
    pub documents_deleted: u64,
    pub timed_out: bool,
    pub cancelled: bool,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub devices: Vec<DeviceSweep>,
}

impl SweepReport {
    /// Status label used for logs and metrics.
    pub fn status(&self) -> &'static str {
        if self.cancelled {
            "cancelled"
        } else if self.timed_out {
            "timed_out"
        } else {
            "success"
        }
    }

    /// Whether every device was swept to completion.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && !self.timed_out
    }
}

/// Tracks whether a sweep must stop at the next page boundary.
struct StopSignal {
    deadline: Option<Instant>,
    cancel: CancellationToken,
    timed_out: AtomicBool,
    cancelled: AtomicBool,
    /// Set when another device failed; the sweep is already aborting.
    aborted: AtomicBool,
}

impl StopSignal {
    fn new(max_duration: Option<Duration>, cancel: CancellationToken) -> Self {
        Self {
            // A deadline past the end of the clock never fires.
            deadline: max_duration.and_then(|d| Instant::now().checked_add(d)),
            cancel,
            timed_out: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            aborted: AtomicBool::new(false),
        }
    }

    fn abort(&self) {
        self.aborted.store(true, Ordering::Relaxed);
    }

    fn should_stop(&self) -> bool {
        if self.aborted.load(Ordering::Relaxed) {
            return true;
        }
        if self.cancel.is_cancelled() {
            self.cancelled.store(true, Ordering::Relaxed);
            return true;
        }
        if let Some(deadline) = self.deadline
            && Instant::now() >= deadline
        {
            self.timed_out.store(true, Ordering::Relaxed);
            return true;
        }
        false
    }
}

/// Runs retention sweeps against one store.
pub struct Sweeper {
    store: Arc<dyn DocumentStore>,
    config: RetentionConfig,
    cancel: CancellationToken,
}

impl Sweeper {
    pub fn new(store: Arc<dyn DocumentStore>, config: RetentionConfig) -> Self {
        Self {
            store,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop in-flight and future sweeps at the next page boundary once
    /// `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// The cutoff a sweep starting at `now` uses.
    pub fn cutoff_at(&self, now: DateTime<Utc>) -> f64 {
        epoch_seconds(now) - self.config.retention_period().as_secs_f64()
    }

    pub async fn run(&self) -> Result<SweepReport, SweepError> {
        self.run_with(SweepOptions::default()).await
    }

    pub async fn run_with_cutoff(&self, cutoff: f64) -> Result<SweepReport, SweepError> {
        self.run_with(SweepOptions {
            cutoff: Some(cutoff),
            ..Default::default()
        })
        .await
    }

    pub async fn run_with(&self, options: SweepOptions) -> Result<SweepReport, SweepError> {
        let started_at = Utc::now();
        let start = Instant::now();
        let retention_cutoff = self.cutoff_at(started_at);
        let cutoff = match options.cutoff {
            Some(requested) if requested.is_finite() && requested <= retention_cutoff => requested,
            Some(requested) => {
                tracing::warn!(
                    requested,
                    retention_cutoff,
                    "Requested cutoff is inside the retention window, using the retention cutoff"
                );
                retention_cutoff
            }
            None => retention_cutoff,
        };
        let dry_run = options.dry_run.unwrap_or(self.config.dry_run);
        let stop = StopSignal::new(self.config.max_duration(), self.cancel.clone());

        tracing::info!(
            cutoff,
            dry_run,
            page_size = self.config.page_size,
            "Starting retention sweep"
        );

        // On the first failure, in-flight devices finish their current page
        // before the error is returned.
        let stop = &stop;
        let mut results = discover_targets(Arc::clone(&self.store), self.config.layout.clone())
            .map_err(SweepError::Discovery)
            .try_take_while(|_: &SweepTarget| future::ready(Ok(!stop.should_stop())))
            .map(move |target| async move {
                self.sweep_device(target?, cutoff, dry_run, stop).await
            })
            .buffer_unordered(self.config.device_concurrency.max(1));

        let mut devices = Vec::new();
        let mut failure = None;
        while let Some(result) = results.next().await {
            match result {
                Ok(device) => devices.push(device),
                Err(e) => {
                    if failure.is_none() {
                        tracing::warn!(error = %e, "Retention sweep failed, waiting for in-flight pages");
                        stop.abort();
                        failure = Some(e);
                    }
                }
            }
        }
        drop(results);
        if let Some(e) = failure {
            return Err(e);
        }
        devices.sort_by(|a, b| a.device.cmp(&b.device));

        let report = SweepReport {
            cutoff,
            dry_run,
            devices_swept: devices.len(),
            pages: devices.iter().map(|d| d.pages).sum(),
            documents_deleted: devices.iter().map(|d| d.deleted).sum(),
            timed_out: stop.timed_out.load(Ordering::Relaxed),
            cancelled: stop.cancelled.load(Ordering::Relaxed),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            devices,
        };

        if report.is_complete() {
            tracing::info!(
                devices = report.devices_swept,
                deleted = report.documents_deleted,
                duration_ms = report.duration_ms,
                dry_run,
                "Retention sweep complete"
            );
        } else {
            tracing::warn!(
                devices = report.devices_swept,
                deleted = report.documents_deleted,
                status = report.status(),
                "Retention sweep stopped early, the next run resumes the rest"
            );
        }

        Ok(report)
    }

    async fn sweep_device(
        &self,
        target: SweepTarget,
        cutoff: f64,
        dry_run: bool,
        stop: &StopSignal,
    ) -> Result<DeviceSweep, SweepError> {
        let SweepTarget { device, events } = target;

        if dry_run {
            let expired = match self.store.count_expired(&events, cutoff).await {
                Ok(n) => n,
                Err(source) => return Err(SweepError::Device { device, source }),
            };
            tracing::info!(
                device = %device,
                expired,
                "DRY RUN: would delete {} documents for {}",
                expired,
                device.id()
            );
            return Ok(DeviceSweep {
                device,
                events,
                pages: 0,
                deleted: expired,
                stopped_early: false,
            });
        }

        let mut pages = 0u64;
        let mut deleted = 0u64;
        let mut stopped_early = false;

        loop {
            if stop.should_stop() {
                stopped_early = true;
                break;
            }
            let count = match delete_expired_page(
                self.store.as_ref(),
                &events,
                cutoff,
                self.config.page_size,
            )
            .await
            {
                Ok(n) => n as u64,
                Err(source) => {
                    tracing::error!(device = %device, pages, deleted, error = %source, "Delete page failed");
                    return Err(SweepError::Device { device, source });
                }
            };
            pages += 1;
            if count == 0 {
                break;
            }
            deleted += count;
            metrics::record_retention_deletion(count);
        }

        tracing::info!(
            device = %device,
            deleted,
            pages,
            stopped_early,
            "Deleted {} documents for {}",
            deleted,
            device.id()
        );

        Ok(DeviceSweep {
            device,
            events,
            pages,
            deleted,
            stopped_early,
        })
    }
}
