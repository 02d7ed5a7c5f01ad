//! Streaming front end for [`StatsExporter`].
//!
//! Buffers metrics and exports them in bundles: as soon as `count_threshold`
//! metrics are waiting, on every `delay_threshold` tick, and once more when
//! shutdown is signalled. Flushes triggered by `run` return nothing to the
//! caller, so every flush also folds its summary into a running total read
//! with [`MetricsBundler::summary`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};
use tsexport_batcher::{BatcherResult, UploadSummary};

use crate::convert::Converter;
use crate::exporter::StatsExporter;

pub struct MetricsBundler<C: Converter> {
    exporter: Arc<StatsExporter<C>>,
    pending: Mutex<Vec<C::Metric>>,
    count_threshold: usize,
    delay_threshold: Duration,
    /// Series dropped across all flushes.
    dropped: AtomicU64,
    /// Requests sent across all flushes.
    uploads: AtomicU64,
    flushes: AtomicU64,
    /// Everything flushed since the last `take_summary`.
    totals: Mutex<UploadSummary>,
}

impl<C: Converter> MetricsBundler<C> {
    /// Thresholds come from the exporter's `[bundler]` config.
    pub fn new(exporter: Arc<StatsExporter<C>>) -> Self {
        let config = exporter.config();
        let count_threshold = config.bundler.count_threshold.max(1);
        let delay_threshold = config.delay_threshold();
        Self {
            exporter,
            pending: Mutex::new(Vec::new()),
            count_threshold,
            delay_threshold,
            dropped: AtomicU64::new(0),
            uploads: AtomicU64::new(0),
            flushes: AtomicU64::new(0),
            totals: Mutex::new(UploadSummary::default()),
        }
    }

    /// Queue metrics, flushing if the count threshold is reached.
    pub async fn add(
        &self,
        metrics: impl IntoIterator<Item = C::Metric>,
    ) -> BatcherResult<Option<UploadSummary>> {
        let ready = {
            let mut pending = self.pending.lock().await;
            pending.extend(metrics);
            pending.len() >= self.count_threshold
        };
        if ready {
            return self.flush().await.map(Some);
        }
        Ok(None)
    }

    /// Export everything queued. An empty queue yields an empty summary.
    pub async fn flush(&self) -> BatcherResult<UploadSummary> {
        let batch = std::mem::take(&mut *self.pending.lock().await);
        if batch.is_empty() {
            return Ok(UploadSummary::default());
        }

        let summary = self.exporter.export(&batch).await?;
        self.flushes.fetch_add(1, Ordering::Relaxed);
        self.uploads
            .fetch_add(summary.requests as u64, Ordering::Relaxed);
        self.dropped
            .fetch_add(summary.dropped as u64, Ordering::Relaxed);

        match &summary.error {
            Some(err) => warn!(
                metrics = batch.len(),
                dropped = summary.dropped,
                error = %err,
                "bundle exported with errors"
            ),
            None => debug!(metrics = batch.len(), requests = summary.requests, "bundle exported"),
        }
        self.totals.lock().await.merge(summary.clone());
        Ok(summary)
    }

    /// Flush on every delay tick until shutdown, then flush once more.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            delay_ms = self.delay_threshold.as_millis() as u64,
            count_threshold = self.count_threshold,
            "metrics bundler started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.delay_threshold) => {
                    if let Err(e) = self.flush().await {
                        warn!(error = %e, "bundle flush failed");
                    }
                }
                _ = shutdown.changed() => {
                    info!("metrics bundler shutting down");
                    if let Err(e) = self.flush().await {
                        warn!(error = %e, "final bundle flush failed");
                    }
                    break;
                }
            }
        }
    }

    pub async fn pending(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn uploads(&self) -> u64 {
        self.uploads.load(Ordering::Relaxed)
    }

    pub fn flushes(&self) -> u64 {
        self.flushes.load(Ordering::Relaxed)
    }

    /// Requests, drops and errors of every flush since the last
    /// [`take_summary`](Self::take_summary).
    pub async fn summary(&self) -> UploadSummary {
        self.totals.lock().await.clone()
    }

    /// Like [`summary`](Self::summary), and starts a new total.
    pub async fn take_summary(&self) -> UploadSummary {
        std::mem::take(&mut *self.totals.lock().await)
    }
}
