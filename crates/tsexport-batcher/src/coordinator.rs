//! Ties the assembler, deduplicator and worker pool into one upload cycle.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};
use tsexport_core::{ExporterConfig, ProjectName, TimeSeries, UploadRequest};

use crate::assembler::RequestAssembler;
use crate::dedup;
use crate::error::{BatcherResult, CombinedError, UploadError};
use crate::pool::{PoolConfig, WorkerPool, WorkerResult, send_isolated};
use crate::transport::Transport;

/// The caller-facing account of one upload cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    /// Requests handed to the transport.
    pub requests: usize,
    /// Time series that did not reach the backend.
    pub dropped: usize,
    pub error: Option<CombinedError>,
}

impl UploadSummary {
    pub fn is_success(&self) -> bool {
        self.dropped == 0 && self.error.is_none()
    }

    pub fn errors(&self) -> &[UploadError] {
        self.error.as_ref().map(CombinedError::errors).unwrap_or(&[])
    }

    /// Add another cycle's account to this one, keeping every error.
    pub fn merge(&mut self, other: UploadSummary) {
        self.requests += other.requests;
        self.dropped += other.dropped;
        let mut errors = self.error.take().map(CombinedError::into_errors).unwrap_or_default();
        errors.extend(other.error.map(CombinedError::into_errors).unwrap_or_default());
        self.error = CombinedError::from_errors(errors);
    }
}

impl From<WorkerResult> for UploadSummary {
    fn from(result: WorkerResult) -> Self {
        Self {
            requests: result.requests,
            dropped: result.dropped,
            error: CombinedError::from_errors(result.errors),
        }
    }
}

/// One upload cycle: series in, summary out.
///
/// Series are cut into windows of `capacity`, each window is split into
/// duplicate-free requests, and requests are queued to the worker pool.
/// [`close`](Self::close) consumes the batcher, so nothing can be submitted
/// once shutdown has begun.
pub struct MetricsBatcher {
    name: ProjectName,
    assembler: RequestAssembler,
    pool: WorkerPool,
    transport: Arc<dyn Transport>,
    timeout: Duration,
    local: WorkerResult,
}

impl MetricsBatcher {
    /// Start a batcher and its workers on the current runtime.
    pub fn new(
        name: ProjectName,
        capacity: usize,
        pool: &PoolConfig,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            name,
            assembler: RequestAssembler::new(capacity),
            pool: WorkerPool::start(pool, transport.clone()),
            transport,
            timeout: pool.timeout,
            local: WorkerResult::default(),
        }
    }

    pub fn from_config(config: &ExporterConfig, transport: Arc<dyn Transport>) -> Self {
        Self::new(
            config.project_name(),
            config.batching.max_time_series_per_upload,
            &PoolConfig::from_config(config),
            transport,
        )
    }

    /// Buffer one series, queuing requests once a window fills.
    ///
    /// Waits only when every worker is busy and the queue is full.
    pub async fn add_time_series(&mut self, series: TimeSeries) -> BatcherResult<()> {
        if let Some(window) = self.assembler.add(series) {
            self.dispatch(window).await?;
        }
        Ok(())
    }

    /// Queue an already assembled request as is.
    pub async fn submit(&self, request: UploadRequest) -> BatcherResult<()> {
        self.pool.submit(request).await
    }

    /// Account for series lost before they reached the pipeline.
    pub fn record_dropped(&mut self, dropped: usize, error: UploadError) {
        debug!(dropped, error = %error, "time series dropped before upload");
        self.local.record_dropped(dropped, error);
    }

    /// Series waiting for a window to fill.
    pub fn buffered(&self) -> usize {
        self.assembler.len()
    }

    /// Drain the pool, then send the final partial window from here.
    ///
    /// The final window goes out even if a worker failed. No transport call
    /// is made after this returns.
    pub async fn close(self) -> BatcherResult<UploadSummary> {
        let Self {
            name,
            mut assembler,
            pool,
            transport,
            timeout,
            local,
        } = self;

        let pooled = pool.close().await;

        let mut last = WorkerResult::default();
        if let Some(window) = assembler.flush(true) {
            for request in dedup::combine(&name, window) {
                let (dropped, errors) = send_isolated(transport.clone(), request, timeout).await;
                last.record(dropped, errors);
            }
        }

        let mut result = pooled?;
        result.merge(local);
        result.merge(last);

        let summary = UploadSummary::from(result);
        info!(
            requests = summary.requests,
            dropped = summary.dropped,
            "upload cycle finished"
        );
        Ok(summary)
    }

    async fn dispatch(&self, window: Vec<TimeSeries>) -> BatcherResult<()> {
        for request in dedup::combine(&self.name, window) {
            self.pool.submit(request).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tsexport_core::{Metric, MetricKind, MonitoredResource, ValueType};

    use super::*;
    use crate::error::TransportError;
    use crate::testing::RecordingTransport;

    fn ts(metric_type: &str, value: usize) -> TimeSeries {
        TimeSeries {
            metric: Metric::new(metric_type).with_label("v", value.to_string()),
            resource: MonitoredResource::global(),
            metric_kind: MetricKind::Gauge,
            value_type: ValueType::Int64,
            points: Vec::new(),
        }
    }

    fn batcher(capacity: usize, transport: Arc<RecordingTransport>) -> MetricsBatcher {
        MetricsBatcher::new(
            ProjectName::new("test"),
            capacity,
            &PoolConfig::default(),
            transport,
        )
    }

    #[test]
    fn summary_from_clean_result() {
        let summary = UploadSummary::from(WorkerResult::default());
        assert!(summary.is_success());
        assert!(summary.errors().is_empty());
    }

    #[test]
    fn summaries_merge_without_losing_errors() {
        let mut a = UploadSummary {
            requests: 2,
            dropped: 1,
            error: CombinedError::from_errors(vec![UploadError::Transport("a".into())]),
        };
        a.merge(UploadSummary::default());
        a.merge(UploadSummary {
            requests: 1,
            dropped: 4,
            error: CombinedError::from_errors(vec![UploadError::Transport("b".into())]),
        });

        assert_eq!(a.requests, 3);
        assert_eq!(a.dropped, 5);
        assert_eq!(a.error.unwrap().to_string(), "[a; b]");
    }

    #[tokio::test]
    async fn final_partial_window_is_sent_on_close() {
        let transport = RecordingTransport::new().into_arc();
        let mut b = batcher(3, transport.clone());
        for i in 0..4 {
            b.add_time_series(ts("custom.googleapis.com/a", i)).await.unwrap();
        }
        assert_eq!(b.buffered(), 1);

        let summary = b.close().await.unwrap();
        assert_eq!(summary.requests, 2);
        let sizes: Vec<_> = transport.requests().iter().map(UploadRequest::len).collect();
        assert_eq!(sizes, vec![3, 1]);
    }

    #[tokio::test]
    async fn duplicates_in_a_window_become_separate_requests() {
        let transport = RecordingTransport::new().into_arc();
        let mut b = batcher(4, transport.clone());
        for _ in 0..4 {
            b.add_time_series(ts("custom.googleapis.com/a", 0)).await.unwrap();
        }
        let summary = b.close().await.unwrap();

        assert_eq!(summary.requests, 4);
        assert!(transport.requests().iter().all(|r| r.len() == 1));
    }

    #[tokio::test]
    async fn recorded_drops_reach_the_summary() {
        let transport = RecordingTransport::new().into_arc();
        let mut b = batcher(10, transport);
        b.record_dropped(
            5,
            UploadError::Conversion {
                metric: "m".into(),
                message: "bad".into(),
            },
        );
        let summary = b.close().await.unwrap();
        assert_eq!(summary.dropped, 5);
        assert_eq!(summary.requests, 0);
        assert_eq!(summary.error.unwrap().to_string(), "failed to convert metric m: bad");
    }

    #[tokio::test]
    async fn errors_from_pool_and_final_send_are_combined() {
        let transport = RecordingTransport::with_responder(|_| {
            Err(TransportError::new("unavailable"))
        })
        .into_arc();
        let mut b = batcher(2, transport);
        for i in 0..3 {
            b.add_time_series(ts("custom.googleapis.com/a", i)).await.unwrap();
        }
        let summary = b.close().await.unwrap();

        assert_eq!(summary.dropped, 3);
        assert_eq!(
            summary.error.unwrap().to_string(),
            "[unavailable; unavailable]"
        );
    }

    #[tokio::test]
    async fn panicking_uploads_are_counted_and_the_final_window_still_goes_out() {
        let transport = RecordingTransport::with_responder(|_| panic!("transport bug")).into_arc();
        let mut b = batcher(2, transport.clone());
        for i in 0..3 {
            b.add_time_series(ts("custom.googleapis.com/a", i)).await.unwrap();
        }
        let summary = b.close().await.unwrap();

        assert_eq!(transport.calls(), 2);
        assert_eq!(summary.requests, 2);
        assert_eq!(summary.dropped, 3);
        assert_eq!(summary.errors().len(), 2);
        assert_eq!(transport.requests().last().map(UploadRequest::len), Some(1));
    }

    #[tokio::test]
    async fn presubmitted_requests_are_counted() {
        let transport = RecordingTransport::new().into_arc();
        let b = batcher(10, transport.clone());
        let request = UploadRequest::new(
            ProjectName::new("test"),
            vec![ts("custom.googleapis.com/a", 0)],
        );
        b.submit(request).await.unwrap();
        let summary = b.close().await.unwrap();
        assert_eq!(summary.requests, 1);
        assert_eq!(transport.calls(), 1);
    }
}
