use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use clap::{Args, ValueEnum};
use tokio::sync::watch;
use tracing::{debug, info, warn};
use tsexport::{Converter, MetricsBundler, StatsExporter};
use tsexport_batcher::{Transport, TransportError, UploadSummary};
use tsexport_core::{
    DispatchMode, ExporterConfig, Metric, MetricDescriptor, MetricKind, MonitoredResource, Point,
    ProjectName, TimeInterval, TimeSeries, TypedValue, UploadRequest, ValueType,
};

#[derive(Args)]
pub struct SimulateArgs {
    /// tsexport.toml to load; defaults apply without one.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Override exporter.project_id.
    #[arg(long)]
    project: Option<String>,
    /// Number of synthetic metrics.
    #[arg(long, default_value = "20")]
    metrics: usize,
    /// Series per metric.
    #[arg(long, default_value = "25")]
    series: usize,
    /// Override batching.workers.
    #[arg(long)]
    workers: Option<usize>,
    /// Override batching.dispatch.
    #[arg(long, value_enum)]
    dispatch: Option<Dispatch>,
    /// Every Nth backend call rejects part of its request (0 = never).
    #[arg(long, default_value = "0")]
    fail_every: usize,
    /// Simulated latency of each backend call, in milliseconds.
    #[arg(long, default_value = "0")]
    latency_ms: u64,
    /// Add a built-in metric, written through the service endpoint.
    #[arg(long)]
    builtin: bool,
    /// Feed metrics through the streaming bundler instead of one export.
    #[arg(long)]
    stream: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Dispatch {
    Shared,
    RoundRobin,
}

impl From<Dispatch> for DispatchMode {
    fn from(d: Dispatch) -> Self {
        match d {
            Dispatch::Shared => DispatchMode::Shared,
            Dispatch::RoundRobin => DispatchMode::RoundRobin,
        }
    }
}

pub async fn run(args: SimulateArgs) -> anyhow::Result<()> {
    let config = resolve_config(&args)?;
    let transport = Arc::new(SimulatedTransport::new(
        Duration::from_millis(args.latency_ms),
        args.fail_every,
    ));
    let detector = || {
        std::env::var("TSEXPORT_RESOURCE_TYPE")
            .ok()
            .map(MonitoredResource::new)
    };
    let exporter = StatsExporter::new(config.clone(), transport.clone(), SyntheticConverter)?
        .with_resource_detector(&detector);
    let metrics = synthetic_metrics(args.metrics, args.series, args.builtin);

    info!(
        project = %config.exporter.project_id,
        metrics = metrics.len(),
        workers = config.batching.workers,
        stream = args.stream,
        "simulation started"
    );
    let started = Instant::now();

    let (mode, summary) = if args.stream {
        ("stream", stream(exporter, metrics).await?)
    } else {
        ("batch", exporter.export(&metrics).await?)
    };
    let errors: Vec<String> = summary.errors().iter().map(ToString::to_string).collect();
    let (requests, dropped) = (summary.requests, summary.dropped);

    if dropped > 0 {
        warn!(dropped, "simulation dropped time series");
    }

    let report = serde_json::json!({
        "mode": mode,
        "project": config.project_name().as_str(),
        "workers": config.batching.workers,
        "dispatch": format!("{:?}", config.batching.dispatch),
        "metrics": args.metrics + usize::from(args.builtin),
        "series_sent": transport.series(),
        "transport_calls": transport.calls(),
        "descriptor_calls": transport.descriptor_calls(),
        "requests": requests,
        "dropped": dropped,
        "errors": errors,
        "elapsed_ms": started.elapsed().as_millis() as u64,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Feed `metrics` one by one through a bundler, then shut it down.
async fn stream(
    exporter: StatsExporter<SyntheticConverter>,
    metrics: Vec<SyntheticMetric>,
) -> anyhow::Result<UploadSummary> {
    let bundler = Arc::new(MetricsBundler::new(Arc::new(exporter)));
    let (tx, rx) = watch::channel(false);
    let runner = {
        let bundler = bundler.clone();
        tokio::spawn(async move { bundler.run(rx).await })
    };
    for metric in metrics {
        if let Some(flushed) = bundler.add([metric]).await? {
            debug!(
                requests = flushed.requests,
                dropped = flushed.dropped,
                "count threshold flush"
            );
        }
    }
    tx.send(true)?;
    runner.await?;
    Ok(bundler.take_summary().await)
}

fn resolve_config(args: &SimulateArgs) -> anyhow::Result<ExporterConfig> {
    let mut config = match &args.config {
        Some(path) => ExporterConfig::from_file(path)?,
        None => ExporterConfig::for_project("simulated"),
    };
    if let Some(project) = &args.project {
        config.exporter.project_id = project.clone();
    }
    if let Some(workers) = args.workers {
        config.batching.workers = workers;
    }
    if let Some(dispatch) = args.dispatch {
        config.batching.dispatch = dispatch.into();
    }
    config.validate()?;
    Ok(config)
}

// ── Backend ────────────────────────────────────────────────────────

/// Accepts everything except every `fail_every`th call, which loses the
/// first quarter of its request.
pub struct SimulatedTransport {
    latency: Duration,
    fail_every: usize,
    calls: AtomicUsize,
    series: AtomicUsize,
    descriptor_calls: AtomicUsize,
}

impl SimulatedTransport {
    pub fn new(latency: Duration, fail_every: usize) -> Self {
        Self {
            latency,
            fail_every,
            calls: AtomicUsize::new(0),
            series: AtomicUsize::new(0),
            descriptor_calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn series(&self) -> usize {
        self.series.load(Ordering::Relaxed)
    }

    pub fn descriptor_calls(&self) -> usize {
        self.descriptor_calls.load(Ordering::Relaxed)
    }

    async fn write(&self, request: &UploadRequest) -> Result<(), TransportError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let n = self.calls.fetch_add(1, Ordering::Relaxed) + 1;
        self.series.fetch_add(request.len(), Ordering::Relaxed);
        if self.fail_every > 0 && n % self.fail_every == 0 {
            return Err(partial_failure(request.len()));
        }
        Ok(())
    }
}

fn partial_failure(size: usize) -> TransportError {
    let last = (size / 4).max(1) - 1;
    let ranges = if last == 0 {
        "0".to_string()
    } else {
        format!("0-{last}")
    };
    TransportError::new(format!(
        "One or more TimeSeries could not be written: Points must be written in order. \
         One or more of the points specified had an older start time than the most recent \
         point.: timeSeries[{ranges}]"
    ))
}

#[async_trait]
impl Transport for SimulatedTransport {
    async fn create_time_series(&self, request: &UploadRequest) -> Result<(), TransportError> {
        self.write(request).await
    }

    async fn create_service_time_series(
        &self,
        request: &UploadRequest,
    ) -> Result<(), TransportError> {
        self.write(request).await
    }

    async fn create_metric_descriptor(
        &self,
        _project: &ProjectName,
        _descriptor: &MetricDescriptor,
    ) -> Result<(), TransportError> {
        self.descriptor_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

// ── Synthetic metrics ──────────────────────────────────────────────

pub struct SyntheticMetric {
    name: String,
    series: usize,
}

fn synthetic_metrics(count: usize, series: usize, builtin: bool) -> Vec<SyntheticMetric> {
    let mut metrics: Vec<_> = (0..count)
        .map(|i| SyntheticMetric {
            name: format!("simulated/metric_{i}"),
            series,
        })
        .collect();
    if builtin {
        metrics.push(SyntheticMetric {
            name: "kubernetes.io/container/restart_count".to_string(),
            series,
        });
    }
    metrics
}

pub struct SyntheticConverter;

impl Converter for SyntheticConverter {
    type Metric = SyntheticMetric;

    fn descriptor(&self, metric: &SyntheticMetric) -> MetricDescriptor {
        MetricDescriptor {
            name: String::new(),
            metric_type: metric.name.clone(),
            display_name: metric.name.clone(),
            description: "Synthetic gauge".to_string(),
            unit: "1".to_string(),
            metric_kind: MetricKind::Gauge,
            value_type: ValueType::Double,
            labels: Vec::new(),
        }
    }

    fn series_count(&self, metric: &SyntheticMetric) -> usize {
        metric.series
    }

    fn convert(
        &self,
        metric: &SyntheticMetric,
        resource: &MonitoredResource,
    ) -> Result<Vec<TimeSeries>, String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| e.to_string())?
            .as_nanos() as u64;

        Ok((0..metric.series)
            .map(|i| TimeSeries {
                metric: Metric::new(metric.name.clone()).with_label("shard", format!("{i:04}")),
                resource: resource.clone(),
                metric_kind: MetricKind::Gauge,
                value_type: ValueType::Double,
                points: vec![Point {
                    interval: TimeInterval {
                        start_unix_nanos: None,
                        end_unix_nanos: now,
                    },
                    value: TypedValue::Double((i as f64).sin().abs() * 100.0),
                }],
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(size: usize) -> UploadRequest {
        let converter = SyntheticConverter;
        let metric = SyntheticMetric {
            name: "t".into(),
            series: size,
        };
        let series = converter
            .convert(&metric, &MonitoredResource::global())
            .unwrap();
        UploadRequest::new(ProjectName::new("sim"), series)
    }

    #[tokio::test]
    async fn every_nth_call_fails_partially() {
        let transport = SimulatedTransport::new(Duration::ZERO, 2);
        assert!(transport.create_time_series(&request(8)).await.is_ok());
        let err = transport.create_time_series(&request(8)).await.unwrap_err();

        let (dropped, errors) = tsexport_batcher::partial::parse(8, Some(&err));
        assert_eq!(dropped, 2);
        assert_eq!(errors.len(), 1);
        assert_eq!(transport.calls(), 2);
        assert_eq!(transport.series(), 16);
    }

    #[test]
    fn small_requests_lose_one_series() {
        let err = partial_failure(3);
        assert_eq!(tsexport_batcher::partial::parse(3, Some(&err)).0, 1);
    }

    #[test]
    fn synthetic_series_are_distinct() {
        let req = request(50);
        let mut sigs: Vec<_> = req.time_series().iter().map(TimeSeries::signature).collect();
        sigs.sort();
        sigs.dedup();
        assert_eq!(sigs.len(), 50);
    }

    #[tokio::test]
    async fn stream_mode_reports_flush_errors() {
        let transport = Arc::new(SimulatedTransport::new(Duration::ZERO, 1));
        let mut config = ExporterConfig::for_project("sim");
        config.bundler.count_threshold = 2;
        let exporter = StatsExporter::new(config, transport.clone(), SyntheticConverter).unwrap();

        let summary = stream(exporter, synthetic_metrics(3, 8, false)).await.unwrap();

        assert_eq!(transport.series(), 24);
        assert_eq!(summary.requests, 2);
        assert_eq!(summary.dropped, 6);
        assert_eq!(summary.errors().len(), 2);
    }

    #[tokio::test]
    async fn batch_export_accounts_for_injected_failures() {
        let transport = Arc::new(SimulatedTransport::new(Duration::ZERO, 1));
        let mut config = ExporterConfig::for_project("sim");
        config.batching.workers = 2;
        let exporter =
            StatsExporter::new(config, transport.clone(), SyntheticConverter).unwrap();

        let summary = exporter
            .export(&synthetic_metrics(4, 100, false))
            .await
            .unwrap();

        assert_eq!(transport.series(), 400);
        assert_eq!(summary.requests, 2);
        assert_eq!(summary.dropped, 100);
        assert_eq!(transport.descriptor_calls(), 4);
    }
}
