//! The injected backend capability and the per-request send path.

use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;
use tsexport_core::{MetricDescriptor, ProjectName, UploadRequest};

use crate::error::{TransportError, UploadError};
use crate::partial;

/// Network access to the monitoring backend.
///
/// Implementations own retries, authentication and encoding. The pipeline
/// only needs the error text back when a call fails.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Write custom and external metric series.
    async fn create_time_series(&self, request: &UploadRequest) -> Result<(), TransportError>;

    /// Write series of built-in metric types.
    async fn create_service_time_series(
        &self,
        request: &UploadRequest,
    ) -> Result<(), TransportError>;

    async fn create_metric_descriptor(
        &self,
        project: &ProjectName,
        descriptor: &MetricDescriptor,
    ) -> Result<(), TransportError>;
}

/// Split a request into its custom part and its built-in (service) part.
///
/// Order within each part follows the original request.
pub fn split_service_time_series(
    request: UploadRequest,
) -> (Option<UploadRequest>, Option<UploadRequest>) {
    let name = request.name().clone();
    let (service, custom): (Vec<_>, Vec<_>) = request
        .into_time_series()
        .into_iter()
        .partition(|ts| ts.is_service_metric());

    let wrap = |series: Vec<_>| {
        (!series.is_empty()).then(|| UploadRequest::new(name.clone(), series))
    };
    (wrap(custom), wrap(service))
}

/// Send one request, returning how many series were dropped and why.
///
/// Custom and service series go out as separate calls. Each call is bounded
/// by `timeout` and its error is parsed against that call's own size.
pub async fn send_request(
    transport: &dyn Transport,
    request: UploadRequest,
    timeout: Duration,
) -> (usize, Vec<UploadError>) {
    let (custom, service) = split_service_time_series(request);
    let mut dropped = 0;
    let mut errors = Vec::new();

    if let Some(custom) = custom {
        let size = custom.len();
        let result = with_timeout(timeout, transport.create_time_series(&custom)).await;
        let (n, errs) = partial::parse(size, result.as_ref().err());
        dropped += n;
        errors.extend(errs);
    }

    if let Some(service) = service {
        let size = service.len();
        let result = with_timeout(timeout, transport.create_service_time_series(&service)).await;
        let (n, errs) = partial::parse(size, result.as_ref().err());
        dropped += n;
        errors.extend(errs);
    }

    if dropped > 0 {
        warn!(dropped, errors = errors.len(), "time series dropped");
    }
    (dropped, errors)
}

async fn with_timeout<F>(timeout: Duration, call: F) -> Result<(), TransportError>
where
    F: std::future::Future<Output = Result<(), TransportError>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::new(format!(
            "deadline exceeded after {}ms",
            timeout.as_millis()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use tsexport_core::{Metric, MetricKind, MonitoredResource, TimeSeries, ValueType};

    use super::*;
    use crate::testing::RecordingTransport;

    fn ts(metric_type: &str, i: usize) -> TimeSeries {
        TimeSeries {
            metric: Metric::new(metric_type).with_label("i", i.to_string()),
            resource: MonitoredResource::global(),
            metric_kind: MetricKind::Gauge,
            value_type: ValueType::Int64,
            points: Vec::new(),
        }
    }

    fn request(series: Vec<TimeSeries>) -> UploadRequest {
        UploadRequest::new(ProjectName::new("test"), series)
    }

    #[test]
    fn split_separates_builtin_metrics() {
        let req = request(vec![
            ts("custom.googleapis.com/a", 0),
            ts("kubernetes.io/container/cpu", 1),
            ts("custom.googleapis.com/a", 2),
        ]);
        let (custom, service) = split_service_time_series(req);
        let custom = custom.unwrap();
        let service = service.unwrap();
        assert_eq!(custom.len(), 2);
        assert_eq!(service.len(), 1);
        assert_eq!(custom.time_series()[1], ts("custom.googleapis.com/a", 2));
        assert_eq!(service.name().as_str(), "projects/test");
    }

    #[test]
    fn split_omits_empty_parts() {
        let (custom, service) = split_service_time_series(request(vec![ts(
            "custom.googleapis.com/a",
            0,
        )]));
        assert!(custom.is_some());
        assert!(service.is_none());
    }

    #[tokio::test]
    async fn success_drops_nothing() {
        let transport = RecordingTransport::new();
        let req = request(vec![ts("custom.googleapis.com/a", 0)]);
        let (dropped, errors) = send_request(&transport, req, Duration::from_secs(1)).await;
        assert_eq!(dropped, 0);
        assert!(errors.is_empty());
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn each_part_is_parsed_separately() {
        let partial = "One or more TimeSeries could not be written: \
            bad: timeSeries[0-16,25-44,46-74]; Unknown metric: x: timeSeries[45]";
        let transport = RecordingTransport::failing_with(partial);

        let mut series: Vec<_> = (0..75).map(|i| ts("custom.googleapis.com/a", i)).collect();
        series.extend((0..75).map(|i| ts("kubernetes.io/b", i)));

        let (dropped, errors) =
            send_request(&transport, request(series), Duration::from_secs(1)).await;
        assert_eq!(dropped, 134);
        assert_eq!(errors.len(), 4);
        assert_eq!(transport.calls(), 2);
        assert_eq!(transport.service_calls(), 1);
    }

    #[tokio::test]
    async fn whole_call_failure_drops_request() {
        let transport = RecordingTransport::failing_with("unavailable");
        let req = request((0..10).map(|i| ts("custom.googleapis.com/a", i)).collect());
        let (dropped, errors) = send_request(&transport, req, Duration::from_secs(1)).await;
        assert_eq!(dropped, 10);
        assert_eq!(
            errors,
            vec![UploadError::Transport(TransportError::new("unavailable"))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_timeout_drops_request() {
        let transport = RecordingTransport::new().with_latency(Duration::from_secs(10));
        let req = request((0..3).map(|i| ts("custom.googleapis.com/a", i)).collect());
        let (dropped, errors) = send_request(&transport, req, Duration::from_secs(1)).await;
        assert_eq!(dropped, 3);
        assert_eq!(errors[0].to_string(), "deadline exceeded after 1000ms");
    }
}
