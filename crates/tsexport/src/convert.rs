//! Seams to the caller's metric model and environment.

use tsexport_core::{MetricDescriptor, MonitoredResource, TimeSeries};

/// Turns the caller's metric objects into backend time series.
///
/// Implementations are pure: the same metric always yields the same
/// descriptor and series.
///
/// Metric types are returned as local names. The exporter qualifies them
/// with the configured `metric_prefix` and default domain, so a converter
/// never sees the exporter's naming settings.
pub trait Converter: Send + Sync + 'static {
    type Metric: Send + Sync + 'static;

    /// Schema of `metric`. The exporter qualifies its `metric_type` and
    /// scopes its `name` to the project.
    fn descriptor(&self, metric: &Self::Metric) -> MetricDescriptor;

    /// How many series `metric` holds before conversion. Zero means the
    /// metric is skipped.
    fn series_count(&self, metric: &Self::Metric) -> usize;

    fn convert(
        &self,
        metric: &Self::Metric,
        resource: &MonitoredResource,
    ) -> Result<Vec<TimeSeries>, String>;
}

/// Finds the monitored resource this process reports against.
pub trait ResourceDetector: Send + Sync {
    /// `None` when nothing was detected.
    fn detect(&self) -> Option<MonitoredResource>;
}

impl<F> ResourceDetector for F
where
    F: Fn() -> Option<MonitoredResource> + Send + Sync,
{
    fn detect(&self) -> Option<MonitoredResource> {
        self()
    }
}

/// Always reports the same resource.
#[derive(Debug, Clone)]
pub struct FixedResource(pub MonitoredResource);

impl ResourceDetector for FixedResource {
    fn detect(&self) -> Option<MonitoredResource> {
        Some(self.0.clone())
    }
}
