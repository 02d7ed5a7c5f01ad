//! Domain types for the monitoring backend's time-series API.
//!
//! These mirror the backend's `CreateTimeSeries` payload closely enough for
//! batching decisions: a series is a metric (type + labels) observed on a
//! monitored resource, carrying one or more points.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity;

// ── Destination ────────────────────────────────────────────────────

/// Fully-qualified project scope a request is written to (`projects/<id>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProjectName(String);

impl ProjectName {
    pub fn new(project_id: &str) -> Self {
        Self(format!("projects/{}", project_id.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The bare project ID without the `projects/` prefix.
    pub fn project_id(&self) -> &str {
        self.0.strip_prefix("projects/").unwrap_or(&self.0)
    }
}

impl fmt::Display for ProjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Resource ───────────────────────────────────────────────────────

/// The entity a series is reported against (instance, container, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitoredResource {
    pub resource_type: String,
    pub labels: BTreeMap<String, String>,
}

impl MonitoredResource {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            labels: BTreeMap::new(),
        }
    }

    /// The fallback resource used when nothing was detected.
    pub fn global() -> Self {
        Self::new("global")
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

// ── Metric ─────────────────────────────────────────────────────────

/// A metric type plus the label values that distinguish one stream of it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Metric {
    /// e.g. `custom.googleapis.com/opencensus/http/latency`.
    pub metric_type: String,
    pub labels: BTreeMap<String, String>,
}

impl Metric {
    pub fn new(metric_type: impl Into<String>) -> Self {
        Self {
            metric_type: metric_type.into(),
            labels: BTreeMap::new(),
        }
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    #[default]
    Unspecified,
    Gauge,
    Cumulative,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    #[default]
    Unspecified,
    Int64,
    Double,
    Distribution,
}

// ── Points ─────────────────────────────────────────────────────────

/// Observation window of a point, in Unix nanoseconds.
///
/// Gauges carry no start time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start_unix_nanos: Option<u64>,
    pub end_unix_nanos: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub count: i64,
    pub mean: f64,
    pub sum_of_squared_deviation: f64,
    /// Explicit bucket bounds; the first bucket is `(-inf, bounds[0])`.
    pub bounds: Vec<f64>,
    pub bucket_counts: Vec<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TypedValue {
    Int64(i64),
    Double(f64),
    Distribution(Distribution),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub interval: TimeInterval,
    pub value: TypedValue,
}

// ── Time series ────────────────────────────────────────────────────

/// One labelled stream of points, as written by a single upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSeries {
    pub metric: Metric,
    pub resource: MonitoredResource,
    pub metric_kind: MetricKind,
    pub value_type: ValueType,
    pub points: Vec<Point>,
}

impl TimeSeries {
    /// Identity signature used to detect duplicates within one request.
    pub fn signature(&self) -> String {
        identity::metric_signature(&self.metric)
    }

    /// Whether this series targets a built-in (service) metric type.
    pub fn is_service_metric(&self) -> bool {
        identity::is_builtin_metric(&self.metric.metric_type)
    }
}

// ── Descriptors ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelDescriptor {
    pub key: String,
    pub description: String,
}

/// Schema for a custom metric type, created remotely before first use.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricDescriptor {
    /// `projects/<id>/metricDescriptors/<metric_type>`.
    pub name: String,
    pub metric_type: String,
    pub display_name: String,
    pub description: String,
    pub unit: String,
    pub metric_kind: MetricKind,
    pub value_type: ValueType,
    pub labels: Vec<LabelDescriptor>,
}

impl MetricDescriptor {
    pub fn new(project: &ProjectName, metric_type: impl Into<String>) -> Self {
        let metric_type = metric_type.into();
        Self {
            name: format!("{project}/metricDescriptors/{metric_type}"),
            metric_type,
            display_name: String::new(),
            description: String::new(),
            unit: String::new(),
            metric_kind: MetricKind::Unspecified,
            value_type: ValueType::Unspecified,
            labels: Vec::new(),
        }
    }
}

// ── Upload request ─────────────────────────────────────────────────

/// A bounded, ordered batch of series destined for one `CreateTimeSeries` call.
///
/// Consumed exactly once by whichever worker dequeues it.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadRequest {
    name: ProjectName,
    time_series: Vec<TimeSeries>,
}

impl UploadRequest {
    /// Build a request.
    ///
    /// # Panics
    ///
    /// Panics if `time_series` is empty: the backend rejects empty writes and
    /// nothing in the pipeline is allowed to produce one.
    pub fn new(name: ProjectName, time_series: Vec<TimeSeries>) -> Self {
        assert!(
            !time_series.is_empty(),
            "upload request for {name} must contain at least one time series"
        );
        Self { name, time_series }
    }

    pub fn name(&self) -> &ProjectName {
        &self.name
    }

    pub fn time_series(&self) -> &[TimeSeries] {
        &self.time_series
    }

    pub fn len(&self) -> usize {
        self.time_series.len()
    }

    /// Always false; kept for clippy's `len_without_is_empty`.
    pub fn is_empty(&self) -> bool {
        self.time_series.is_empty()
    }

    pub fn into_time_series(self) -> Vec<TimeSeries> {
        self.time_series
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(metric_type: &str) -> TimeSeries {
        TimeSeries {
            metric: Metric::new(metric_type),
            resource: MonitoredResource::global(),
            metric_kind: MetricKind::Gauge,
            value_type: ValueType::Int64,
            points: vec![Point {
                interval: TimeInterval::default(),
                value: TypedValue::Int64(1),
            }],
        }
    }

    #[test]
    fn project_name_formats_scope() {
        let name = ProjectName::new("demo");
        assert_eq!(name.as_str(), "projects/demo");
        assert_eq!(name.project_id(), "demo");
        assert_eq!(name.to_string(), "projects/demo");
    }

    #[test]
    fn descriptor_name_is_scoped_to_project() {
        let md = MetricDescriptor::new(
            &ProjectName::new("demo"),
            "custom.googleapis.com/opencensus/latency",
        );
        assert_eq!(
            md.name,
            "projects/demo/metricDescriptors/custom.googleapis.com/opencensus/latency"
        );
    }

    #[test]
    fn request_preserves_order() {
        let req = UploadRequest::new(
            ProjectName::new("demo"),
            vec![series("a"), series("b"), series("c")],
        );
        assert_eq!(req.len(), 3);
        let types: Vec<_> = req
            .time_series()
            .iter()
            .map(|ts| ts.metric.metric_type.as_str())
            .collect();
        assert_eq!(types, vec!["a", "b", "c"]);
    }

    #[test]
    #[should_panic(expected = "at least one time series")]
    fn empty_request_is_a_defect() {
        let _ = UploadRequest::new(ProjectName::new("demo"), Vec::new());
    }

    #[test]
    fn service_metric_detection() {
        assert!(series("kubernetes.io/container/cpu").is_service_metric());
        assert!(!series("custom.googleapis.com/opencensus/x").is_service_metric());
    }
}
