//! Shared fixtures for pipeline integration tests.

#![allow(dead_code)]

use tsexport_batcher::testing::RecordingTransport;
use tsexport_core::{
    Metric, MetricKind, MonitoredResource, Point, ProjectName, TimeInterval, TimeSeries,
    TypedValue, UploadRequest, ValueType,
};

pub const PARTIAL_PREFIX: &str = "One or more TimeSeries could not be written:";

/// Per request, its sorted signatures; the whole list sorted too.
pub fn request_contents(transport: &RecordingTransport) -> Vec<Vec<String>> {
    let mut contents: Vec<Vec<String>> = transport
        .requests()
        .iter()
        .map(|r| {
            let mut sigs: Vec<_> = r.time_series().iter().map(TimeSeries::signature).collect();
            sigs.sort();
            sigs
        })
        .collect();
    contents.sort();
    contents
}

pub fn project() -> ProjectName {
    ProjectName::new("pipeline-test")
}

/// A gauge series whose identity is `(metric_type, index)`.
pub fn series(metric_type: &str, index: usize) -> TimeSeries {
    TimeSeries {
        metric: Metric::new(metric_type).with_label("index", index.to_string()),
        resource: MonitoredResource::global(),
        metric_kind: MetricKind::Gauge,
        value_type: ValueType::Int64,
        points: vec![Point {
            interval: TimeInterval {
                start_unix_nanos: None,
                end_unix_nanos: 1_000,
            },
            value: TypedValue::Int64(index as i64),
        }],
    }
}

/// `n` distinct custom series.
pub fn distinct_series(n: usize) -> Vec<TimeSeries> {
    (0..n)
        .map(|i| series("custom.googleapis.com/opencensus/pipeline", i))
        .collect()
}

/// Index label of the first series in a request.
pub fn first_index(request: &UploadRequest) -> usize {
    request.time_series()[0].metric.labels["index"]
        .parse()
        .unwrap()
}
