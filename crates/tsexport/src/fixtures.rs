//! A minimal gauge model for exercising the exporter in tests.

use tsexport_core::{
    Metric, MetricDescriptor, MetricKind, MonitoredResource, Point, TimeInterval, TimeSeries,
    TypedValue, ValueType,
};

use crate::convert::Converter;

#[derive(Debug, Clone)]
pub struct GaugeMetric {
    pub name: String,
    pub series: usize,
    pub fail: bool,
}

impl GaugeMetric {
    pub fn new(name: &str, series: usize) -> Self {
        Self {
            name: name.to_string(),
            series,
            fail: false,
        }
    }

    /// A metric whose conversion always fails.
    pub fn failing(name: &str, series: usize) -> Self {
        Self {
            fail: true,
            ..Self::new(name, series)
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct GaugeConverter;

impl Converter for GaugeConverter {
    type Metric = GaugeMetric;

    fn descriptor(&self, metric: &GaugeMetric) -> MetricDescriptor {
        MetricDescriptor {
            name: String::new(),
            metric_type: metric.name.clone(),
            display_name: metric.name.clone(),
            description: String::new(),
            unit: "1".to_string(),
            metric_kind: MetricKind::Gauge,
            value_type: ValueType::Int64,
            labels: Vec::new(),
        }
    }

    fn series_count(&self, metric: &GaugeMetric) -> usize {
        metric.series
    }

    fn convert(
        &self,
        metric: &GaugeMetric,
        resource: &MonitoredResource,
    ) -> Result<Vec<TimeSeries>, String> {
        if metric.fail {
            return Err(format!("{} has no points", metric.name));
        }
        Ok((0..metric.series)
            .map(|i| TimeSeries {
                metric: Metric::new(metric.name.clone()).with_label("index", i.to_string()),
                resource: resource.clone(),
                metric_kind: MetricKind::Gauge,
                value_type: ValueType::Int64,
                points: vec![Point {
                    interval: TimeInterval {
                        start_unix_nanos: None,
                        end_unix_nanos: 1,
                    },
                    value: TypedValue::Int64(i as i64),
                }],
            })
            .collect())
    }
}
