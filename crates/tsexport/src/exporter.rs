//! One-shot export of a batch of metrics.

use std::sync::Arc;

use tracing::{debug, info};
use tsexport_batcher::{BatcherResult, MetricsBatcher, Transport, UploadError, UploadSummary};
use tsexport_core::{CoreResult, ExporterConfig, MetricDescriptor, MonitoredResource, metric_type};

use crate::convert::{Converter, ResourceDetector};
use crate::descriptor::DescriptorCache;

/// Exports metrics to one project through an injected transport.
///
/// Every [`export`](Self::export) call runs its own upload cycle. The
/// descriptor cache outlives the calls.
pub struct StatsExporter<C: Converter> {
    config: ExporterConfig,
    transport: Arc<dyn Transport>,
    converter: C,
    descriptors: DescriptorCache,
    resource: MonitoredResource,
}

impl<C: Converter> StatsExporter<C> {
    /// Fails if `config` does not validate. Reports against the global
    /// resource until a detector says otherwise.
    pub fn new(
        config: ExporterConfig,
        transport: Arc<dyn Transport>,
        converter: C,
    ) -> CoreResult<Self> {
        config.validate()?;
        let descriptors = DescriptorCache::new(config.project_name(), config.timeout());
        Ok(Self {
            config,
            transport,
            converter,
            descriptors,
            resource: MonitoredResource::global(),
        })
    }

    /// Use whatever `detector` finds, keeping the current resource otherwise.
    pub fn with_resource_detector(mut self, detector: &dyn ResourceDetector) -> Self {
        match detector.detect() {
            Some(resource) => {
                info!(resource_type = %resource.resource_type, "monitored resource detected");
                self.resource = resource;
            }
            None => debug!(
                resource_type = %self.resource.resource_type,
                "no monitored resource detected"
            ),
        }
        self
    }

    pub fn config(&self) -> &ExporterConfig {
        &self.config
    }

    pub fn resource(&self) -> &MonitoredResource {
        &self.resource
    }

    pub fn converter(&self) -> &C {
        &self.converter
    }

    pub fn descriptors(&self) -> &DescriptorCache {
        &self.descriptors
    }

    /// Create missing descriptors, convert, and upload `metrics`.
    ///
    /// A metric whose descriptor cannot be created, or which fails to
    /// convert, is dropped in full and the error recorded; the rest still go
    /// out. Only a defect in the worker pool is returned as `Err`.
    pub async fn export(&self, metrics: &[C::Metric]) -> BatcherResult<UploadSummary> {
        if metrics.is_empty() {
            return Ok(UploadSummary::default());
        }

        let mut batcher = MetricsBatcher::from_config(&self.config, self.transport.clone());
        for metric in metrics {
            let count = self.converter.series_count(metric);
            if count == 0 {
                continue;
            }

            let descriptor = self.scoped_descriptor(metric);
            if let Err(source) = self
                .descriptors
                .ensure(self.transport.as_ref(), &descriptor)
                .await
            {
                batcher.record_dropped(
                    count,
                    UploadError::Descriptor {
                        metric_type: descriptor.metric_type,
                        source,
                    },
                );
                continue;
            }

            match self.converter.convert(metric, &self.resource) {
                Ok(series) => {
                    for mut ts in series {
                        ts.metric.metric_type = self.qualify(&ts.metric.metric_type);
                        batcher.add_time_series(ts).await?;
                    }
                }
                Err(message) => batcher.record_dropped(
                    count,
                    UploadError::Conversion {
                        metric: descriptor.metric_type,
                        message,
                    },
                ),
            }
        }

        batcher.close().await
    }

    /// Full metric type for a name the converter produced.
    fn qualify(&self, name: &str) -> String {
        metric_type(&self.config.exporter.metric_prefix, name)
    }

    fn scoped_descriptor(&self, metric: &C::Metric) -> MetricDescriptor {
        let mut descriptor = self.converter.descriptor(metric);
        descriptor.metric_type = self.qualify(&descriptor.metric_type);
        descriptor.name = format!(
            "{}/metricDescriptors/{}",
            self.config.project_name(),
            descriptor.metric_type
        );
        descriptor
    }
}
