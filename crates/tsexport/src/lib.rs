//! tsexport — exports caller-defined metrics to a time-series backend.
//!
//! [`StatsExporter`] converts a batch of metrics, makes sure each custom
//! metric's descriptor exists remotely, and uploads the resulting series
//! through the `tsexport-batcher` pipeline. [`MetricsBundler`] sits in front
//! of it for callers that produce metrics continuously.

pub mod bundler;
pub mod convert;
pub mod descriptor;
pub mod exporter;

#[cfg(test)]
mod fixtures;

pub use bundler::MetricsBundler;
pub use convert::{Converter, FixedResource, ResourceDetector};
pub use descriptor::DescriptorCache;
pub use exporter::StatsExporter;
pub use tsexport_batcher::{CombinedError, UploadError, UploadSummary};
