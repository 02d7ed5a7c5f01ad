//! tsexport-core — shared vocabulary for the tsexport pipeline.
//!
//! Holds the time-series data model sent to the monitoring backend, the
//! identity rules that decide when two series collide inside one request,
//! and the `tsexport.toml` configuration parser.

pub mod config;
pub mod error;
pub mod identity;
pub mod types;

pub use config::{DispatchMode, ExporterConfig};
pub use error::{CoreError, CoreResult};
pub use identity::{is_builtin_metric, metric_signature, metric_type};
pub use types::*;
