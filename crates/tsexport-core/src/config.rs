//! tsexport.toml configuration parser.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::ProjectName;

/// Backend limit on series per `CreateTimeSeries` call.
pub const MAX_TIME_SERIES_PER_UPLOAD: usize = 200;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    #[serde(default)]
    pub exporter: ExporterSection,
    #[serde(default)]
    pub batching: BatchingConfig,
    #[serde(default)]
    pub bundler: BundlerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExporterSection {
    pub project_id: String,
    /// Prepended to every locally named metric.
    pub metric_prefix: String,
    /// Deadline for a single transport call, e.g. "5s" or "500ms".
    pub timeout: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    pub max_time_series_per_upload: usize,
    pub workers: usize,
    pub dispatch: DispatchMode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BundlerConfig {
    pub delay_threshold: String,
    pub count_threshold: usize,
}

/// How assembled requests reach the upload workers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// One shared queue; whichever worker is idle takes the next request.
    #[default]
    Shared,
    /// Request N always goes to worker N mod workers.
    RoundRobin,
}

impl Default for ExporterSection {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            metric_prefix: String::new(),
            timeout: "5s".to_string(),
        }
    }
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            max_time_series_per_upload: MAX_TIME_SERIES_PER_UPLOAD,
            workers: 1,
            dispatch: DispatchMode::Shared,
        }
    }
}

impl Default for BundlerConfig {
    fn default() -> Self {
        Self {
            delay_threshold: "1s".to_string(),
            count_threshold: 10,
        }
    }
}

impl ExporterConfig {
    /// Minimal config for a project with every other knob at its default.
    pub fn for_project(project_id: &str) -> Self {
        let mut config = Self::default();
        config.exporter.project_id = project_id.to_string();
        config
    }

    pub fn from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        let config: ExporterConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> CoreResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject configs the pipeline cannot run with.
    pub fn validate(&self) -> CoreResult<()> {
        if self.exporter.project_id.trim().is_empty() {
            return Err(CoreError::Invalid("exporter.project_id must not be blank".into()));
        }
        if self.batching.workers == 0 {
            return Err(CoreError::Invalid("batching.workers must be at least 1".into()));
        }
        let capacity = self.batching.max_time_series_per_upload;
        if capacity == 0 || capacity > MAX_TIME_SERIES_PER_UPLOAD {
            return Err(CoreError::Invalid(format!(
                "batching.max_time_series_per_upload must be within 1..={MAX_TIME_SERIES_PER_UPLOAD}, got {capacity}"
            )));
        }
        if parse_duration(&self.exporter.timeout).is_none() {
            return Err(CoreError::Invalid(format!(
                "exporter.timeout is not a duration: {:?}",
                self.exporter.timeout
            )));
        }
        if parse_duration(&self.bundler.delay_threshold).is_none() {
            return Err(CoreError::Invalid(format!(
                "bundler.delay_threshold is not a duration: {:?}",
                self.bundler.delay_threshold
            )));
        }
        Ok(())
    }

    pub fn project_name(&self) -> ProjectName {
        ProjectName::new(&self.exporter.project_id)
    }

    pub fn timeout(&self) -> Duration {
        parse_duration(&self.exporter.timeout).unwrap_or(Duration::from_secs(5))
    }

    pub fn delay_threshold(&self) -> Duration {
        parse_duration(&self.bundler.delay_threshold).unwrap_or(Duration::from_secs(1))
    }
}

/// Parse `<digits><unit>` where the unit is `ms`, `s`, `m`, `h`, or empty
/// for seconds. Values that overflow are rejected.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (digits, unit) = s.split_at(s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len()));
    let value: u64 = digits.parse().ok()?;
    match unit {
        "ms" => Some(Duration::from_millis(value)),
        "" | "s" => Some(Duration::from_secs(value)),
        "m" => value.checked_mul(60).map(Duration::from_secs),
        "h" => value.checked_mul(3600).map(Duration::from_secs),
        _ => None,
    }
}
