//! Error types for the upload pipeline.
//!
//! Two families live here. [`BatcherError`] covers defects in driving the
//! pipeline itself (a closed queue, a worker that panicked). [`UploadError`]
//! covers operational losses: time series that did not reach the backend.
//! The latter are cloned into summaries and never abort the pipeline.

use std::fmt;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type BatcherResult<T> = Result<T, BatcherError>;

/// Failures in driving the worker pool.
#[derive(Debug, Error)]
pub enum BatcherError {
    #[error("worker pool is closed")]
    PoolClosed,

    #[error("upload worker {worker} failed: {source}")]
    WorkerFailed {
        worker: usize,
        #[source]
        source: tokio::task::JoinError,
    },
}

/// Error returned by a [`Transport`](crate::Transport) call.
///
/// Carries the backend's message verbatim, since partial-failure accounting
/// depends on its exact text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError {
    message: String,
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for TransportError {}

impl From<String> for TransportError {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for TransportError {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Why some time series were dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// The whole call failed, or its message could not be parsed.
    #[error("{0}")]
    Transport(TransportError),

    /// One cause within a partial-failure response.
    #[error("{description}: timeSeries[{ranges}]")]
    PartialFailure {
        description: String,
        ranges: String,
        points: usize,
    },

    #[error("failed to create metric descriptor {metric_type}: {source}")]
    Descriptor {
        metric_type: String,
        source: TransportError,
    },

    #[error("failed to convert metric {metric}: {message}")]
    Conversion { metric: String, message: String },
}

/// Every error from one upload cycle, rendered as a single error.
///
/// One error displays as itself; several display as `[e1; e2; ...]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CombinedError {
    errors: Vec<UploadError>,
}

impl CombinedError {
    /// Returns `None` when there is nothing to report.
    pub fn from_errors(errors: Vec<UploadError>) -> Option<Self> {
        if errors.is_empty() {
            None
        } else {
            Some(Self { errors })
        }
    }

    pub fn errors(&self) -> &[UploadError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<UploadError> {
        self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for CombinedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let [only] = self.errors.as_slice() {
            return write!(f, "{only}");
        }
        f.write_str("[")?;
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{err}")?;
        }
        f.write_str("]")
    }
}

impl std::error::Error for CombinedError {}
