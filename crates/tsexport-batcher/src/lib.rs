//! tsexport-batcher — the concurrent upload pipeline.
//!
//! Turns a stream of time series into bounded, duplicate-free requests,
//! sends them over a fixed pool of workers, and accounts for every series
//! the backend rejected.
//!
//! # Architecture
//!
//! ```text
//! producer ──▶ RequestAssembler ──▶ dedup::combine ──▶ WorkerPool queue
//!                (capacity window)     (unique ids)       │
//!                                                         ▼
//!                                        worker 0..N ──▶ Transport
//!                                                         │
//!                                        partial::parse ◀─┘
//!                                                         │
//! UploadSummary ◀── MetricsBatcher::close ◀── WorkerResult per worker
//! ```

pub mod assembler;
pub mod balancer;
pub mod coordinator;
pub mod dedup;
pub mod error;
pub mod partial;
pub mod pool;
pub mod transport;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

pub use assembler::RequestAssembler;
pub use coordinator::{MetricsBatcher, UploadSummary};
pub use dedup::combine;
pub use error::{BatcherError, BatcherResult, CombinedError, TransportError, UploadError};
pub use pool::{PoolConfig, WorkerPool, WorkerResult, WorkerState};
pub use transport::{Transport, send_request, split_service_time_series};
