//! In-memory transports for tests.
//!
//! Enabled for this crate's own tests and, through the `test-utils` feature,
//! for downstream crates.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tsexport_core::{MetricDescriptor, ProjectName, UploadRequest};

use crate::error::TransportError;
use crate::transport::Transport;

type Responder = dyn Fn(&UploadRequest) -> Result<(), TransportError> + Send + Sync;
type DescriptorResponder = dyn Fn(&MetricDescriptor) -> Result<(), TransportError> + Send + Sync;

/// A transport that records every call and answers from closures.
pub struct RecordingTransport {
    respond: Box<Responder>,
    respond_descriptor: Box<DescriptorResponder>,
    latency: Duration,
    requests: Mutex<Vec<UploadRequest>>,
    descriptors: Mutex<Vec<MetricDescriptor>>,
    calls: AtomicUsize,
    service_calls: AtomicUsize,
    descriptor_calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl RecordingTransport {
    /// Accept everything.
    pub fn new() -> Self {
        Self::with_responder(|_| Ok(()))
    }

    /// Reject every time-series call with `message`.
    pub fn failing_with(message: &str) -> Self {
        let message = message.to_string();
        Self::with_responder(move |_| Err(TransportError::new(message.clone())))
    }

    /// Answer time-series calls with `respond`.
    pub fn with_responder<F>(respond: F) -> Self
    where
        F: Fn(&UploadRequest) -> Result<(), TransportError> + Send + Sync + 'static,
    {
        Self {
            respond: Box::new(respond),
            respond_descriptor: Box::new(|_| Ok(())),
            latency: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
            descriptors: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            service_calls: AtomicUsize::new(0),
            descriptor_calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Answer descriptor calls with `respond`.
    pub fn with_descriptor_responder<F>(mut self, respond: F) -> Self
    where
        F: Fn(&MetricDescriptor) -> Result<(), TransportError> + Send + Sync + 'static,
    {
        self.respond_descriptor = Box::new(respond);
        self
    }

    /// Sleep this long inside every call.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Every time-series request received, in arrival order.
    pub fn requests(&self) -> Vec<UploadRequest> {
        lock(&self.requests).clone()
    }

    pub fn descriptors(&self) -> Vec<MetricDescriptor> {
        lock(&self.descriptors).clone()
    }

    /// Time-series calls on either endpoint.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn service_calls(&self) -> usize {
        self.service_calls.load(Ordering::SeqCst)
    }

    pub fn descriptor_calls(&self) -> usize {
        self.descriptor_calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls observed in progress at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn record(&self, request: &UploadRequest) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        lock(&self.requests).push(request.clone());
        let result = (self.respond)(request);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn create_time_series(&self, request: &UploadRequest) -> Result<(), TransportError> {
        self.record(request).await
    }

    async fn create_service_time_series(
        &self,
        request: &UploadRequest,
    ) -> Result<(), TransportError> {
        self.service_calls.fetch_add(1, Ordering::SeqCst);
        self.record(request).await
    }

    async fn create_metric_descriptor(
        &self,
        _project: &ProjectName,
        descriptor: &MetricDescriptor,
    ) -> Result<(), TransportError> {
        self.descriptor_calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        lock(&self.descriptors).push(descriptor.clone());
        (self.respond_descriptor)(descriptor)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
