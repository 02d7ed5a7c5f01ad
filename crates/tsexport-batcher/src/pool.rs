//! Fixed-size pool of upload workers.
//!
//! Requests travel over bounded `async_channel` queues whose total capacity
//! equals the worker count, so a producer waits only while every worker is
//! busy and every slot is taken. Each worker owns its tally and hands it
//! back through its `JoinHandle`; nothing is shared between workers.
//!
//! Every transport call runs in its own task. A call that panics costs its
//! request, which is counted as dropped; the worker carries on.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_channel::{Receiver, Sender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use tsexport_core::{DispatchMode, ExporterConfig, UploadRequest};

use crate::balancer::RoundRobinBalancer;
use crate::error::{BatcherError, BatcherResult, TransportError, UploadError};
use crate::transport::{Transport, send_request};

/// Worker pool settings.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of concurrent senders.
    pub workers: usize,
    pub dispatch: DispatchMode,
    /// Deadline for each transport call.
    pub timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            dispatch: DispatchMode::Shared,
            timeout: Duration::from_secs(5),
        }
    }
}

impl PoolConfig {
    pub fn from_config(config: &ExporterConfig) -> Self {
        Self {
            workers: config.batching.workers,
            dispatch: config.batching.dispatch,
            timeout: config.timeout(),
        }
    }
}

/// Lifecycle of one upload worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Waiting for a request.
    Idle,
    /// A transport call is in flight.
    Sending,
    /// The queue is closed; finishing what is left in it.
    Draining,
    /// Done; its result has been handed back.
    Terminated,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Idle => "idle",
            WorkerState::Sending => "sending",
            WorkerState::Draining => "draining",
            WorkerState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}

/// What one worker (or the coordinator's own sends) accounted for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerResult {
    /// Requests handed to the transport.
    pub requests: usize,
    pub dropped: usize,
    pub errors: Vec<UploadError>,
}

impl WorkerResult {
    /// Account for one finished request.
    pub fn record(&mut self, dropped: usize, errors: Vec<UploadError>) {
        self.requests += 1;
        self.dropped += dropped;
        self.errors.extend(errors);
    }

    /// Account for series lost before reaching the transport.
    pub fn record_dropped(&mut self, dropped: usize, error: UploadError) {
        self.dropped += dropped;
        self.errors.push(error);
    }

    /// Fold another tally into this one. Order of merging does not matter
    /// beyond the order of the error list.
    pub fn merge(&mut self, other: WorkerResult) {
        self.requests += other.requests;
        self.dropped += other.dropped;
        self.errors.extend(other.errors);
    }
}

enum Dispatcher {
    /// One queue; any idle worker takes the next request.
    Shared(Sender<UploadRequest>),
    /// One queue per worker; request N goes to worker N mod len.
    RoundRobin {
        queues: Vec<Sender<UploadRequest>>,
        balancer: RoundRobinBalancer,
    },
}

/// A running set of upload workers.
pub struct WorkerPool {
    dispatcher: Dispatcher,
    handles: Vec<JoinHandle<WorkerResult>>,
}

impl WorkerPool {
    /// Spawn `config.workers` workers on the current runtime.
    ///
    /// # Panics
    ///
    /// Panics if `config.workers` is zero.
    pub fn start(config: &PoolConfig, transport: Arc<dyn Transport>) -> Self {
        assert!(config.workers > 0, "worker pool needs at least 1 worker");
        let workers = config.workers;

        let (dispatcher, receivers) = match config.dispatch {
            DispatchMode::Shared => {
                let (tx, rx) = async_channel::bounded(workers);
                (Dispatcher::Shared(tx), vec![rx; workers])
            }
            DispatchMode::RoundRobin => {
                let (queues, receivers): (Vec<_>, Vec<_>) =
                    (0..workers).map(|_| async_channel::bounded(1)).unzip();
                let dispatcher = Dispatcher::RoundRobin {
                    queues,
                    balancer: RoundRobinBalancer::new(),
                };
                (dispatcher, receivers)
            }
        };

        let handles = receivers
            .into_iter()
            .enumerate()
            .map(|(id, rx)| tokio::spawn(run_worker(id, rx, transport.clone(), config.timeout)))
            .collect();

        info!(
            workers,
            dispatch = ?config.dispatch,
            timeout_ms = config.timeout.as_millis() as u64,
            "upload worker pool started"
        );

        Self {
            dispatcher,
            handles,
        }
    }

    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    /// Queue a request, waiting while the queue is full.
    pub async fn submit(&self, request: UploadRequest) -> BatcherResult<()> {
        let queue = match &self.dispatcher {
            Dispatcher::Shared(tx) => tx,
            Dispatcher::RoundRobin { queues, balancer } => {
                let idx = balancer
                    .next(queues.len())
                    .ok_or(BatcherError::PoolClosed)?;
                &queues[idx]
            }
        };
        queue
            .send(request)
            .await
            .map_err(|_| BatcherError::PoolClosed)
    }

    /// Close the queues, wait for every worker to drain, and merge their
    /// results.
    ///
    /// Every worker is joined before this returns, even when one of them
    /// failed; the first failure is then reported.
    pub async fn close(self) -> BatcherResult<WorkerResult> {
        let Self {
            dispatcher,
            handles,
        } = self;
        drop(dispatcher);

        let mut merged = WorkerResult::default();
        let mut failure = None;
        for (worker, handle) in handles.into_iter().enumerate() {
            match handle.await {
                Ok(result) => merged.merge(result),
                Err(source) => {
                    warn!(worker, error = %source, "upload worker failed");
                    if failure.is_none() {
                        failure = Some(BatcherError::WorkerFailed { worker, source });
                    }
                }
            }
        }

        info!(
            requests = merged.requests,
            dropped = merged.dropped,
            errors = merged.errors.len(),
            "upload worker pool stopped"
        );
        match failure {
            Some(err) => Err(err),
            None => Ok(merged),
        }
    }
}

async fn run_worker(
    id: usize,
    rx: Receiver<UploadRequest>,
    transport: Arc<dyn Transport>,
    timeout: Duration,
) -> WorkerResult {
    let mut result = WorkerResult::default();
    let mut state = WorkerState::Idle;

    while let Ok(request) = rx.recv().await {
        state = transition(id, state, WorkerState::Sending);
        let size = request.len();
        let (dropped, errors) = send_isolated(transport.clone(), request, timeout).await;
        debug!(worker = id, size, dropped, "request sent");
        result.record(dropped, errors);

        let next = if rx.is_closed() {
            WorkerState::Draining
        } else {
            WorkerState::Idle
        };
        state = transition(id, state, next);
    }

    if state != WorkerState::Draining {
        state = transition(id, state, WorkerState::Draining);
    }
    transition(id, state, WorkerState::Terminated);
    result
}

/// Send `request` in a task of its own. A panic there drops the whole
/// request instead of the caller.
pub(crate) async fn send_isolated(
    transport: Arc<dyn Transport>,
    request: UploadRequest,
    timeout: Duration,
) -> (usize, Vec<UploadError>) {
    let size = request.len();
    let send = tokio::spawn(async move { send_request(transport.as_ref(), request, timeout).await });
    match send.await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(size, error = %e, "upload task failed");
            let error = TransportError::new(format!("upload task failed: {e}"));
            (size, vec![UploadError::Transport(error)])
        }
    }
}

fn transition(id: usize, from: WorkerState, to: WorkerState) -> WorkerState {
    if from != to {
        debug!(worker = id, %from, %to, "worker state");
    }
    to
}
