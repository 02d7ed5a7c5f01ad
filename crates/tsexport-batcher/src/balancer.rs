//! Round-robin assignment of requests to workers.
//!
//! Lock-free; the counter is shared by every submitter of one pool.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Picks worker `N mod count` for the `N`th request.
#[derive(Debug, Default)]
pub struct RoundRobinBalancer {
    counter: AtomicUsize,
}

impl RoundRobinBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the worker for the next request, or `None` if there are no
    /// workers.
    pub fn next(&self, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        Some(n % count)
    }

    /// Requests assigned so far.
    pub fn assigned(&self) -> usize {
        self.counter.load(Ordering::Relaxed)
    }
}
