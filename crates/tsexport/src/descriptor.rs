//! Once-per-metric remote descriptor creation.
//!
//! Concurrent misses for one metric type share a single in-flight call and
//! all see its outcome. Successes are remembered for the life of the cache;
//! a failure is handed to everyone waiting on that call and then forgotten,
//! so the next export tries again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};
use tsexport_batcher::{Transport, TransportError};
use tsexport_core::{MetricDescriptor, ProjectName, is_builtin_metric};

type Slot = Arc<OnceCell<Result<(), TransportError>>>;

pub struct DescriptorCache {
    project: ProjectName,
    timeout: Duration,
    slots: Mutex<HashMap<String, Slot>>,
}

impl DescriptorCache {
    pub fn new(project: ProjectName, timeout: Duration) -> Self {
        Self {
            project,
            timeout,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Make sure `descriptor` exists remotely.
    ///
    /// Built-in metric types are owned by the backend and never created.
    pub async fn ensure(
        &self,
        transport: &dyn Transport,
        descriptor: &MetricDescriptor,
    ) -> Result<(), TransportError> {
        if is_builtin_metric(&descriptor.metric_type) {
            return Ok(());
        }

        let key = descriptor.metric_type.as_str();
        let slot = self.slots.lock().await.entry(key.to_string()).or_default().clone();

        let result = slot
            .get_or_init(|| async {
                debug!(metric_type = key, "creating metric descriptor");
                match tokio::time::timeout(
                    self.timeout,
                    transport.create_metric_descriptor(&self.project, descriptor),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(TransportError::new(format!(
                        "deadline exceeded after {}ms",
                        self.timeout.as_millis()
                    ))),
                }
            })
            .await
            .clone();

        if let Err(err) = &result {
            warn!(metric_type = key, error = %err, "metric descriptor creation failed");
            let mut slots = self.slots.lock().await;
            if slots.get(key).is_some_and(|current| Arc::ptr_eq(current, &slot)) {
                slots.remove(key);
            }
        }
        result
    }

    /// Whether `metric_type` has been created successfully.
    pub async fn is_created(&self, metric_type: &str) -> bool {
        self.slots
            .lock()
            .await
            .get(metric_type)
            .and_then(|slot| slot.get())
            .is_some_and(Result::is_ok)
    }
}
