//! WorkerGroup: pops envelopes from the delivery queue and runs them.
//!
//! Each worker loops pop → execute until shutdown is requested through the
//! watch channel. Shutdown is only checked between pops: the pop times out on
//! its own, and an envelope that has been popped is always executed. An
//! envelope whose dedupe key is already running on another worker is dropped
//! with a warning.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::runtime::Runtime;

type InFlight = Arc<Mutex<HashSet<String>>>;

/// Releases a dedupe key when the job is done, even if the handler panics.
struct InFlightGuard {
    keys: InFlight,
    key: String,
}

impl InFlightGuard {
    fn acquire(keys: &InFlight, key: &str) -> Option<Self> {
        let mut set = keys.lock().unwrap_or_else(PoisonError::into_inner);
        set.insert(key.to_string()).then(|| Self {
            keys: keys.clone(),
            key: key.to_string(),
        })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

/// Worker group handle.
/// - dropping the group or calling `request_shutdown` stops every worker
///   after its current pop and job, within one poll timeout
/// - `shutdown_and_join` waits for all of them
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawns `n` workers on the runtime's queue namespace.
    pub fn spawn(n: usize, runtime: Arc<Runtime>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let in_flight: InFlight = Arc::default();
        let poll_timeout = runtime.context().settings.queue.poll_timeout();

        let joins = (0..n)
            .map(|worker_id| {
                let runtime = Arc::clone(&runtime);
                let in_flight = Arc::clone(&in_flight);
                let rx = shutdown_rx.clone();
                tokio::spawn(async move {
                    worker_loop(worker_id, runtime, in_flight, poll_timeout, rx).await;
                })
            })
            .collect();
        info!(workers = n, "worker group started");

        Self { shutdown_tx, joins }
    }

    /// Stops taking new jobs. Running handlers are not cancelled.
    pub fn request_shutdown(&self) {
        // receivers may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(err) = join.await {
                error!(error = %err, "worker ended abnormally");
            }
        }
        info!("worker group stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    runtime: Arc<Runtime>,
    in_flight: InFlight,
    poll_timeout: Duration,
    shutdown_rx: watch::Receiver<bool>,
) {
    let ctx = runtime.context();
    let namespace = ctx.settings.queue.namespace.clone();
    // an Err from has_changed means the group handle is gone
    while !*shutdown_rx.borrow() && shutdown_rx.has_changed().is_ok() {
        let envelope = match ctx.queue.pop(&namespace, poll_timeout).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => continue,
            Err(err) => {
                error!(worker_id, error = %err, "queue pop failed");
                tokio::time::sleep(poll_timeout).await;
                continue;
            }
        };

        let Some(_guard) = InFlightGuard::acquire(&in_flight, &envelope.dedupe_key) else {
            warn!(worker_id, key = %envelope.dedupe_key, "job already running, dropping duplicate");
            continue;
        };

        debug!(worker_id, task_type = %envelope.task_type, key = %envelope.dedupe_key, "running job");
        match runtime.execute(&envelope).await {
            Ok(()) => info!(worker_id, key = %envelope.dedupe_key, "job done"),
            Err(err) => error!(
                worker_id,
                key = %envelope.dedupe_key,
                error = %err,
                "job failed"
            ),
        }
    }
    debug!(worker_id, "worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_flight_keys_are_exclusive_until_released() {
        let keys: InFlight = Arc::default();
        let first = InFlightGuard::acquire(&keys, "train:a");
        assert!(first.is_some());
        assert!(InFlightGuard::acquire(&keys, "train:a").is_none());
        assert!(InFlightGuard::acquire(&keys, "train:b").is_some());

        drop(first);
        assert!(InFlightGuard::acquire(&keys, "train:a").is_some());
    }
}
