//! InMemoryDeliveryQueue: single-process delivery queue.
//!
//! Mutex + Condvar give a blocking pop with timeout; both operations run on
//! the blocking pool so the async workers never hold the std mutex.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::domain::TaskEnvelope;
use crate::ports::{DeliveryQueue, QueueError};

type Queues = HashMap<String, VecDeque<TaskEnvelope>>;

pub struct InMemoryDeliveryQueue {
    queues: Arc<Mutex<Queues>>,
    condvar: Arc<Condvar>,
}

impl InMemoryDeliveryQueue {
    pub fn new() -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            condvar: Arc::new(Condvar::new()),
        }
    }

    /// Envelopes waiting in `ns`.
    pub fn len(&self, ns: &str) -> usize {
        let queues = self.queues.lock().unwrap_or_else(PoisonError::into_inner);
        queues.get(ns).map_or(0, VecDeque::len)
    }
}

impl Default for InMemoryDeliveryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DeliveryQueue for InMemoryDeliveryQueue {
    async fn push(&self, ns: &str, envelope: TaskEnvelope) -> Result<(), QueueError> {
        let queues = self.queues.clone();
        let condvar = self.condvar.clone();
        let ns = ns.to_string();

        tokio::task::spawn_blocking(move || {
            let mut queues = queues.lock().unwrap_or_else(PoisonError::into_inner);
            queues.entry(ns).or_default().push_back(envelope);
            // pops wait on one condvar for every namespace
            condvar.notify_all();
        })
        .await
        .map_err(|e| QueueError::OperationFailed(format!("push failed: {e}")))
    }

    async fn pop(&self, ns: &str, timeout: Duration) -> Result<Option<TaskEnvelope>, QueueError> {
        let queues = self.queues.clone();
        let condvar = self.condvar.clone();
        let ns = ns.to_string();

        tokio::task::spawn_blocking(move || {
            let start = Instant::now();
            let mut guard = queues.lock().unwrap_or_else(PoisonError::into_inner);
            loop {
                if let Some(queue) = guard.get_mut(&ns)
                    && let Some(envelope) = queue.pop_front()
                {
                    return Some(envelope);
                }
                let elapsed = start.elapsed();
                if elapsed >= timeout {
                    return None;
                }
                let (next, _) = condvar
                    .wait_timeout(guard, timeout - elapsed)
                    .unwrap_or_else(PoisonError::into_inner);
                guard = next;
            }
        })
        .await
        .map_err(|e| QueueError::OperationFailed(format!("pop failed: {e}")))
    }
}
