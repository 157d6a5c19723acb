//! DeliveryQueue port.
//!
//! Carries `TaskEnvelope`s from submission to the worker group. The queue
//! holds no task state; statuses and results live in the `TaskStore`.
//! Namespaces keep independent deployments on one backend apart.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::TaskEnvelope;
use crate::error::PipelineError;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue operation failed: {0}")]
    OperationFailed(String),
}

impl From<QueueError> for PipelineError {
    fn from(err: QueueError) -> Self {
        PipelineError::Queue(err.to_string())
    }
}

#[async_trait]
pub trait DeliveryQueue: Send + Sync {
    async fn push(&self, ns: &str, envelope: TaskEnvelope) -> Result<(), QueueError>;

    /// Waits up to `timeout` for an envelope; `None` on timeout.
    async fn pop(&self, ns: &str, timeout: Duration) -> Result<Option<TaskEnvelope>, QueueError>;
}
