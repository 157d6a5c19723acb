//! TaskEnvelope: what travels on the delivery queue.
//!
//! The envelope only carries the job type, a dedupe key and the JSON job
//! payload. Everything a stage needs beyond the task code is read back from
//! the task store when the job runs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task_type: String,
    /// Two envelopes with the same key must not run at the same time.
    pub dedupe_key: String,
    pub payload: serde_json::Value,
}

impl TaskEnvelope {
    pub fn new(
        task_type: impl Into<String>,
        dedupe_key: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            task_type: task_type.into(),
            dedupe_key: dedupe_key.into(),
            payload,
        }
    }
}
