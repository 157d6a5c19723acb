//! Task trait: binds a job payload type to its `task_type` string.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::TaskEnvelope;
use crate::error::Result;

/// A job payload that can travel in a `TaskEnvelope`.
///
/// `TYPE` follows `{namespace}.{domain}.{action}.v{major}`, e.g.
/// `vigil.pipeline.train.v1`.
pub trait Task: Serialize + DeserializeOwned + Send + Sync + 'static {
    const TYPE: &'static str;

    /// Jobs sharing a key are never executed concurrently.
    fn dedupe_key(&self) -> String;

    fn envelope(&self) -> Result<TaskEnvelope> {
        Ok(TaskEnvelope::new(
            Self::TYPE,
            self.dedupe_key(),
            serde_json::to_value(self)?,
        ))
    }
}
