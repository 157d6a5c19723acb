use thiserror::Error;

use crate::domain::TaskKind;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Debug, Error)]
pub enum PipelineError {
    /// A referenced upload, task or configuration does not exist.
    #[error("{what} not found: {key}")]
    NotFound { what: &'static str, key: String },

    /// A required configuration key is missing or has the wrong type.
    #[error("configuration error: {0}")]
    Config(String),

    /// Raised by a training/detection/diagnose collaborator.
    #[error("engine error: {0}")]
    Engine(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("queue error: {0}")]
    Queue(String),

    /// Unknown class name or handler lookup failure.
    #[error("registry error: {0}")]
    Registry(String),

    #[error("{kind} task with code {code} already exists")]
    DuplicateTask { kind: TaskKind, code: String },

    /// Results are written once per task.
    #[error("{kind} result for task {code} already exists")]
    ResultExists { kind: TaskKind, code: String },

    /// A record other tasks still point at.
    #[error("{what} {key} is still referenced by {by}")]
    InUse {
        what: &'static str,
        key: String,
        by: String,
    },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn not_found(what: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            what,
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
