//! Pipeline stages: train → detect → diagnose.
//!
//! Each stage is an async function over a `PipelineContext`. Stages only
//! communicate through the task store; the next stage is started by pushing
//! its job onto the delivery queue. Engine work runs on the blocking pool.

pub mod detection;
pub mod diagnostic;
pub mod grouping;
pub mod jobs;
#[cfg(test)]
pub(crate) mod testing;
pub mod training;

use std::sync::Arc;

use tracing::{error, warn};

use crate::components::ComponentRegistry;
use crate::domain::{
    Recording, StatusLog, TaskCode, TaskKind, TaskState, TaskStatus, TrainingTask, Upload,
    UploadCode,
};
use crate::error::{PipelineError, Result};
use crate::ports::{Clock, DeliveryQueue, IdGenerator, SignalLoader, TaskStore};
use crate::settings::Settings;
use crate::typed::Task;

pub use self::detection::{DetectionRequest, delete_detection, run_detection, submit_detection};
pub use self::diagnostic::{grouped_diagnostic_result, most_anomalous_chunks, run_diagnostic};
pub use self::grouping::{cumulative_result, frequency_index, group_adjacent_chunks};
pub use self::jobs::{DetectJob, DiagnoseJob, PIPELINE_TASK_TYPES, TrainJob};
pub use self::training::{
    TrainingRequest, available_trainings_for, delete_training, run_training, submit_training,
};

/// Shared handles every stage works with.
#[derive(Clone)]
pub struct PipelineContext {
    pub store: Arc<dyn TaskStore>,
    pub queue: Arc<dyn DeliveryQueue>,
    pub loader: Arc<dyn SignalLoader>,
    pub components: Arc<ComponentRegistry>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
    pub settings: Arc<Settings>,
}

impl PipelineContext {
    pub async fn append_status(
        &self,
        kind: TaskKind,
        code: &TaskCode,
        state: TaskState,
        message: impl Into<String>,
    ) -> Result<()> {
        let status = TaskStatus::new(state, Some(message.into()), self.clock.now());
        self.store.append_status(kind, code, status).await
    }

    pub async fn enqueue<T: Task>(&self, job: &T) -> Result<()> {
        let envelope = job.envelope()?;
        self.queue
            .push(&self.settings.queue.namespace, envelope)
            .await?;
        Ok(())
    }

    /// Records `FAILED` with the error message and hands the error back.
    pub(crate) async fn record_failure(
        &self,
        kind: TaskKind,
        code: &TaskCode,
        err: PipelineError,
    ) -> PipelineError {
        error!(%kind, task = %code, error = %err, "task failed");
        if let Err(status_err) = self
            .append_status(kind, code, TaskState::Failed, err.to_string())
            .await
        {
            error!(%kind, task = %code, error = %status_err, "could not record failure");
        }
        err
    }

    pub(crate) async fn load_recording(&self, upload: Upload) -> Result<Recording> {
        let loader = self.loader.clone();
        blocking(move || loader.load(&upload)).await
    }

    pub(crate) async fn load_recordings(&self, codes: &[UploadCode]) -> Result<Vec<Recording>> {
        let mut uploads = Vec::with_capacity(codes.len());
        for code in codes {
            uploads.push(self.store.get_upload(code).await?);
        }
        let loader = self.loader.clone();
        blocking(move || uploads.iter().map(|u| loader.load(u)).collect()).await
    }
}

/// Runs engine work on the blocking pool.
pub(crate) async fn blocking<R, F>(f: F) -> Result<R>
where
    F: FnOnce() -> Result<R> + Send + 'static,
    R: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| PipelineError::Engine(format!("engine task aborted: {e}")))?
}

/// Logs a missing record at dispatch; the task cannot carry a status then.
pub(crate) fn warn_missing<T>(result: Result<T>, kind: TaskKind, code: &TaskCode) -> Result<T> {
    if let Err(err) = &result
        && err.is_not_found()
    {
        warn!(%kind, task = %code, error = %err, "cannot run task");
    }
    result
}

/// A job delivered again after its task reached a terminal state is skipped
/// without touching the status log.
pub(crate) fn already_completed(
    statuses: &StatusLog,
    kind: TaskKind,
    code: &TaskCode,
) -> bool {
    let completed = statuses.is_completed();
    if completed {
        warn!(
            %kind,
            task = %code,
            state = ?statuses.current(),
            "task already completed, skipping job"
        );
    }
    completed
}

/// Whether the task's engine works on spectra. Detection and diagnostic tasks
/// inherit the flag of their training.
pub async fn is_frequency_domain(
    ctx: &PipelineContext,
    kind: TaskKind,
    code: &TaskCode,
) -> Result<bool> {
    let training = training_behind(ctx, kind, code).await?;
    Ok(training.has_fft_enabled())
}

async fn training_behind(
    ctx: &PipelineContext,
    kind: TaskKind,
    code: &TaskCode,
) -> Result<TrainingTask> {
    let detection_code = match kind {
        TaskKind::Training => return ctx.store.get_training(code).await,
        TaskKind::Detection => code.clone(),
        TaskKind::Diagnostic => ctx.store.get_diagnostic(code).await?.detection_code,
    };
    let detection = ctx.store.get_detection(&detection_code).await?;
    ctx.store.get_training(&detection.training_code).await
}
