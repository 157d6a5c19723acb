//! Detection stage.
//!
//! A detection scores every chunk of one upload with a finished training's
//! model. On success it creates the diagnostic task for the same code and
//! enqueues it.

use tracing::{debug, info};

use super::jobs::{DetectJob, DiagnoseJob};
use super::{PipelineContext, already_completed, blocking, warn_missing};
use crate::domain::{
    CompanyConfiguration, CompanyId, DetectionResult, DetectionTask, DiagnosticTask, Sample,
    StatusLog, TaskCode, TaskKind, TaskState, TrainingTask, Upload, UploadCode,
};
use crate::error::{PipelineError, Result};
use crate::ports::Detective;

#[derive(Debug, Clone, PartialEq)]
pub struct DetectionRequest {
    pub name: String,
    pub company_id: CompanyId,
    pub upload_code: UploadCode,
    pub training_code: TaskCode,
}

pub async fn submit_detection(
    ctx: &PipelineContext,
    request: DetectionRequest,
) -> Result<DetectionTask> {
    let upload = ctx.store.get_upload(&request.upload_code).await?;
    let training = ctx.store.get_training(&request.training_code).await?;
    if upload.company_id != request.company_id || training.company_id != request.company_id {
        return Err(PipelineError::InvalidInput(format!(
            "upload {} and training {} must both belong to company {}",
            upload.code, training.code, request.company_id
        )));
    }
    if !training.is_successful() {
        return Err(PipelineError::InvalidInput(format!(
            "training {} has not finished successfully",
            training.code
        )));
    }
    if training.datasource_configuration_id != upload.datasource_configuration_id {
        return Err(PipelineError::InvalidInput(format!(
            "training {} was not trained on the datasource of upload {}",
            training.code, upload.code
        )));
    }

    let code = ctx.ids.generate_task_code();
    let task = DetectionTask {
        code: code.clone(),
        name: request.name,
        company_id: request.company_id,
        upload_code: request.upload_code,
        training_code: request.training_code,
        created_at: ctx.clock.now(),
        statuses: StatusLog::new(),
    };
    ctx.store.insert_detection(task).await?;
    ctx.append_status(
        TaskKind::Detection,
        &code,
        TaskState::Queued,
        "Task has been enqueued",
    )
    .await?;
    ctx.enqueue(&DetectJob { code: code.clone() }).await?;
    info!(task = %code, "detection enqueued");

    ctx.store.get_detection(&code).await
}

/// Records a detection depends on, fetched before any status is written.
struct DetectionInputs {
    task: DetectionTask,
    upload: Upload,
    training: TrainingTask,
    company: CompanyConfiguration,
}

async fn detection_inputs(ctx: &PipelineContext, code: &TaskCode) -> Result<DetectionInputs> {
    let task = ctx.store.get_detection(code).await?;
    let upload = ctx.store.get_upload(&task.upload_code).await?;
    let training = ctx.store.get_training(&task.training_code).await?;
    let company = ctx
        .store
        .active_company_configuration(task.company_id)
        .await?;
    Ok(DetectionInputs {
        task,
        upload,
        training,
        company,
    })
}

pub async fn run_detection(ctx: &PipelineContext, code: &TaskCode) -> Result<()> {
    let inputs = warn_missing(
        detection_inputs(ctx, code).await,
        TaskKind::Detection,
        code,
    )?;
    if already_completed(&inputs.task.statuses, TaskKind::Detection, code) {
        return Ok(());
    }

    ctx.append_status(
        TaskKind::Detection,
        code,
        TaskState::InProgress,
        "Detection in progress",
    )
    .await?;

    if let Err(err) = detect(ctx, &inputs).await {
        return Err(ctx.record_failure(TaskKind::Detection, code, err).await);
    }
    ctx.append_status(
        TaskKind::Detection,
        code,
        TaskState::Successful,
        format!("Task {code} has finished"),
    )
    .await?;
    info!(task = %code, "detection finished");

    trigger_diagnostic(ctx, &inputs.task).await
}

async fn detect(ctx: &PipelineContext, inputs: &DetectionInputs) -> Result<()> {
    let (detective, sample) = prepare_inference(
        ctx,
        &inputs.training,
        inputs.upload.clone(),
        &inputs.company,
    )
    .await?;
    let result = blocking(move || {
        let scores = detective.detect(&sample)?;
        Ok(DetectionResult::new(
            scores,
            sample.number_of_timesteps,
            sample.sample_rate,
        ))
    })
    .await?;
    debug!(task = %inputs.task.code, chunks = result.scores.len(), "scored upload");
    ctx.store
        .save_detection_result(&inputs.task.code, result)
        .await
}

/// Restores the training's model and turns `upload` into the sample it
/// scores. The transformer is refitted on the training's own recordings so
/// both stages normalize the same way.
pub(crate) async fn prepare_inference(
    ctx: &PipelineContext,
    training: &TrainingTask,
    upload: Upload,
    company: &CompanyConfiguration,
) -> Result<(Box<dyn Detective>, Sample)> {
    let configuration = training
        .configuration
        .with_root_folder(&ctx.settings.train_root_folder)?
        .for_inference()?;
    let detective = ctx.components.detective(&configuration)?;
    let mut transformer = ctx.components.transformer(&configuration)?;
    let datasource = ctx.components.datasource(&company.configuration)?;

    let training_recordings = ctx.load_recordings(&training.upload_codes).await?;
    let recording = ctx.load_recording(upload).await?;
    blocking(move || {
        transformer.fit(&training_recordings)?;
        let (_, test) = datasource
            .detection(&recording, transformer.as_ref())?
            .into_parts();
        Ok((detective, test))
    })
    .await
}

async fn trigger_diagnostic(ctx: &PipelineContext, detection: &DetectionTask) -> Result<()> {
    let code = detection.code.clone();
    ctx.store
        .insert_diagnostic(DiagnosticTask {
            code: code.clone(),
            detection_code: detection.code.clone(),
            upload_code: detection.upload_code.clone(),
            company_id: detection.company_id,
            created_at: ctx.clock.now(),
            statuses: StatusLog::new(),
        })
        .await?;
    ctx.append_status(
        TaskKind::Diagnostic,
        &code,
        TaskState::Queued,
        format!("Diagnostic for {code} has been enqueued"),
    )
    .await?;
    ctx.enqueue(&DiagnoseJob { code: code.clone() }).await?;
    info!(task = %code, "diagnostic enqueued");
    Ok(())
}

fn ignore_missing(result: Result<()>) -> Result<()> {
    match result {
        Err(err) if err.is_not_found() => Ok(()),
        other => other,
    }
}

/// Deletes a detection with its result, its diagnostic task and the
/// diagnostic result.
pub async fn delete_detection(ctx: &PipelineContext, code: &TaskCode) -> Result<()> {
    let detection = ctx.store.get_detection(code).await?;
    ignore_missing(ctx.store.delete_detection_result(&detection.code).await)?;
    ignore_missing(ctx.store.delete_diagnostic_result(&detection.code).await)?;
    ignore_missing(ctx.store.delete_diagnostic(&detection.code).await)?;
    ctx.store.delete_detection(&detection.code).await?;
    info!(task = %code, "detection deleted");
    Ok(())
}
