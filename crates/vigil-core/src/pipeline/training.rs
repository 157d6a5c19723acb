//! Training stage.
//!
//! Status flow: `QUEUED` (submission) → `STARTED` → `IN PROGRESS` (right
//! before the engine trains) → `SUCCESSFUL`, or `FAILED` from any step after
//! `STARTED`. Nothing is rolled back on failure.

use std::path::PathBuf;

use serde_json::{Value, json};
use tracing::{debug, info};

use super::jobs::TrainJob;
use super::{PipelineContext, already_completed, blocking, warn_missing};
use crate::domain::{
    CompanyId, Configuration, DatasourceConfigurationId, StatusLog, TaskCode, TaskKind, TaskState,
    TrainingTask, UploadCode,
};
use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRequest {
    pub name: String,
    pub company_id: CompanyId,
    pub datasource_configuration_id: DatasourceConfigurationId,
    /// Retrain on top of this training's model.
    pub parent: Option<TaskCode>,
    /// `None` leaves the flag unset in the stored configuration.
    pub enable_fft: Option<bool>,
    pub train_iters: u64,
    pub downsample_factor: u64,
}

/// Validates the request, stores the task with its generated configuration,
/// records `QUEUED` and enqueues the train job.
pub async fn submit_training(
    ctx: &PipelineContext,
    request: TrainingRequest,
) -> Result<TrainingTask> {
    let store = &ctx.store;
    if store
        .training_name_exists(request.company_id, &request.name)
        .await?
    {
        return Err(PipelineError::InvalidInput(format!(
            "training with name {} already exists",
            request.name
        )));
    }

    let datasource = store
        .get_datasource_configuration(request.datasource_configuration_id)
        .await?;
    if datasource.company_id != request.company_id {
        return Err(PipelineError::not_found(
            "datasource configuration",
            request.datasource_configuration_id,
        ));
    }
    let number_of_sensors = datasource
        .meta
        .number_of_sensors
        .filter(|n| *n > 0)
        .ok_or_else(|| {
            PipelineError::InvalidInput(
                "no number of sensors specified, check the datasource configuration".to_string(),
            )
        })?;
    if request.downsample_factor == 0 {
        return Err(PipelineError::InvalidInput(
            "downsample_factor must be positive".to_string(),
        ));
    }

    let uploads = store
        .uploads_for_datasource(request.datasource_configuration_id)
        .await?;
    if uploads.is_empty() {
        return Err(PipelineError::InvalidInput(format!(
            "no uploads available for datasource configuration {}",
            datasource.name
        )));
    }

    let company = store
        .active_company_configuration(request.company_id)
        .await?;
    ctx.components.validate(&company.configuration)?;

    let parent = match &request.parent {
        Some(code) => Some(store.get_training(code).await?),
        None => None,
    };

    let code = ctx.ids.generate_task_code();
    let training = &ctx.settings.training;
    let number_of_timesteps = training.input_size / number_of_sensors * request.downsample_factor;

    let generated = training_configuration(
        &code,
        request.company_id,
        &company.configuration,
        number_of_sensors,
        request.enable_fft,
        parent.as_ref(),
        ctx,
    )?;
    let configuration = with_training_parameters(
        &generated,
        request.train_iters,
        number_of_timesteps,
        request.downsample_factor,
    );
    debug!(task = %code, configuration = %configuration.to_value(), "created training configuration");

    let task = TrainingTask {
        code: code.clone(),
        name: request.name,
        company_id: request.company_id,
        company_configuration_id: company.id,
        datasource_configuration_id: request.datasource_configuration_id,
        upload_codes: uploads.into_iter().map(|u| u.code).collect(),
        parent: request.parent,
        configuration,
        created_at: ctx.clock.now(),
        statuses: StatusLog::new(),
    };
    store.insert_training(task.clone()).await?;
    ctx.append_status(TaskKind::Training, &code, TaskState::Queued, "Enqueued")
        .await?;
    ctx.enqueue(&TrainJob { code: code.clone() }).await?;
    info!(task = %code, "training enqueued");

    store.get_training(&code).await
}

/// Company configuration with the model/transformer block of a new training
/// merged on top.
///
/// Model files live at `<company>/<code>/<code>` under the train root. A
/// fresh training loads from its own save path; a retrain loads from the
/// parent's, inherits the parent's fft flag and uses the retrain learning
/// rate.
fn training_configuration(
    code: &TaskCode,
    company_id: CompanyId,
    company_configuration: &Configuration,
    number_of_sensors: u64,
    enable_fft: Option<bool>,
    parent: Option<&TrainingTask>,
    ctx: &PipelineContext,
) -> Result<Configuration> {
    let save_path = PathBuf::from(company_id.as_ulid().to_string())
        .join(code.as_str())
        .join(code.as_str())
        .to_string_lossy()
        .into_owned();
    let settings = &ctx.settings.training;

    let (load_path, enable_fft, learning_rate) = match parent {
        Some(parent) => {
            info!(task = %code, parent = %parent.code, "training has a parent, loading its model");
            let parent_save = parent.save_path().ok_or_else(|| {
                PipelineError::Config(format!("parent training {} has no save_path", parent.code))
            })?;
            (
                parent_save.to_string(),
                Some(parent.has_fft_enabled()),
                settings.retrain_learning_rate(),
            )
        }
        None => (save_path.clone(), enable_fft, settings.default_learning_rate),
    };

    let overlay = json!({
        "model": {"configuration": {"model_configuration": {
            "load_path": load_path,
            "save_path": save_path,
            "train_iters": company_configuration.train_iters().map_or(Value::Null, Value::from),
            "learning_rate": learning_rate,
        }}},
        "transformer": {"configuration": {
            "enable_fft": enable_fft,
            "number_of_sensors": number_of_sensors,
            "downsample_factor": settings.default_downsample_factor,
        }}
    });
    Ok(company_configuration.merged(&Configuration::try_from(overlay)?))
}

fn with_training_parameters(
    configuration: &Configuration,
    train_iters: u64,
    number_of_timesteps: u64,
    downsample_factor: u64,
) -> Configuration {
    configuration
        .with_value(
            &["model", "configuration", "model_configuration", "train_iters"],
            json!(train_iters),
        )
        .with_value(
            &["transformer", "configuration", "number_of_timesteps"],
            json!(number_of_timesteps),
        )
        .with_value(
            &["transformer", "configuration", "downsample_factor"],
            json!(downsample_factor),
        )
}

/// Runs a queued training to completion.
pub async fn run_training(ctx: &PipelineContext, code: &TaskCode) -> Result<()> {
    let task = warn_missing(ctx.store.get_training(code).await, TaskKind::Training, code)?;
    if already_completed(&task.statuses, TaskKind::Training, code) {
        return Ok(());
    }

    info!(task = %code, "training started");
    ctx.append_status(TaskKind::Training, code, TaskState::Started, "Started")
        .await?;

    match train(ctx, &task).await {
        Ok(()) => {
            ctx.append_status(TaskKind::Training, code, TaskState::Successful, "Successful")
                .await?;
            info!(task = %code, "training finished");
            Ok(())
        }
        Err(err) => Err(ctx.record_failure(TaskKind::Training, code, err).await),
    }
}

async fn train(ctx: &PipelineContext, task: &TrainingTask) -> Result<()> {
    let configuration = task
        .configuration
        .with_root_folder(&ctx.settings.train_root_folder)?;
    debug!(task = %task.code, configuration = %configuration.to_value(), "effective training configuration");

    let is_retrain = task.parent.is_some();
    let mut detective = ctx.components.detective(&configuration)?;
    if !is_retrain {
        detective.set_load_path(None);
    }
    let mut transformer = ctx.components.transformer(&configuration)?;
    let datasource = ctx.components.datasource(&configuration)?;
    let analyzer = ctx.components.analyzer(&configuration)?;

    let recordings = ctx.load_recordings(&task.upload_codes).await?;
    let data = blocking(move || datasource.training(&recordings, transformer.as_mut())).await?;
    let (train, test) = data.into_parts();
    info!(
        task = %task.code,
        train_chunks = train.len(),
        test_chunks = test.len(),
        "training data ready"
    );

    ctx.append_status(
        TaskKind::Training,
        &task.code,
        TaskState::InProgress,
        "Training in progress",
    )
    .await?;

    let save_path = configuration.save_path().map(PathBuf::from);
    let calibration = blocking(move || {
        detective.train(&train)?;
        if is_retrain {
            detective.set_load_path(save_path);
        }
        analyzer.estimate_calibration_parameters(detective.as_ref(), &test, &train)
    })
    .await?;
    info!(task = %task.code, ?calibration, "calibration estimated");

    let stored = if is_retrain {
        task.configuration.for_inference()?
    } else {
        task.configuration.clone()
    };
    ctx.store
        .update_training_configuration(&task.code, stored.with_calibration(&calibration))
        .await
}

/// Successful trainings that can run detections on `upload`.
pub async fn available_trainings_for(
    ctx: &PipelineContext,
    upload: &UploadCode,
) -> Result<Vec<TrainingTask>> {
    let upload = ctx.store.get_upload(upload).await?;
    let trainings = ctx
        .store
        .trainings_for_datasource(upload.datasource_configuration_id)
        .await?;
    Ok(trainings.into_iter().filter(TrainingTask::is_successful).collect())
}

/// Deletes a training together with its status history. A training that
/// detections or retrains still point at is refused with `InUse`.
pub async fn delete_training(ctx: &PipelineContext, code: &TaskCode) -> Result<()> {
    ctx.store.delete_training(code).await?;
    info!(task = %code, "training deleted");
    Ok(())
}
