//! Runtime: the surface callers use to register data, submit tasks and
//! query them, plus envelope dispatch for the worker group.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};

use super::status::StatusView;
use crate::domain::{
    CompanyConfiguration, CompanyId, Configuration, DatasourceConfiguration,
    DatasourceConfigurationId, DatasourceMeta, DetectionResult, DetectionTask, DiagnosticChunk,
    TaskCode, TaskEnvelope, TaskKind, TrainingTask, Upload, UploadCode,
};
use crate::error::{PipelineError, Result};
use crate::pipeline::{self, DetectionRequest, PipelineContext, TrainingRequest};
use crate::typed::TypedRegistry;

pub struct Runtime {
    ctx: PipelineContext,
    registry: Arc<TypedRegistry>,
}

impl Runtime {
    pub(crate) fn new(ctx: PipelineContext, registry: TypedRegistry) -> Self {
        Self {
            ctx,
            registry: Arc::new(registry),
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    pub fn registry(&self) -> &TypedRegistry {
        &self.registry
    }

    /// Runs one envelope through its registered handler.
    pub async fn execute(&self, envelope: &TaskEnvelope) -> Result<()> {
        let handler = self.registry.get(&envelope.task_type).ok_or_else(|| {
            PipelineError::Registry(format!(
                "no handler registered for task type '{}'",
                envelope.task_type
            ))
        })?;
        handler.handle_dyn(envelope.payload.clone()).await
    }

    /// Executes queued jobs in order until the queue stays empty for
    /// `timeout`. Failed jobs are logged and skipped. Returns the number of
    /// jobs executed.
    pub async fn drain(&self, timeout: Duration) -> Result<usize> {
        let namespace = &self.ctx.settings.queue.namespace;
        let mut executed = 0;
        while let Some(envelope) = self.ctx.queue.pop(namespace, timeout).await? {
            if let Err(err) = self.execute(&envelope).await {
                error!(task_type = %envelope.task_type, key = %envelope.dedupe_key, error = %err, "job failed");
            }
            executed += 1;
        }
        Ok(executed)
    }

    /// Stores a new active configuration for `company` after checking every
    /// class it names is registered.
    pub async fn register_company_configuration(
        &self,
        company: CompanyId,
        configuration: Configuration,
    ) -> Result<CompanyConfiguration> {
        self.ctx.components.validate(&configuration)?;
        let record = CompanyConfiguration {
            id: self.ctx.ids.generate_company_configuration_id(),
            company_id: company,
            configuration,
            created_at: self.ctx.clock.now(),
        };
        self.ctx
            .store
            .insert_company_configuration(record.clone())
            .await?;
        info!(%company, id = %record.id, "company configuration registered");
        Ok(record)
    }

    pub async fn register_datasource_configuration(
        &self,
        company: CompanyId,
        name: impl Into<String>,
        meta: DatasourceMeta,
    ) -> Result<DatasourceConfiguration> {
        let record = DatasourceConfiguration {
            id: self.ctx.ids.generate_datasource_configuration_id(),
            company_id: company,
            name: name.into(),
            meta,
        };
        self.ctx
            .store
            .insert_datasource_configuration(record.clone())
            .await?;
        Ok(record)
    }

    /// Records an upload whose recording sits at `location` under the upload
    /// root.
    pub async fn register_upload(
        &self,
        company: CompanyId,
        datasource: DatasourceConfigurationId,
        name: impl Into<String>,
        location: impl Into<PathBuf>,
    ) -> Result<Upload> {
        self.ctx.store.get_datasource_configuration(datasource).await?;
        let upload = Upload {
            code: self.ctx.ids.generate_upload_code(),
            company_id: company,
            datasource_configuration_id: datasource,
            name: name.into(),
            location: location.into(),
        };
        self.ctx.store.insert_upload(upload.clone()).await?;
        info!(upload = %upload.code, "upload registered");
        Ok(upload)
    }

    pub async fn submit_training(&self, request: TrainingRequest) -> Result<TrainingTask> {
        pipeline::submit_training(&self.ctx, request).await
    }

    pub async fn submit_detection(&self, request: DetectionRequest) -> Result<DetectionTask> {
        pipeline::submit_detection(&self.ctx, request).await
    }

    pub async fn delete_training(&self, code: &TaskCode) -> Result<()> {
        pipeline::delete_training(&self.ctx, code).await
    }

    pub async fn delete_detection(&self, code: &TaskCode) -> Result<()> {
        pipeline::delete_detection(&self.ctx, code).await
    }

    pub async fn available_trainings_for(&self, upload: &UploadCode) -> Result<Vec<TrainingTask>> {
        pipeline::available_trainings_for(&self.ctx, upload).await
    }

    pub async fn status(&self, kind: TaskKind, code: &TaskCode) -> Result<StatusView> {
        let log = self.ctx.store.statuses(kind, code).await?;
        Ok(StatusView::from_log(kind, code.clone(), &log))
    }

    pub async fn detection_result(&self, code: &TaskCode) -> Result<DetectionResult> {
        self.ctx.store.detection_result(code).await
    }

    pub async fn grouped_diagnostic_result(&self, code: &TaskCode) -> Result<Vec<DiagnosticChunk>> {
        pipeline::grouped_diagnostic_result(&self.ctx, code).await
    }

    pub async fn is_frequency_domain(&self, kind: TaskKind, code: &TaskCode) -> Result<bool> {
        pipeline::is_frequency_domain(&self.ctx, kind, code).await
    }
}
