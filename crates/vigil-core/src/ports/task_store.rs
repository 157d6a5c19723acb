//! TaskStore port: the source of truth for tasks, statuses and results.
//!
//! Stages never talk to each other directly; a detection finds its training
//! and a diagnosis finds its detection result through this trait.
//!
//! Contract shared by every implementation:
//! - lookups of absent records return `PipelineError::NotFound`;
//! - inserting a task whose code already exists for that kind returns
//!   `PipelineError::DuplicateTask`;
//! - `append_status` calls for one task are applied in call order;
//! - a task has at most one result; saving a second returns
//!   `PipelineError::ResultExists`;
//! - deletes remove exactly the named record (cascades are done by callers),
//!   except that a training still referenced by a detection or a child
//!   training is kept and `PipelineError::InUse` is returned.

use async_trait::async_trait;

use crate::domain::{
    CompanyConfiguration, CompanyConfigurationId, CompanyId, Configuration,
    DatasourceConfiguration, DatasourceConfigurationId, DetectionResult, DetectionTask,
    DiagnosticResult, DiagnosticTask, StatusLog, TaskCode, TaskKind, TaskStatus, TrainingTask,
    Upload, UploadCode,
};
use crate::error::Result;

#[async_trait]
pub trait TaskStore: Send + Sync {
    // reference data
    async fn insert_upload(&self, upload: Upload) -> Result<()>;
    async fn get_upload(&self, code: &UploadCode) -> Result<Upload>;
    async fn uploads_for_datasource(&self, id: DatasourceConfigurationId) -> Result<Vec<Upload>>;

    async fn insert_company_configuration(&self, configuration: CompanyConfiguration)
    -> Result<()>;
    async fn get_company_configuration(
        &self,
        id: CompanyConfigurationId,
    ) -> Result<CompanyConfiguration>;
    /// Latest configuration inserted for `company`.
    async fn active_company_configuration(&self, company: CompanyId)
    -> Result<CompanyConfiguration>;

    async fn insert_datasource_configuration(
        &self,
        configuration: DatasourceConfiguration,
    ) -> Result<()>;
    async fn get_datasource_configuration(
        &self,
        id: DatasourceConfigurationId,
    ) -> Result<DatasourceConfiguration>;

    // tasks
    async fn insert_training(&self, task: TrainingTask) -> Result<()>;
    async fn get_training(&self, code: &TaskCode) -> Result<TrainingTask>;
    async fn training_name_exists(&self, company: CompanyId, name: &str) -> Result<bool>;
    async fn trainings_for_datasource(
        &self,
        id: DatasourceConfigurationId,
    ) -> Result<Vec<TrainingTask>>;
    async fn update_training_configuration(
        &self,
        code: &TaskCode,
        configuration: Configuration,
    ) -> Result<()>;
    async fn delete_training(&self, code: &TaskCode) -> Result<()>;

    async fn insert_detection(&self, task: DetectionTask) -> Result<()>;
    async fn get_detection(&self, code: &TaskCode) -> Result<DetectionTask>;
    async fn delete_detection(&self, code: &TaskCode) -> Result<()>;

    async fn insert_diagnostic(&self, task: DiagnosticTask) -> Result<()>;
    async fn get_diagnostic(&self, code: &TaskCode) -> Result<DiagnosticTask>;
    async fn delete_diagnostic(&self, code: &TaskCode) -> Result<()>;

    // status history
    async fn append_status(&self, kind: TaskKind, code: &TaskCode, status: TaskStatus)
    -> Result<()>;
    async fn statuses(&self, kind: TaskKind, code: &TaskCode) -> Result<StatusLog>;

    // results
    async fn save_detection_result(&self, code: &TaskCode, result: DetectionResult)
    -> Result<()>;
    async fn detection_result(&self, code: &TaskCode) -> Result<DetectionResult>;
    async fn delete_detection_result(&self, code: &TaskCode) -> Result<()>;

    async fn save_diagnostic_result(
        &self,
        code: &TaskCode,
        result: DiagnosticResult,
    ) -> Result<()>;
    async fn diagnostic_result(&self, code: &TaskCode) -> Result<DiagnosticResult>;
    async fn delete_diagnostic_result(&self, code: &TaskCode) -> Result<()>;
}
