//! InMemoryTaskStore: `TaskStore` backed by maps behind one async mutex.
//!
//! Every operation takes the lock once, so status appends for a task are
//! applied in the order the calls acquire it.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    CompanyConfiguration, CompanyConfigurationId, CompanyId, Configuration,
    DatasourceConfiguration, DatasourceConfigurationId, DetectionResult, DetectionTask,
    DiagnosticResult, DiagnosticTask, StatusLog, TaskCode, TaskKind, TaskStatus, TrainingTask,
    Upload, UploadCode,
};
use crate::error::{PipelineError, Result};
use crate::ports::TaskStore;

#[derive(Default)]
struct StoreState {
    uploads: HashMap<UploadCode, Upload>,
    /// Insertion order matters: the last one per company is active.
    company_configurations: Vec<CompanyConfiguration>,
    datasource_configurations: HashMap<DatasourceConfigurationId, DatasourceConfiguration>,
    trainings: HashMap<TaskCode, TrainingTask>,
    detections: HashMap<TaskCode, DetectionTask>,
    diagnostics: HashMap<TaskCode, DiagnosticTask>,
    detection_results: HashMap<TaskCode, DetectionResult>,
    diagnostic_results: HashMap<TaskCode, DiagnosticResult>,
}

impl StoreState {
    fn statuses_mut(&mut self, kind: TaskKind, code: &TaskCode) -> Result<&mut StatusLog> {
        let statuses = match kind {
            TaskKind::Training => self.trainings.get_mut(code).map(|t| &mut t.statuses),
            TaskKind::Detection => self.detections.get_mut(code).map(|t| &mut t.statuses),
            TaskKind::Diagnostic => self.diagnostics.get_mut(code).map(|t| &mut t.statuses),
        };
        statuses.ok_or_else(|| PipelineError::not_found(kind.as_str(), code))
    }
}

fn insert_unique<T>(
    map: &mut HashMap<TaskCode, T>,
    kind: TaskKind,
    code: TaskCode,
    task: T,
) -> Result<()> {
    if map.contains_key(&code) {
        return Err(PipelineError::DuplicateTask {
            kind,
            code: code.to_string(),
        });
    }
    map.insert(code, task);
    Ok(())
}

fn insert_result<T>(
    map: &mut HashMap<TaskCode, T>,
    kind: TaskKind,
    code: &TaskCode,
    result: T,
) -> Result<()> {
    if map.contains_key(code) {
        return Err(PipelineError::ResultExists {
            kind,
            code: code.to_string(),
        });
    }
    map.insert(code.clone(), result);
    Ok(())
}

fn remove_existing<K, V>(map: &mut HashMap<K, V>, what: &'static str, key: &K) -> Result<()>
where
    K: std::hash::Hash + Eq + std::fmt::Display,
{
    map.remove(key)
        .map(drop)
        .ok_or_else(|| PipelineError::not_found(what, key))
}

fn cloned<K, V>(map: &HashMap<K, V>, what: &'static str, key: &K) -> Result<V>
where
    K: std::hash::Hash + Eq + std::fmt::Display,
    V: Clone,
{
    map.get(key)
        .cloned()
        .ok_or_else(|| PipelineError::not_found(what, key))
}

#[derive(Default)]
pub struct InMemoryTaskStore {
    state: Mutex<StoreState>,
}

impl InMemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskStore for InMemoryTaskStore {
    async fn insert_upload(&self, upload: Upload) -> Result<()> {
        self.state.lock().await.uploads.insert(upload.code.clone(), upload);
        Ok(())
    }

    async fn get_upload(&self, code: &UploadCode) -> Result<Upload> {
        cloned(&self.state.lock().await.uploads, "upload", code)
    }

    async fn uploads_for_datasource(&self, id: DatasourceConfigurationId) -> Result<Vec<Upload>> {
        let state = self.state.lock().await;
        let mut uploads: Vec<Upload> = state
            .uploads
            .values()
            .filter(|u| u.datasource_configuration_id == id)
            .cloned()
            .collect();
        uploads.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(uploads)
    }

    async fn insert_company_configuration(
        &self,
        configuration: CompanyConfiguration,
    ) -> Result<()> {
        self.state
            .lock()
            .await
            .company_configurations
            .push(configuration);
        Ok(())
    }

    async fn get_company_configuration(
        &self,
        id: CompanyConfigurationId,
    ) -> Result<CompanyConfiguration> {
        let state = self.state.lock().await;
        state
            .company_configurations
            .iter()
            .find(|c| c.id == id)
            .cloned()
            .ok_or_else(|| PipelineError::not_found("company configuration", id))
    }

    async fn active_company_configuration(
        &self,
        company: CompanyId,
    ) -> Result<CompanyConfiguration> {
        let state = self.state.lock().await;
        state
            .company_configurations
            .iter()
            .rev()
            .find(|c| c.company_id == company)
            .cloned()
            .ok_or_else(|| PipelineError::not_found("active company configuration", company))
    }

    async fn insert_datasource_configuration(
        &self,
        configuration: DatasourceConfiguration,
    ) -> Result<()> {
        self.state
            .lock()
            .await
            .datasource_configurations
            .insert(configuration.id, configuration);
        Ok(())
    }

    async fn get_datasource_configuration(
        &self,
        id: DatasourceConfigurationId,
    ) -> Result<DatasourceConfiguration> {
        cloned(
            &self.state.lock().await.datasource_configurations,
            "datasource configuration",
            &id,
        )
    }

    async fn insert_training(&self, task: TrainingTask) -> Result<()> {
        let mut state = self.state.lock().await;
        insert_unique(&mut state.trainings, TaskKind::Training, task.code.clone(), task)
    }

    async fn get_training(&self, code: &TaskCode) -> Result<TrainingTask> {
        cloned(&self.state.lock().await.trainings, "training", code)
    }

    async fn training_name_exists(&self, company: CompanyId, name: &str) -> Result<bool> {
        let state = self.state.lock().await;
        Ok(state
            .trainings
            .values()
            .any(|t| t.company_id == company && t.name == name))
    }

    async fn trainings_for_datasource(
        &self,
        id: DatasourceConfigurationId,
    ) -> Result<Vec<TrainingTask>> {
        let state = self.state.lock().await;
        let mut trainings: Vec<TrainingTask> = state
            .trainings
            .values()
            .filter(|t| t.datasource_configuration_id == id)
            .cloned()
            .collect();
        trainings.sort_by(|a, b| (a.created_at, &a.code).cmp(&(b.created_at, &b.code)));
        Ok(trainings)
    }

    async fn update_training_configuration(
        &self,
        code: &TaskCode,
        configuration: Configuration,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let task = state
            .trainings
            .get_mut(code)
            .ok_or_else(|| PipelineError::not_found("training", code))?;
        task.configuration = configuration;
        Ok(())
    }

    async fn delete_training(&self, code: &TaskCode) -> Result<()> {
        let mut state = self.state.lock().await;
        let mut referrers: Vec<String> = state
            .detections
            .values()
            .filter(|d| &d.training_code == code)
            .map(|d| format!("detection {}", d.code))
            .chain(
                state
                    .trainings
                    .values()
                    .filter(|t| t.parent.as_ref() == Some(code))
                    .map(|t| format!("training {}", t.code)),
            )
            .collect();
        if !referrers.is_empty() {
            referrers.sort();
            return Err(PipelineError::InUse {
                what: "training",
                key: code.to_string(),
                by: referrers.join(", "),
            });
        }
        remove_existing(&mut state.trainings, "training", code)
    }

    async fn insert_detection(&self, task: DetectionTask) -> Result<()> {
        let mut state = self.state.lock().await;
        insert_unique(&mut state.detections, TaskKind::Detection, task.code.clone(), task)
    }

    async fn get_detection(&self, code: &TaskCode) -> Result<DetectionTask> {
        cloned(&self.state.lock().await.detections, "detection", code)
    }

    async fn delete_detection(&self, code: &TaskCode) -> Result<()> {
        remove_existing(&mut self.state.lock().await.detections, "detection", code)
    }

    async fn insert_diagnostic(&self, task: DiagnosticTask) -> Result<()> {
        let mut state = self.state.lock().await;
        insert_unique(&mut state.diagnostics, TaskKind::Diagnostic, task.code.clone(), task)
    }

    async fn get_diagnostic(&self, code: &TaskCode) -> Result<DiagnosticTask> {
        cloned(&self.state.lock().await.diagnostics, "diagnostic", code)
    }

    async fn delete_diagnostic(&self, code: &TaskCode) -> Result<()> {
        remove_existing(&mut self.state.lock().await.diagnostics, "diagnostic", code)
    }

    async fn append_status(
        &self,
        kind: TaskKind,
        code: &TaskCode,
        status: TaskStatus,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        state.statuses_mut(kind, code)?.append(status);
        Ok(())
    }

    async fn statuses(&self, kind: TaskKind, code: &TaskCode) -> Result<StatusLog> {
        let mut state = self.state.lock().await;
        state.statuses_mut(kind, code).map(|log| log.clone())
    }

    async fn save_detection_result(
        &self,
        code: &TaskCode,
        result: DetectionResult,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        insert_result(&mut state.detection_results, TaskKind::Detection, code, result)
    }

    async fn detection_result(&self, code: &TaskCode) -> Result<DetectionResult> {
        cloned(&self.state.lock().await.detection_results, "detection result", code)
    }

    async fn delete_detection_result(&self, code: &TaskCode) -> Result<()> {
        remove_existing(
            &mut self.state.lock().await.detection_results,
            "detection result",
            code,
        )
    }

    async fn save_diagnostic_result(
        &self,
        code: &TaskCode,
        result: DiagnosticResult,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        insert_result(&mut state.diagnostic_results, TaskKind::Diagnostic, code, result)
    }

    async fn diagnostic_result(&self, code: &TaskCode) -> Result<DiagnosticResult> {
        cloned(&self.state.lock().await.diagnostic_results, "diagnostic result", code)
    }

    async fn delete_diagnostic_result(&self, code: &TaskCode) -> Result<()> {
        remove_existing(
            &mut self.state.lock().await.diagnostic_results,
            "diagnostic result",
            code,
        )
    }
}
