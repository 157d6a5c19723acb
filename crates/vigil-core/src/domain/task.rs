//! Task records and the reference data they point at.
//!
//! Every task owns its `StatusLog`. Relationships to upstream tasks are kept
//! as codes, never as embedded records, so each record can be persisted and
//! deleted on its own.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::configuration::Configuration;
use super::ids::{
    CompanyConfigurationId, CompanyId, DatasourceConfigurationId, TaskCode, UploadCode,
};
use super::status::{StatusLog, TaskState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    Training,
    Detection,
    Diagnostic,
}

impl TaskKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskKind::Training => "training",
            TaskKind::Detection => "detection",
            TaskKind::Diagnostic => "diagnostic",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingTask {
    pub code: TaskCode,
    pub name: String,
    pub company_id: CompanyId,
    pub company_configuration_id: CompanyConfigurationId,
    pub datasource_configuration_id: DatasourceConfigurationId,
    pub upload_codes: Vec<UploadCode>,
    pub parent: Option<TaskCode>,
    pub configuration: Configuration,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub statuses: StatusLog,
}

impl TrainingTask {
    pub fn has_fft_enabled(&self) -> bool {
        self.configuration.has_fft_enabled()
    }

    /// Where the trained model is written, if the configuration names one.
    pub fn save_path(&self) -> Option<&str> {
        let path = self.configuration.save_path();
        if path.is_none() {
            info!(task = %self.code, "training configuration has no save_path");
        }
        path
    }

    pub fn is_successful(&self) -> bool {
        self.statuses.current() == Some(TaskState::Successful)
    }

    pub fn running_time(&self) -> Option<TimeDelta> {
        self.statuses.running_time(TaskKind::Training)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionTask {
    pub code: TaskCode,
    pub name: String,
    pub company_id: CompanyId,
    pub upload_code: UploadCode,
    pub training_code: TaskCode,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub statuses: StatusLog,
}

/// Diagnosis of one detection; shares the detection's task code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticTask {
    pub code: TaskCode,
    pub detection_code: TaskCode,
    pub upload_code: UploadCode,
    pub company_id: CompanyId,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub statuses: StatusLog,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upload {
    pub code: UploadCode,
    pub company_id: CompanyId,
    pub datasource_configuration_id: DatasourceConfigurationId,
    pub name: String,
    /// Location of the raw recording, relative to the loader's root.
    pub location: PathBuf,
}

/// Company-wide processing configuration. The latest one inserted for a
/// company is the active one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyConfiguration {
    pub id: CompanyConfigurationId,
    pub company_id: CompanyId,
    pub configuration: Configuration,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasourceMeta {
    pub number_of_sensors: Option<u64>,
    pub number_of_timesteps: Option<u64>,
    pub downsample_factor: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasourceConfiguration {
    pub id: DatasourceConfigurationId,
    pub company_id: CompanyId,
    pub name: String,
    pub meta: DatasourceMeta,
}
