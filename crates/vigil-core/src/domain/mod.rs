//! Domain model: identifiers, configuration, task records, status history,
//! signals and results.

pub mod calibration;
pub mod configuration;
pub mod envelope;
pub mod ids;
pub mod result;
pub mod signal;
pub mod status;
pub mod task;
pub mod timeline;

pub use self::calibration::CalibrationParameters;
pub use self::configuration::{Configuration, merge};
pub use self::envelope::TaskEnvelope;
pub use self::ids::{
    CompanyConfigurationId, CompanyId, DatasourceConfigurationId, Id, IdMarker, TaskCode,
    UploadCode,
};
pub use self::result::{DetectionResult, DiagnosticChunk, DiagnosticResult};
pub use self::signal::{Matrix, RawSignal, Recording, Sample};
pub use self::status::{StatusLog, TaskState, TaskStatus};
pub use self::task::{
    CompanyConfiguration, DatasourceConfiguration, DatasourceMeta, DetectionTask, DiagnosticTask,
    TaskKind, TrainingTask, Upload,
};
pub use self::timeline::Timeline;
