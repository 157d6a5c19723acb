//! Settings loaded from TOML.
//!
//! Every key is optional; a missing file yields the defaults.
//!
//! ```toml
//! train_root_folder = "/var/lib/vigil/train"
//! upload_root_folder = "/var/lib/vigil/uploads"
//!
//! [queue]
//! namespace = "vigil"
//! workers = 2
//! poll_timeout_ms = 1000
//!
//! [training]
//! default_learning_rate = 0.0001
//! retrain_divisor = 10.0
//! input_size = 784
//! default_downsample_factor = 4
//!
//! [diagnostic]
//! radius = 1
//! resample_rule_ms = 1000
//! neighborhood_ms = 1000
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Relative model load/save paths are resolved under this folder.
    pub train_root_folder: PathBuf,
    /// Uploaded recordings are read from here.
    pub upload_root_folder: PathBuf,
    pub queue: QueueSettings,
    pub training: TrainingSettings,
    pub diagnostic: DiagnosticSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            train_root_folder: PathBuf::from("train"),
            upload_root_folder: PathBuf::from("uploads"),
            queue: QueueSettings::default(),
            training: TrainingSettings::default(),
            diagnostic: DiagnosticSettings::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueSettings {
    pub namespace: String,
    pub workers: usize,
    pub poll_timeout_ms: u64,
}

impl QueueSettings {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            namespace: "vigil".to_string(),
            workers: 2,
            poll_timeout_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingSettings {
    pub default_learning_rate: f64,
    /// A retrain from a parent uses `default_learning_rate / retrain_divisor`.
    pub retrain_divisor: f64,
    /// Input size the timestep count is derived from: `input_size / sensors * downsample`.
    pub input_size: u64,
    pub default_downsample_factor: u64,
}

impl TrainingSettings {
    pub fn retrain_learning_rate(&self) -> f64 {
        self.default_learning_rate / self.retrain_divisor
    }
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            default_learning_rate: 0.0001,
            retrain_divisor: 10.0,
            input_size: 784,
            default_downsample_factor: 4,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticSettings {
    /// Chunks taken on each side of the most anomalous one.
    pub radius: usize,
    pub resample_rule_ms: i64,
    pub neighborhood_ms: i64,
}

impl Default for DiagnosticSettings {
    fn default() -> Self {
        Self {
            radius: 1,
            resample_rule_ms: 1000,
            neighborhood_ms: 1000,
        }
    }
}

impl Settings {
    /// Reads `path` when given and present, defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            debug!("no settings file given, using defaults");
            return Ok(Self::default());
        };
        if !path.exists() {
            info!(path = %path.display(), "settings file not found, using defaults");
            return Ok(Self::default());
        }
        let settings = Self::from_toml(&fs::read_to_string(path)?)?;
        debug!(?settings, "settings loaded");
        Ok(settings)
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        let settings: Self = toml::from_str(text)
            .map_err(|e| PipelineError::Config(format!("invalid settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.queue.workers == 0 {
            return Err(PipelineError::Config("queue.workers must be at least 1".to_string()));
        }
        if self.training.retrain_divisor == 0.0 {
            return Err(PipelineError::Config(
                "training.retrain_divisor must not be zero".to_string(),
            ));
        }
        if self.diagnostic.resample_rule_ms <= 0 {
            return Err(PipelineError::Config(
                "diagnostic.resample_rule_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let settings = Settings::default();
        assert_eq!(settings.training.default_learning_rate, 0.0001);
        assert!((settings.training.retrain_learning_rate() - 0.00001).abs() < 1e-15);
        assert_eq!(settings.diagnostic.radius, 1);
        assert_eq!(settings.queue.poll_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let settings = Settings::from_toml(
            r#"
            train_root_folder = "/data/train"

            [diagnostic]
            radius = 2
            "#,
        )
        .unwrap();
        assert_eq!(settings.train_root_folder, PathBuf::from("/data/train"));
        assert_eq!(settings.diagnostic.radius, 2);
        assert_eq!(settings.diagnostic.resample_rule_ms, 1000);
        assert_eq!(settings.queue, QueueSettings::default());
    }

    #[test]
    fn load_reads_file_or_falls_back() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[queue]\nworkers = 5").unwrap();
        assert_eq!(Settings::load(Some(file.path())).unwrap().queue.workers, 5);

        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("vigil.toml");
        assert_eq!(Settings::load(Some(&missing)).unwrap(), Settings::default());
        assert_eq!(Settings::load(None).unwrap(), Settings::default());
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let err = Settings::from_toml("[queue]\nworkers = 0").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        let err = Settings::from_toml("queue = 3").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
    }
}
