//! JsonSignalLoader: recordings stored as JSON files under a root folder.
//!
//! File layout: `{"sample_rate": 100.0, "signal": [[...], [...]]}`. A flat
//! `signal` array is read as a single sensor.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::{RawSignal, Recording, Upload};
use crate::error::{PipelineError, Result};
use crate::ports::SignalLoader;

#[derive(Debug, Serialize, Deserialize)]
struct RecordingFile {
    sample_rate: f64,
    signal: RawSignal,
}

#[derive(Debug, Clone)]
pub struct JsonSignalLoader {
    root: PathBuf,
}

impl JsonSignalLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn path_for(&self, location: &Path) -> PathBuf {
        self.root.join(location)
    }

    /// Writes `recording` where an upload at `location` will be read from.
    pub fn save(&self, location: &Path, recording: &Recording) -> Result<()> {
        let path = self.path_for(location);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let signal = &recording.signal;
        let file = RecordingFile {
            sample_rate: recording.sample_rate,
            signal: RawSignal::Grid((0..signal.rows()).map(|r| signal.row(r).to_vec()).collect()),
        };
        fs::write(&path, serde_json::to_vec(&file)?)?;
        Ok(())
    }
}

impl SignalLoader for JsonSignalLoader {
    fn load(&self, upload: &Upload) -> Result<Recording> {
        let path = self.path_for(&upload.location);
        debug!(upload = %upload.code, path = %path.display(), "loading recording");
        let file = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                PipelineError::not_found("recording", path.display())
            }
            _ => PipelineError::Io(e),
        })?;
        let raw: RecordingFile = serde_json::from_reader(BufReader::new(file))?;
        if raw.sample_rate <= 0.0 {
            return Err(PipelineError::InvalidInput(format!(
                "recording {} has non-positive sample rate",
                path.display()
            )));
        }
        Ok(Recording {
            sample_rate: raw.sample_rate,
            signal: raw.signal.into_matrix()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CompanyId, DatasourceConfigurationId, Matrix, UploadCode};

    fn upload(location: &str) -> Upload {
        Upload {
            code: UploadCode::new("u-1"),
            company_id: CompanyId::generate(),
            datasource_configuration_id: DatasourceConfigurationId::generate(),
            name: "flight".to_string(),
            location: PathBuf::from(location),
        }
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let loader = JsonSignalLoader::new(dir.path());
        let recording = Recording {
            sample_rate: 8.0,
            signal: Matrix::new(2, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap(),
        };
        loader.save(Path::new("a/rec.json"), &recording).unwrap();
        assert_eq!(loader.load(&upload("a/rec.json")).unwrap(), recording);
    }

    #[test]
    fn flat_signal_loads_as_one_sensor() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("flat.json"),
            r#"{"sample_rate": 2.0, "signal": [1.0, 2.0, 3.0, 4.0]}"#,
        )
        .unwrap();
        let recording = JsonSignalLoader::new(dir.path())
            .load(&upload("flat.json"))
            .unwrap();
        assert_eq!(recording.signal.shape(), (1, 4));
    }

    #[test]
    fn missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonSignalLoader::new(dir.path())
            .load(&upload("missing.json"))
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
