//! Engine ports: the detection/training collaborators the pipeline drives.
//!
//! Implementations are synchronous and may be slow; the pipeline runs them
//! inside `spawn_blocking`, which is why they must be `Send`.

use std::path::{Path, PathBuf};

use crate::domain::{CalibrationParameters, Matrix, Recording, Sample};
use crate::error::Result;

/// Anomaly detector.
///
/// A detective reads a model from `load_path` (when set) and writes the
/// trained model to the save path it was configured with.
pub trait Detective: Send {
    fn load_path(&self) -> Option<&Path>;

    fn set_load_path(&mut self, path: Option<PathBuf>);

    fn train(&mut self, data: &Sample) -> Result<()>;

    /// One raw anomaly score per chunk of `data`.
    fn detect(&self, data: &Sample) -> Result<Vec<f64>>;

    /// Reconstruction of `chunk` as the model expects it to look.
    fn diagnose(&self, chunk: &Matrix, offset_seconds: f64) -> Result<Matrix>;
}

/// Windowing and normalization of raw recordings.
pub trait Transformer: Send {
    /// Learns normalization statistics from the training recordings.
    fn fit(&mut self, recordings: &[Recording]) -> Result<()>;

    /// Turns a recording into fixed-size chunks with the fitted statistics.
    fn process(&self, recording: &Recording) -> Result<Sample>;
}

pub trait PerformanceAnalyzer: Send + Sync {
    fn estimate_calibration_parameters(
        &self,
        detective: &dyn Detective,
        test: &Sample,
        train: &Sample,
    ) -> Result<CalibrationParameters>;
}

/// Train/test partitions of one or more processed recordings.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSource {
    train: Sample,
    test: Sample,
}

impl DataSource {
    pub fn new(train: Sample, test: Sample) -> Self {
        Self { train, test }
    }

    pub fn train_data(&self) -> &Sample {
        &self.train
    }

    pub fn test_data(&self) -> &Sample {
        &self.test
    }

    pub fn into_parts(self) -> (Sample, Sample) {
        (self.train, self.test)
    }
}

/// Builds data sources for the two ways a recording is consumed.
pub trait DataSourceFactory: Send + Sync {
    /// Fits `transformer` on `recordings`, then processes and splits them.
    fn training(
        &self,
        recordings: &[Recording],
        transformer: &mut dyn Transformer,
    ) -> Result<DataSource>;

    /// Processes one recording with an already fitted transformer. All
    /// chunks land in the test partition.
    fn detection(&self, recording: &Recording, transformer: &dyn Transformer)
    -> Result<DataSource>;
}
