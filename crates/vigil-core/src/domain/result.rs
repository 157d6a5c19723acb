//! Persisted outputs of detection and diagnosis.

use serde::{Deserialize, Serialize};

use super::calibration::CalibrationParameters;
use super::signal::{Matrix, chunk_offset_seconds};
use super::timeline::Timeline;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    /// Raw detector score per chunk.
    pub scores: Vec<f64>,
    pub timesteps_per_chunk: usize,
    /// Rate of the chunk columns the scores were computed on.
    pub sample_rate: f64,
}

impl DetectionResult {
    pub fn new(scores: Vec<f64>, timesteps_per_chunk: usize, sample_rate: f64) -> Self {
        Self {
            scores,
            timesteps_per_chunk,
            sample_rate,
        }
    }

    pub fn chunk_offset(&self, index: usize) -> f64 {
        chunk_offset_seconds(index, self.timesteps_per_chunk, self.sample_rate)
    }

    /// Per-chunk anomaly probabilities; uncalibrated when `calibration` is `None`.
    pub fn probabilities(&self, calibration: Option<CalibrationParameters>) -> Vec<f64> {
        let params = calibration.unwrap_or(CalibrationParameters::UNCALIBRATED);
        self.scores.iter().map(|s| params.probability(*s)).collect()
    }

    pub fn timeline(&self, calibration: Option<CalibrationParameters>) -> Timeline {
        let points = self
            .probabilities(calibration)
            .into_iter()
            .enumerate()
            .map(|(i, p)| ((self.chunk_offset(i) * 1000.0).round() as i64, p))
            .collect();
        Timeline::new(points)
    }
}

/// One diagnosed chunk: the signal as recorded and the engine's
/// reconstruction of it, both as 2-D matrices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticChunk {
    pub index: usize,
    /// Seconds from the start of the recording.
    pub time_offset: f64,
    pub original: Matrix,
    pub synthetic: Matrix,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticResult {
    pub chunks: Vec<DiagnosticChunk>,
}
