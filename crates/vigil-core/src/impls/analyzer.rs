//! ScoreDistributionAnalyzer: calibration from the training score spread.
//!
//! - `x0`: mean + 2 standard deviations of the training scores
//! - `k`: inverse of that standard deviation
//! - `anomaly_prior`: share of test scores above `x0`, kept in `[0.001, 0.5]`

use tracing::debug;

use crate::domain::{CalibrationParameters, Sample};
use crate::error::{PipelineError, Result};
use crate::ports::{Detective, PerformanceAnalyzer};

const MIN_SPREAD: f64 = 1e-6;
const PRIOR_RANGE: (f64, f64) = (0.001, 0.5);

#[derive(Debug, Clone, Copy, Default)]
pub struct ScoreDistributionAnalyzer;

impl PerformanceAnalyzer for ScoreDistributionAnalyzer {
    fn estimate_calibration_parameters(
        &self,
        detective: &dyn Detective,
        test: &Sample,
        train: &Sample,
    ) -> Result<CalibrationParameters> {
        let train_scores = detective.detect(train)?;
        if train_scores.is_empty() {
            return Err(PipelineError::Engine(
                "calibration needs at least one training chunk".to_string(),
            ));
        }
        let n = train_scores.len() as f64;
        let mean = train_scores.iter().sum::<f64>() / n;
        let std = (train_scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n)
            .sqrt()
            .max(MIN_SPREAD);
        let x0 = mean + 2.0 * std;

        let test_scores = detective.detect(test)?;
        let above = test_scores.iter().filter(|s| **s > x0).count();
        let prior = if test_scores.is_empty() {
            PRIOR_RANGE.0
        } else {
            (above as f64 / test_scores.len() as f64).clamp(PRIOR_RANGE.0, PRIOR_RANGE.1)
        };

        debug!(k = 1.0 / std, x0, prior, "estimated calibration");
        Ok(CalibrationParameters::new(1.0 / std, x0, prior))
    }
}
