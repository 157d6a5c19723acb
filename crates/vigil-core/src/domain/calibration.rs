//! Calibration parameters converting raw detector scores into probabilities.

use serde::{Deserialize, Serialize};

/// `(k, x0, anomaly_prior)` estimated once per completed training.
///
/// A raw score `s` is mapped through the logistic `σ(k·(s − x0))`, which is
/// treated as the anomaly likelihood and combined with `anomaly_prior` by
/// Bayes' rule.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParameters {
    pub k: f64,
    pub x0: f64,
    pub anomaly_prior: f64,
}

impl CalibrationParameters {
    /// Used when a training carries no calibration: plain logistic of the score.
    pub const UNCALIBRATED: Self = Self {
        k: 1.0,
        x0: 0.0,
        anomaly_prior: 0.5,
    };

    pub fn new(k: f64, x0: f64, anomaly_prior: f64) -> Self {
        Self { k, x0, anomaly_prior }
    }

    /// `Some(self)` when every parameter is non-zero; zeros mean "not calibrated".
    pub fn usable(self) -> Option<Self> {
        (self.k != 0.0 && self.x0 != 0.0 && self.anomaly_prior != 0.0).then_some(self)
    }

    pub fn probability(&self, score: f64) -> f64 {
        let likelihood = logistic(self.k * (score - self.x0));
        let prior = self.anomaly_prior.clamp(0.0, 1.0);
        let anomalous = prior * likelihood;
        let normal = (1.0 - prior) * (1.0 - likelihood);
        if anomalous + normal == 0.0 {
            0.0
        } else {
            anomalous / (anomalous + normal)
        }
    }
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
