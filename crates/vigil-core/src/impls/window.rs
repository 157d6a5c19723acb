//! WindowTransformer: downsample, z-normalize per sensor, cut into chunks.
//!
//! With fft enabled every chunk row is replaced by its DFT magnitude, so the
//! detective works in the frequency domain.

use std::f64::consts::PI;

use serde_json::Value;
use tracing::debug;

use crate::domain::{Configuration, Matrix, Recording, Sample};
use crate::error::{PipelineError, Result};
use crate::ports::Transformer;

#[derive(Debug, Clone, Copy, PartialEq)]
struct SensorStats {
    mean: f64,
    std: f64,
}

#[derive(Debug, Clone)]
pub struct WindowTransformer {
    number_of_sensors: usize,
    number_of_timesteps: usize,
    downsample_factor: usize,
    enable_fft: bool,
    stats: Option<Vec<SensorStats>>,
}

impl WindowTransformer {
    pub fn new(
        number_of_sensors: usize,
        number_of_timesteps: usize,
        downsample_factor: usize,
        enable_fft: bool,
    ) -> Self {
        Self {
            number_of_sensors,
            number_of_timesteps,
            downsample_factor: downsample_factor.max(1),
            enable_fft,
            stats: None,
        }
    }

    pub fn from_configuration(configuration: &Configuration) -> Result<Self> {
        let read = |key: &str| {
            configuration
                .transformer_value(key)
                .and_then(Value::as_u64)
                .map(|v| v as usize)
        };
        let sensors = read("number_of_sensors").ok_or_else(|| {
            PipelineError::Config("transformer needs `number_of_sensors`".to_string())
        })?;
        let timesteps = read("number_of_timesteps").ok_or_else(|| {
            PipelineError::Config("transformer needs `number_of_timesteps`".to_string())
        })?;
        if sensors == 0 || timesteps == 0 {
            return Err(PipelineError::Config(
                "transformer sensor and timestep counts must be positive".to_string(),
            ));
        }
        Ok(Self::new(
            sensors,
            timesteps,
            read("downsample_factor").unwrap_or(1),
            configuration.has_fft_enabled(),
        ))
    }

    fn check_shape(&self, recording: &Recording) -> Result<()> {
        if recording.signal.rows() != self.number_of_sensors {
            return Err(PipelineError::Engine(format!(
                "recording has {} sensors, transformer expects {}",
                recording.signal.rows(),
                self.number_of_sensors
            )));
        }
        Ok(())
    }

    fn downsample(&self, signal: &Matrix) -> Result<Matrix> {
        let factor = self.downsample_factor;
        signal.map_rows(|_, row| {
            row.chunks_exact(factor)
                .map(|group| group.iter().sum::<f64>() / factor as f64)
                .collect()
        })
    }
}

impl Transformer for WindowTransformer {
    fn fit(&mut self, recordings: &[Recording]) -> Result<()> {
        if recordings.is_empty() {
            return Err(PipelineError::Engine(
                "cannot fit a transformer without recordings".to_string(),
            ));
        }
        let mut sums = vec![(0.0_f64, 0.0_f64, 0_usize); self.number_of_sensors];
        for recording in recordings {
            self.check_shape(recording)?;
            let reduced = self.downsample(&recording.signal)?;
            for (sensor, acc) in sums.iter_mut().enumerate() {
                for value in reduced.row(sensor) {
                    acc.0 += value;
                    acc.1 += value * value;
                    acc.2 += 1;
                }
            }
        }
        let stats = sums
            .into_iter()
            .map(|(sum, sum_sq, n)| {
                if n == 0 {
                    return SensorStats {
                        mean: 0.0,
                        std: 1.0,
                    };
                }
                let mean = sum / n as f64;
                let var = (sum_sq / n as f64 - mean * mean).max(0.0);
                let std = var.sqrt();
                SensorStats {
                    mean,
                    std: if std > f64::EPSILON { std } else { 1.0 },
                }
            })
            .collect::<Vec<_>>();
        debug!(sensors = stats.len(), "fitted window transformer");
        self.stats = Some(stats);
        Ok(())
    }

    fn process(&self, recording: &Recording) -> Result<Sample> {
        let stats = self
            .stats
            .as_ref()
            .ok_or_else(|| PipelineError::Engine("transformer has not been fitted".to_string()))?;
        self.check_shape(recording)?;

        let normalized = self
            .downsample(&recording.signal)?
            .map_rows(|sensor, row| {
                let s = stats[sensor];
                row.iter().map(|v| (v - s.mean) / s.std).collect()
            })?;

        let width = self.number_of_timesteps;
        let chunks = (0..normalized.cols() / width)
            .map(|i| {
                let window = normalized.columns(i * width, (i + 1) * width);
                if self.enable_fft {
                    window.map_rows(|_, row| dft_magnitude(row))
                } else {
                    Ok(window)
                }
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Sample::new(
            chunks,
            recording.sample_rate / self.downsample_factor as f64,
            width,
        ))
    }
}

/// `|X_k| / n` for `k in 0..n`.
fn dft_magnitude(row: &[f64]) -> Vec<f64> {
    let n = row.len();
    (0..n)
        .map(|k| {
            let (re, im) = row.iter().enumerate().fold((0.0, 0.0), |(re, im), (t, x)| {
                let angle = -2.0 * PI * (k * t) as f64 / n as f64;
                (re + x * angle.cos(), im + x * angle.sin())
            });
            (re * re + im * im).sqrt() / n as f64
        })
        .collect()
}
