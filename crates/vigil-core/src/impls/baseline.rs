//! BaselineDetective: per-position mean template.
//!
//! Training averages every chunk into a template of the chunk shape and
//! stores it as JSON at the save path. Retraining from a parent folds the new
//! chunks into the parent's running mean. A chunk's score is its mean squared
//! deviation from the template; its reconstruction is the template itself.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::domain::{Configuration, Matrix, Sample};
use crate::error::{PipelineError, Result};
use crate::ports::Detective;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BaselineModel {
    template: Matrix,
    samples_seen: usize,
}

impl BaselineModel {
    fn read(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            PipelineError::Engine(format!("cannot open model at {}: {e}", path.display()))
        })?;
        Ok(serde_json::from_reader(BufReader::new(file))?)
    }

    fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_vec(self)?)?;
        Ok(())
    }

    fn check_shape(&self, chunk: &Matrix) -> Result<()> {
        if chunk.shape() != self.template.shape() {
            return Err(PipelineError::Engine(format!(
                "chunk shape {:?} does not match model shape {:?}",
                chunk.shape(),
                self.template.shape()
            )));
        }
        Ok(())
    }

    fn score(&self, chunk: &Matrix) -> Result<f64> {
        self.check_shape(chunk)?;
        let n = chunk.data().len().max(1) as f64;
        Ok(chunk
            .data()
            .iter()
            .zip(self.template.data())
            .map(|(x, t)| (x - t).powi(2))
            .sum::<f64>()
            / n)
    }
}

#[derive(Debug, Clone)]
pub struct BaselineDetective {
    load_path: Option<PathBuf>,
    save_path: Option<PathBuf>,
    train_iters: u64,
    learning_rate: f64,
    model: Option<BaselineModel>,
}

impl BaselineDetective {
    pub fn new(load_path: Option<PathBuf>, save_path: Option<PathBuf>) -> Self {
        Self {
            load_path,
            save_path,
            train_iters: 1,
            learning_rate: 0.0,
            model: None,
        }
    }

    pub fn from_configuration(configuration: &Configuration) -> Result<Self> {
        let mut detective = Self::new(
            configuration.load_path().map(PathBuf::from),
            configuration.save_path().map(PathBuf::from),
        );
        detective.train_iters = configuration.train_iters().unwrap_or(1);
        detective.learning_rate = configuration.learning_rate().unwrap_or(0.0);
        Ok(detective)
    }

    fn current_model(&self) -> Result<BaselineModel> {
        if let Some(model) = &self.model {
            return Ok(model.clone());
        }
        match &self.load_path {
            Some(path) => BaselineModel::read(path),
            None => Err(PipelineError::Engine(
                "detective has neither a trained model nor a load path".to_string(),
            )),
        }
    }
}

impl Detective for BaselineDetective {
    fn load_path(&self) -> Option<&Path> {
        self.load_path.as_deref()
    }

    fn set_load_path(&mut self, path: Option<PathBuf>) {
        self.load_path = path;
    }

    fn train(&mut self, data: &Sample) -> Result<()> {
        let first = data
            .chunks
            .first()
            .ok_or_else(|| PipelineError::Engine("no chunks to train on".to_string()))?;
        debug!(
            chunks = data.len(),
            train_iters = self.train_iters,
            learning_rate = self.learning_rate,
            "training baseline template"
        );

        let (mut sums, mut seen) = match &self.load_path {
            Some(path) => {
                let parent = BaselineModel::read(path)?;
                parent.check_shape(first)?;
                let weight = parent.samples_seen as f64;
                let sums: Vec<f64> = parent.template.data().iter().map(|v| v * weight).collect();
                (sums, parent.samples_seen)
            }
            None => (vec![0.0; first.data().len()], 0),
        };
        for chunk in &data.chunks {
            if chunk.shape() != first.shape() {
                return Err(PipelineError::Engine(
                    "training chunks have inconsistent shapes".to_string(),
                ));
            }
            for (acc, v) in sums.iter_mut().zip(chunk.data()) {
                *acc += v;
            }
            seen += 1;
        }
        let template = Matrix::new(
            first.rows(),
            first.cols(),
            sums.into_iter().map(|s| s / seen as f64).collect(),
        )?;
        let model = BaselineModel {
            template,
            samples_seen: seen,
        };
        if let Some(path) = &self.save_path {
            model.write(path)?;
            info!(path = %path.display(), samples = seen, "saved baseline model");
        }
        self.model = Some(model);
        Ok(())
    }

    fn detect(&self, data: &Sample) -> Result<Vec<f64>> {
        let model = self.current_model()?;
        data.chunks.iter().map(|chunk| model.score(chunk)).collect()
    }

    fn diagnose(&self, chunk: &Matrix, _offset_seconds: f64) -> Result<Matrix> {
        let model = self.current_model()?;
        model.check_shape(chunk)?;
        Ok(model.template)
    }
}
