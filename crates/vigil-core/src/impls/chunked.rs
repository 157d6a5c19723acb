//! ChunkedDataSource: concatenates processed recordings and splits them by
//! position.

use crate::domain::{Recording, Sample};
use crate::error::{PipelineError, Result};
use crate::ports::{DataSource, DataSourceFactory, Transformer};

pub const DEFAULT_TRAIN_RATIO: f64 = 0.8;

#[derive(Debug, Clone, Copy)]
pub struct ChunkedDataSource {
    train_ratio: f64,
}

impl ChunkedDataSource {
    pub fn new(train_ratio: f64) -> Self {
        Self {
            train_ratio: train_ratio.clamp(0.0, 1.0),
        }
    }
}

impl Default for ChunkedDataSource {
    fn default() -> Self {
        Self::new(DEFAULT_TRAIN_RATIO)
    }
}

impl DataSourceFactory for ChunkedDataSource {
    fn training(
        &self,
        recordings: &[Recording],
        transformer: &mut dyn Transformer,
    ) -> Result<DataSource> {
        if recordings.is_empty() {
            return Err(PipelineError::InvalidInput(
                "training needs at least one recording".to_string(),
            ));
        }
        transformer.fit(recordings)?;

        let mut processed = recordings.iter().map(|r| transformer.process(r));
        let mut combined = processed
            .next()
            .ok_or_else(|| PipelineError::InvalidInput("no recordings".to_string()))??;
        for sample in processed {
            combined.extend(sample?)?;
        }

        let (train, test) = combined.split(self.train_ratio);
        Ok(DataSource::new(train, test))
    }

    fn detection(
        &self,
        recording: &Recording,
        transformer: &dyn Transformer,
    ) -> Result<DataSource> {
        let test = transformer.process(recording)?;
        let train = Sample::new(Vec::new(), test.sample_rate, test.number_of_timesteps);
        Ok(DataSource::new(train, test))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Matrix;
    use crate::impls::WindowTransformer;

    fn recording(samples: usize) -> Recording {
        Recording {
            sample_rate: 10.0,
            signal: Matrix::row_vector((0..samples).map(|t| (t % 5) as f64).collect()),
        }
    }

    #[test]
    fn training_splits_eighty_twenty_across_recordings() {
        let mut transformer = WindowTransformer::new(1, 10, 1, false);
        // 60 + 40 samples -> 10 chunks
        let source = ChunkedDataSource::default()
            .training(&[recording(60), recording(40)], &mut transformer)
            .unwrap();
        assert_eq!(source.train_data().len(), 8);
        assert_eq!(source.test_data().len(), 2);
    }

    #[test]
    fn detection_puts_everything_in_test() {
        let mut transformer = WindowTransformer::new(1, 10, 1, false);
        let factory = ChunkedDataSource::default();
        factory.training(&[recording(100)], &mut transformer).unwrap();

        let source = factory.detection(&recording(30), &transformer).unwrap();
        assert!(source.train_data().is_empty());
        assert_eq!(source.test_data().len(), 3);
    }

    #[test]
    fn training_without_recordings_is_rejected() {
        let mut transformer = WindowTransformer::new(1, 10, 1, false);
        assert!(ChunkedDataSource::default().training(&[], &mut transformer).is_err());
    }
}
