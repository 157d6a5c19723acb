//! Signal containers: raw recordings, chunk matrices and chunked samples.

use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Dense row-major matrix. Rows are sensors (or spectral bins), columns are
/// the time axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize, data: Vec<f64>) -> Result<Self> {
        if rows * cols != data.len() {
            return Err(PipelineError::InvalidInput(format!(
                "matrix of shape ({rows}, {cols}) needs {} values, got {}",
                rows * cols,
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_rows(rows: Vec<Vec<f64>>) -> Result<Self> {
        let cols = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|row| row.len() != cols) {
            return Err(PipelineError::InvalidInput(
                "rows of a matrix must all have the same length".to_string(),
            ));
        }
        let height = rows.len();
        Ok(Self {
            rows: height,
            cols,
            data: rows.into_iter().flatten().collect(),
        })
    }

    /// A single row holding `values`.
    pub fn row_vector(values: Vec<f64>) -> Self {
        Self {
            rows: 1,
            cols: values.len(),
            data: values,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn row(&self, index: usize) -> &[f64] {
        &self.data[index * self.cols..(index + 1) * self.cols]
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.cols + col]
    }

    /// Columns `start..end` of every row.
    pub fn columns(&self, start: usize, end: usize) -> Matrix {
        let data = (0..self.rows)
            .flat_map(|r| self.row(r)[start..end].iter().copied())
            .collect();
        Matrix {
            rows: self.rows,
            cols: end - start,
            data,
        }
    }

    pub fn map_rows(&self, f: impl Fn(usize, &[f64]) -> Vec<f64>) -> Result<Matrix> {
        Matrix::from_rows((0..self.rows).map(|r| f(r, self.row(r))).collect())
    }

    /// Concatenates `other` to the right of `self` (along the time axis).
    pub fn hconcat(&self, other: &Matrix) -> Result<Matrix> {
        if self.rows != other.rows {
            return Err(PipelineError::InvalidInput(format!(
                "cannot concatenate matrices with {} and {} rows",
                self.rows, other.rows
            )));
        }
        let data = (0..self.rows)
            .flat_map(|r| self.row(r).iter().chain(other.row(r)).copied())
            .collect();
        Ok(Matrix {
            rows: self.rows,
            cols: self.cols + other.cols,
            data,
        })
    }
}

/// Recording payload as found on disk: either a single channel or a grid of
/// channels. Single channels are promoted to a one-row matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawSignal {
    Flat(Vec<f64>),
    Grid(Vec<Vec<f64>>),
}

impl RawSignal {
    pub fn into_matrix(self) -> Result<Matrix> {
        match self {
            RawSignal::Flat(values) => Ok(Matrix::row_vector(values)),
            RawSignal::Grid(rows) => Matrix::from_rows(rows),
        }
    }
}

/// Raw multichannel recording of one upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recording {
    /// Samples per second of every channel.
    pub sample_rate: f64,
    /// `sensors × samples`.
    pub signal: Matrix,
}

/// A recording after windowing: equally sized chunks along the time axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub chunks: Vec<Matrix>,
    /// Rate of the chunk columns after downsampling.
    pub sample_rate: f64,
    pub number_of_timesteps: usize,
}

impl Sample {
    pub fn new(chunks: Vec<Matrix>, sample_rate: f64, number_of_timesteps: usize) -> Self {
        Self {
            chunks,
            sample_rate,
            number_of_timesteps,
        }
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunk(&self, index: usize) -> Result<&Matrix> {
        self.chunks.get(index).ok_or_else(|| {
            PipelineError::InvalidInput(format!(
                "chunk {index} out of range for a sample of {} chunks",
                self.chunks.len()
            ))
        })
    }

    /// Offset in seconds of chunk `index` from the start of the sample.
    pub fn timedelta_for_chunk(&self, index: usize) -> f64 {
        chunk_offset_seconds(index, self.number_of_timesteps, self.sample_rate)
    }

    /// Splits at `floor(ratio * len)`, preserving order.
    pub fn split(self, ratio: f64) -> (Sample, Sample) {
        let upper = ((self.chunks.len() as f64) * ratio).floor() as usize;
        let mut head = self.chunks;
        let tail = head.split_off(upper.min(head.len()));
        (
            Sample::new(head, self.sample_rate, self.number_of_timesteps),
            Sample::new(tail, self.sample_rate, self.number_of_timesteps),
        )
    }

    /// Appends the chunks of `other`, which must share this sample's geometry.
    pub fn extend(&mut self, other: Sample) -> Result<()> {
        if other.number_of_timesteps != self.number_of_timesteps
            || other.sample_rate != self.sample_rate
        {
            return Err(PipelineError::InvalidInput(
                "samples with different rate or chunk length cannot be combined".to_string(),
            ));
        }
        self.chunks.extend(other.chunks);
        Ok(())
    }
}

pub fn chunk_offset_seconds(index: usize, timesteps_per_chunk: usize, sample_rate: f64) -> f64 {
    if sample_rate == 0.0 {
        return 0.0;
    }
    (index * timesteps_per_chunk) as f64 / sample_rate
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(n: usize) -> Sample {
        let chunks = (0..n).map(|i| Matrix::row_vector(vec![i as f64])).collect();
        Sample::new(chunks, 2.0, 4)
    }

    #[test]
    fn split_keeps_order_at_eighty_percent() {
        let (train, test) = sample(100).split(0.8);
        assert_eq!(train.len(), 80);
        assert_eq!(test.len(), 20);
        assert_eq!(train.chunks[0].get(0, 0), 0.0);
        assert_eq!(train.chunks[79].get(0, 0), 79.0);
        assert_eq!(test.chunks[0].get(0, 0), 80.0);
    }

    #[test]
    fn split_of_tiny_sample_floors() {
        let (train, test) = sample(3).split(0.8);
        assert_eq!((train.len(), test.len()), (2, 1));
    }

    #[test]
    fn flat_signal_becomes_one_row() {
        let raw: RawSignal = serde_json::from_str("[1.0, 2.0, 3.0]").unwrap();
        assert_eq!(raw.into_matrix().unwrap().shape(), (1, 3));

        let raw: RawSignal = serde_json::from_str("[[1.0, 2.0], [3.0, 4.0]]").unwrap();
        assert_eq!(raw.into_matrix().unwrap().shape(), (2, 2));
    }

    #[test]
    fn ragged_rows_are_rejected() {
        assert!(Matrix::from_rows(vec![vec![1.0], vec![1.0, 2.0]]).is_err());
    }

    #[test]
    fn hconcat_joins_time_axes() {
        let a = Matrix::new(2, 1, vec![1.0, 2.0]).unwrap();
        let b = Matrix::new(2, 2, vec![3.0, 4.0, 5.0, 6.0]).unwrap();
        let joined = a.hconcat(&b).unwrap();
        assert_eq!(joined.shape(), (2, 3));
        assert_eq!(joined.row(0), &[1.0, 3.0, 4.0]);
        assert_eq!(joined.row(1), &[2.0, 5.0, 6.0]);
    }

    #[test]
    fn chunk_offsets_follow_rate() {
        let sample = sample(10);
        assert_eq!(sample.timedelta_for_chunk(3), 6.0);
        assert!(sample.chunk(10).is_err());
    }
}
