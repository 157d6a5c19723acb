//! Post-processing of diagnostic results for display.

use crate::domain::DiagnosticChunk;
use crate::error::{PipelineError, Result};

/// Sorts chunks by index and splits them into runs of consecutive indices.
pub fn group_adjacent_chunks(mut chunks: Vec<DiagnosticChunk>) -> Vec<Vec<DiagnosticChunk>> {
    chunks.sort_by_key(|c| c.index);
    let mut groups: Vec<Vec<DiagnosticChunk>> = Vec::new();
    for chunk in chunks {
        match groups.last_mut() {
            Some(group) if group.last().is_some_and(|prev| prev.index + 1 == chunk.index) => {
                group.push(chunk)
            }
            _ => groups.push(vec![chunk]),
        }
    }
    groups
}

/// Joins a group along the time axis. The result carries the first
/// member's index and time offset.
pub fn cumulative_result(group: &[DiagnosticChunk]) -> Result<DiagnosticChunk> {
    let (first, rest) = group
        .split_first()
        .ok_or_else(|| PipelineError::InvalidInput("cannot join an empty group".to_string()))?;
    let mut original = first.original.clone();
    let mut synthetic = first.synthetic.clone();
    for chunk in rest {
        original = original.hconcat(&chunk.original)?;
        synthetic = synthetic.hconcat(&chunk.synthetic)?;
    }
    Ok(DiagnosticChunk {
        index: first.index,
        time_offset: first.time_offset,
        original,
        synthetic,
    })
}

/// Frequency labels for a spectrum of `size` bins, rounded to two decimals.
pub fn frequency_index(size: usize, chunk_seconds: f64, downsample_factor: f64) -> Vec<f64> {
    (1..=size)
        .map(|i| (downsample_factor / chunk_seconds * i as f64 * 100.0).round() / 100.0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Matrix;

    fn chunk(index: usize, rows: usize, cols: usize) -> DiagnosticChunk {
        DiagnosticChunk {
            index,
            time_offset: index as f64 * 0.5,
            original: Matrix::zeros(rows, cols),
            synthetic: Matrix::new(rows, cols, vec![index as f64; rows * cols]).unwrap(),
        }
    }

    #[test]
    fn groups_split_on_gaps() {
        let chunks = [5, 1, 2, 7, 3].map(|i| chunk(i, 1, 1)).to_vec();
        let indices: Vec<Vec<usize>> = group_adjacent_chunks(chunks)
            .iter()
            .map(|g| g.iter().map(|c| c.index).collect())
            .collect();
        assert_eq!(indices, vec![vec![1, 2, 3], vec![5], vec![7]]);
    }

    #[test]
    fn no_chunks_no_groups() {
        assert!(group_adjacent_chunks(Vec::new()).is_empty());
    }

    #[test]
    fn cumulative_result_joins_columns() {
        let joined = cumulative_result(&[chunk(3, 4, 2), chunk(4, 4, 2)]).unwrap();
        assert_eq!(joined.original.shape(), (4, 4));
        assert_eq!(joined.synthetic.shape(), (4, 4));
        assert_eq!(joined.index, 3);
        assert_eq!(joined.time_offset, 1.5);
        assert_eq!(joined.synthetic.row(0), &[3.0, 3.0, 4.0, 4.0]);
    }

    #[test]
    fn cumulative_result_rejects_empty_groups() {
        assert!(cumulative_result(&[]).is_err());
    }

    #[test]
    fn frequency_labels() {
        assert_eq!(frequency_index(3, 3.0, 4.0), vec![1.33, 2.67, 4.0]);
    }
}
