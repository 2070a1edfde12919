//! Joins classifier output back to the uploaded rows.

use crate::error::{DetectorError, PipelineStage, Result, TransformError};
use crate::types::{PredictionResult, Status};

/// Zip row indices, labels and attack probabilities into results.
///
/// Order is preserved. Sequences of unequal length or labels other than
/// 0/1 are pipeline failures; no partial result is returned.
pub fn assemble(
    original_indices: &[usize],
    labels: &[i64],
    probabilities: &[f64],
) -> Result<Vec<PredictionResult>> {
    if original_indices.len() != labels.len() || labels.len() != probabilities.len() {
        return Err(DetectorError::pipeline(
            PipelineStage::Assembly,
            TransformError::InvalidOutput(format!(
                "{} rows, {} labels, {} probabilities",
                original_indices.len(),
                labels.len(),
                probabilities.len()
            )),
        ));
    }

    original_indices
        .iter()
        .zip(labels)
        .zip(probabilities)
        .map(|((&index, &label), &probability)| {
            let status = Status::from_code(label).ok_or_else(|| {
                DetectorError::pipeline(
                    PipelineStage::Assembly,
                    TransformError::InvalidOutput(format!("unknown prediction code {}", label)),
                )
            })?;
            Ok(PredictionResult::new(index, status, probability))
        })
        .collect()
}
