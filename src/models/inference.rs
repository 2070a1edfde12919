//! Three-stage inference: standardize, reduce, classify

use crate::error::{DetectorError, PipelineStage, Result, TransformError};
use crate::models::artifacts::TrainedArtifacts;
use ndarray::{Array1, Array2, ArrayView2};
use std::time::Instant;
use tracing::debug;

/// Index of the attack class in the classifier's probability output
pub const ATTACK_CLASS_INDEX: usize = 1;

/// Tolerance for probabilities that leave [0, 1] through float rounding
const PROBABILITY_EPSILON: f64 = 1e-6;

/// Per-row classifier output
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceOutput {
    /// Predicted class codes (0 = normal, 1 = attack)
    pub labels: Array1<i64>,
    /// Probability of the attack class
    pub attack_probabilities: Array1<f64>,
}

impl InferenceOutput {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// Runs prepared feature matrices through the trained artifacts.
pub struct InferencePipeline<'a> {
    artifacts: &'a TrainedArtifacts,
}

impl<'a> InferencePipeline<'a> {
    pub fn new(artifacts: &'a TrainedArtifacts) -> Self {
        Self { artifacts }
    }

    /// Apply scaler, reducer and classifier in sequence.
    pub fn infer(&self, x: ArrayView2<'_, f64>) -> Result<InferenceOutput> {
        let rows = x.nrows();
        let expected = self.artifacts.schema.len();
        if x.ncols() != expected {
            return Err(DetectorError::pipeline(
                PipelineStage::Scaler,
                TransformError::ShapeMismatch {
                    expected,
                    actual: x.ncols(),
                },
            ));
        }

        let start = Instant::now();
        let scaled = self
            .artifacts
            .scaler
            .transform(x)
            .map_err(|e| DetectorError::pipeline(PipelineStage::Scaler, e))?;
        check_shape(PipelineStage::Scaler, &scaled, rows, Some(x.ncols()))?;
        debug!(rows, cols = scaled.ncols(), elapsed_us = start.elapsed().as_micros() as u64, "Features standardized");

        let start = Instant::now();
        let reduced = self
            .artifacts
            .reducer
            .transform(scaled.view())
            .map_err(|e| DetectorError::pipeline(PipelineStage::Reducer, e))?;
        check_shape(
            PipelineStage::Reducer,
            &reduced,
            rows,
            self.artifacts.reducer.n_features_out(),
        )?;
        debug!(rows, components = reduced.ncols(), elapsed_us = start.elapsed().as_micros() as u64, "Features projected");

        let start = Instant::now();
        let (labels, proba) = self
            .artifacts
            .classifier
            .predict_with_proba(reduced.view())
            .map_err(|e| DetectorError::pipeline(PipelineStage::Classifier, e))?;
        let output = classifier_output(labels, proba, rows)
            .map_err(|e| DetectorError::pipeline(PipelineStage::Classifier, e))?;
        debug!(rows, elapsed_us = start.elapsed().as_micros() as u64, "Rows classified");

        Ok(output)
    }
}

/// Convenience wrapper over [`InferencePipeline::infer`].
pub fn infer(x: ArrayView2<'_, f64>, artifacts: &TrainedArtifacts) -> Result<InferenceOutput> {
    InferencePipeline::new(artifacts).infer(x)
}

fn check_shape(
    stage: PipelineStage,
    out: &Array2<f64>,
    rows: usize,
    cols: Option<usize>,
) -> Result<()> {
    if out.nrows() != rows {
        return Err(DetectorError::pipeline(
            stage,
            TransformError::InvalidOutput(format!("{} output rows for {} input rows", out.nrows(), rows)),
        ));
    }
    if let Some(expected) = cols {
        if out.ncols() != expected {
            return Err(DetectorError::pipeline(
                stage,
                TransformError::InvalidOutput(format!(
                    "{} output columns, expected {}",
                    out.ncols(),
                    expected
                )),
            ));
        }
    }
    Ok(())
}

/// Validate classifier output and pick the attack-class probability column.
fn classifier_output(
    labels: Array1<i64>,
    proba: Array2<f64>,
    rows: usize,
) -> std::result::Result<InferenceOutput, TransformError> {
    if labels.len() != rows || proba.nrows() != rows {
        return Err(TransformError::InvalidOutput(format!(
            "{} labels and {} probability rows for {} input rows",
            labels.len(),
            proba.nrows(),
            rows
        )));
    }
    if proba.ncols() <= ATTACK_CLASS_INDEX {
        return Err(TransformError::InvalidOutput(format!(
            "probability output has {} columns, attack class index is {}",
            proba.ncols(),
            ATTACK_CLASS_INDEX
        )));
    }
    if let Some(label) = labels.iter().find(|&&l| l != 0 && l != 1) {
        return Err(TransformError::InvalidOutput(format!(
            "label {} is outside {{0, 1}}",
            label
        )));
    }

    let mut attack_probabilities = proba.column(ATTACK_CLASS_INDEX).to_owned();
    for p in attack_probabilities.iter_mut() {
        if !(-PROBABILITY_EPSILON..=1.0 + PROBABILITY_EPSILON).contains(&*p) {
            return Err(TransformError::InvalidOutput(format!(
                "probability {} is outside [0, 1]",
                p
            )));
        }
        *p = p.clamp(0.0, 1.0);
    }

    Ok(InferenceOutput {
        labels,
        attack_probabilities,
    })
}
