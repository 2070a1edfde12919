//! ONNX Runtime backed artifacts

use crate::error::TransformError;
use crate::models::artifacts::{check_width, Classifier, Transformer};
use anyhow::{Context, Result};
use ndarray::{Array1, Array2, ArrayView2};
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

/// ONNX session plus the names and widths discovered at load time.
pub struct OnnxModel {
    name: String,
    /// Running a session needs exclusive access
    session: Mutex<Session>,
    input_name: String,
    n_features_in: Option<usize>,
}

impl OnnxModel {
    /// Load a model graph from file.
    pub fn load<P: AsRef<Path>>(path: P, name: &str, threads: usize) -> Result<Self> {
        let path = path.as_ref();

        info!(model = %name, path = %path.display(), threads, "Loading ONNX model");

        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(threads)?
            .commit_from_file(path)
            .with_context(|| format!("Failed to load model from {:?}", path))?;

        let input = session
            .inputs
            .first()
            .context("Model declares no inputs")?;
        let input_name = input.name.clone();
        let n_features_in = input
            .input_type
            .tensor_shape()
            .and_then(|shape| shape.last().copied())
            .filter(|&d| d > 0)
            .map(|d| d as usize);

        info!(
            model = %name,
            input = %input_name,
            n_features_in = ?n_features_in,
            "Model loaded successfully"
        );

        Ok(Self {
            name: name.to_string(),
            session: Mutex::new(session),
            input_name,
            n_features_in,
        })
    }

    fn output_names(&self) -> Result<Vec<String>> {
        let session = lock(&self.session)?;
        Ok(session.outputs.iter().map(|o| o.name.clone()).collect())
    }

    /// Run the graph on `x` and hand the outputs to `extract`.
    fn run<T>(
        &self,
        x: ArrayView2<'_, f64>,
        extract: impl FnOnce(&SessionOutputs) -> Result<T, TransformError>,
    ) -> Result<T, TransformError> {
        if let Some(expected) = self.n_features_in {
            check_width(expected, &x)?;
        }
        let shape = vec![x.nrows() as i64, x.ncols() as i64];
        let data: Vec<f32> = x.iter().map(|&v| v as f32).collect();
        let input = Tensor::from_array((shape, data)).map_err(runtime)?;

        let mut session = self
            .session
            .lock()
            .map_err(|e| TransformError::Runtime(format!("Lock error: {}", e)))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(runtime)?;
        debug!(model = %self.name, rows = x.nrows(), "ONNX inference complete");
        extract(&outputs)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|e| anyhow::anyhow!("Lock error: {}", e))
}

fn runtime(e: impl std::fmt::Display) -> TransformError {
    TransformError::Runtime(e.to_string())
}

/// Read an `f32` tensor output as a rows × cols matrix.
fn tensor_to_matrix(output: &DynValue, rows: usize) -> Result<Array2<f64>, TransformError> {
    let (shape, data) = output.try_extract_tensor::<f32>().map_err(runtime)?;
    let dims: Vec<i64> = shape.iter().copied().collect();
    let cols = match dims.as_slice() {
        [n, k] if *n as usize == rows => *k as usize,
        [n] if *n as usize == rows => 1,
        other => {
            return Err(TransformError::InvalidOutput(format!(
                "unexpected output shape {:?} for {} rows",
                other, rows
            )))
        }
    };
    let values: Vec<f64> = data.iter().map(|&v| v as f64).collect();
    Array2::from_shape_vec((rows, cols), values).map_err(runtime)
}

/// Scaler or reducer exported as an ONNX graph.
pub struct OnnxTransformer {
    model: OnnxModel,
    output_name: String,
    n_features_out: Option<usize>,
}

impl OnnxTransformer {
    pub fn load<P: AsRef<Path>>(path: P, name: &str, threads: usize) -> Result<Self> {
        let model = OnnxModel::load(path, name, threads)?;
        let (output_name, n_features_out) = {
            let session = lock(&model.session)?;
            let output = session.outputs.first().context("Model declares no outputs")?;
            let width = output
                .output_type
                .tensor_shape()
                .and_then(|shape| shape.last().copied())
                .filter(|&d| d > 0)
                .map(|d| d as usize);
            (output.name.clone(), width)
        };
        Ok(Self {
            model,
            output_name,
            n_features_out,
        })
    }
}

impl Transformer for OnnxTransformer {
    fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, TransformError> {
        let rows = x.nrows();
        self.model.run(x, |outputs| {
            let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
                TransformError::InvalidOutput(format!("missing output {}", self.output_name))
            })?;
            tensor_to_matrix(output, rows)
        })
    }

    fn n_features_in(&self) -> Option<usize> {
        self.model.n_features_in
    }

    fn n_features_out(&self) -> Option<usize> {
        self.n_features_out
    }
}

/// Classifier exported with a label output and a class-probability output.
pub struct OnnxClassifier {
    model: OnnxModel,
    label_output: String,
    proba_output: String,
}

impl OnnxClassifier {
    pub fn load<P: AsRef<Path>>(path: P, name: &str, threads: usize) -> Result<Self> {
        let model = OnnxModel::load(path, name, threads)?;
        let outputs = model.output_names()?;

        let label_output = outputs
            .iter()
            .find(|o| o.contains("label"))
            .or_else(|| outputs.first())
            .cloned()
            .context("Classifier declares no outputs")?;
        let proba_output = outputs
            .iter()
            .find(|o| o.contains("prob"))
            .or_else(|| outputs.last())
            .cloned()
            .context("Classifier declares no probability output")?;
        if label_output == proba_output {
            anyhow::bail!("Classifier must expose separate label and probability outputs");
        }

        info!(model = %name, label = %label_output, probabilities = %proba_output, "Classifier outputs resolved");

        Ok(Self {
            model,
            label_output,
            proba_output,
        })
    }

    fn extract_labels(&self, outputs: &SessionOutputs) -> Result<Array1<i64>, TransformError> {
        let output = outputs.get(self.label_output.as_str()).ok_or_else(|| {
            TransformError::InvalidOutput(format!("missing output {}", self.label_output))
        })?;
        let (_, data) = output.try_extract_tensor::<i64>().map_err(runtime)?;
        Ok(Array1::from(data.to_vec()))
    }

    /// Probabilities come either as an `[n, classes]` tensor or, when the
    /// exporter wrapped them, as a sequence of class → probability maps.
    fn extract_probabilities(
        &self,
        outputs: &SessionOutputs,
        rows: usize,
    ) -> Result<Array2<f64>, TransformError> {
        let output = outputs.get(self.proba_output.as_str()).ok_or_else(|| {
            TransformError::InvalidOutput(format!("missing output {}", self.proba_output))
        })?;

        if let Ok(matrix) = tensor_to_matrix(output, rows) {
            return Ok(matrix);
        }
        if DynSequenceValueType::can_downcast(&output.dtype()) {
            return self.extract_from_sequence_map(output, rows);
        }
        Err(TransformError::InvalidOutput(format!(
            "unsupported probability output type {:?}",
            output.dtype()
        )))
    }

    fn extract_from_sequence_map(
        &self,
        output: &DynValue,
        rows: usize,
    ) -> Result<Array2<f64>, TransformError> {
        let allocator = Allocator::default();
        let sequence = output
            .downcast_ref::<DynSequenceValueType>()
            .map_err(runtime)?;
        let maps = sequence
            .try_extract_sequence::<DynMapValueType>(&allocator)
            .map_err(runtime)?;
        if maps.len() != rows {
            return Err(TransformError::InvalidOutput(format!(
                "{} probability maps for {} rows",
                maps.len(),
                rows
            )));
        }

        let pairs = maps
            .iter()
            .map(|map| map.try_extract_key_values::<i64, f32>().map_err(runtime))
            .collect::<Result<Vec<_>, _>>()?;
        probability_rows(&pairs)
    }
}

/// Dense `[rows, 2]` probabilities from per-row class → probability pairs.
///
/// Every row must carry exactly classes 0 and 1.
fn probability_rows(rows: &[Vec<(i64, f32)>]) -> Result<Array2<f64>, TransformError> {
    let mut proba = Array2::zeros((rows.len(), 2));
    for (i, pairs) in rows.iter().enumerate() {
        let mut written = [false; 2];
        for &(class_id, p) in pairs {
            let col = match class_id {
                0 | 1 => class_id as usize,
                other => {
                    return Err(TransformError::InvalidOutput(format!(
                        "unexpected class {} in probability map of row {}",
                        other, i
                    )))
                }
            };
            proba[[i, col]] = p as f64;
            written[col] = true;
        }
        if let Some(col) = written.iter().position(|w| !w) {
            return Err(TransformError::InvalidOutput(format!(
                "probability map of row {} has no entry for class {}",
                i, col
            )));
        }
    }
    Ok(proba)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_probability_rows_from_maps() {
        let rows = vec![vec![(1, 0.25), (0, 0.75)], vec![(0, 0.1), (1, 0.9)]];
        let proba = probability_rows(&rows).unwrap();
        assert_eq!(proba, array![[0.75, 0.25], [0.1f32 as f64, 0.9f32 as f64]]);
    }

    #[test]
    fn test_probability_rows_require_both_classes() {
        let rows = vec![vec![(0, 0.6), (1, 0.4)], vec![(0, 1.0)]];
        match probability_rows(&rows) {
            Err(TransformError::InvalidOutput(msg)) => {
                assert!(msg.contains("row 1 has no entry for class 1"))
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_poisoned_lock_is_reported() {
        let mutex = std::sync::Arc::new(Mutex::new(vec!["label".to_string()]));
        let poisoner = std::sync::Arc::clone(&mutex);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison");
        })
        .join();

        let err = lock(&*mutex).unwrap_err();
        assert!(err.to_string().starts_with("Lock error"));
    }

    #[test]
    fn test_probability_rows_reject_unknown_class() {
        let rows = vec![vec![(0, 0.5), (1, 0.3), (2, 0.2)]];
        assert!(matches!(
            probability_rows(&rows),
            Err(TransformError::InvalidOutput(_))
        ));
    }
}

impl Classifier for OnnxClassifier {
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<i64>, TransformError> {
        self.model.run(x, |outputs| self.extract_labels(outputs))
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, TransformError> {
        let rows = x.nrows();
        self.model
            .run(x, |outputs| self.extract_probabilities(outputs, rows))
    }

    fn n_features_in(&self) -> Option<usize> {
        self.model.n_features_in
    }

    fn predict_with_proba(
        &self,
        x: ArrayView2<'_, f64>,
    ) -> Result<(Array1<i64>, Array2<f64>), TransformError> {
        let rows = x.nrows();
        self.model.run(x, |outputs| {
            Ok((
                self.extract_labels(outputs)?,
                self.extract_probabilities(outputs, rows)?,
            ))
        })
    }
}
