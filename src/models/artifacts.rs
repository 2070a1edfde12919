//! Interfaces for fitted artifacts and the loaded bundle

use crate::error::{PipelineStage, TransformError};
use crate::schema::FeatureSchema;
use ndarray::{Array1, Array2, ArrayView2};

/// A fitted, fit-free transformation (feature scaler or dimensionality reducer).
pub trait Transformer: Send + Sync {
    /// Apply the stored transformation to every row of `x`.
    fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, TransformError>;

    /// Input width the artifact was fitted on, when the backend exposes it.
    fn n_features_in(&self) -> Option<usize>;

    /// Output width, when known ahead of a call.
    fn n_features_out(&self) -> Option<usize>;
}

/// A fitted binary classifier.
///
/// Column `i` of [`Classifier::predict_proba`] is the probability of the
/// `i`-th class in the classifier's class ordering. Column 1 is read as
/// the attack probability.
pub trait Classifier: Send + Sync {
    /// Discrete label for every row.
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<i64>, TransformError>;

    /// Class-probability matrix, one column per class.
    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, TransformError>;

    /// Input width the classifier was fitted on, when known.
    fn n_features_in(&self) -> Option<usize>;

    /// Labels and class probabilities in one pass.
    ///
    /// Backends that produce both from a single evaluation override this.
    fn predict_with_proba(
        &self,
        x: ArrayView2<'_, f64>,
    ) -> Result<(Array1<i64>, Array2<f64>), TransformError> {
        Ok((self.predict(x)?, self.predict_proba(x)?))
    }
}

/// Reject inputs whose width differs from the fitted width.
pub(crate) fn check_width(expected: usize, x: &ArrayView2<'_, f64>) -> Result<(), TransformError> {
    if x.ncols() == expected {
        Ok(())
    } else {
        Err(TransformError::ShapeMismatch {
            expected,
            actual: x.ncols(),
        })
    }
}

/// Everything inference needs, loaded once and shared read-only.
pub struct TrainedArtifacts {
    pub schema: FeatureSchema,
    pub scaler: Box<dyn Transformer>,
    pub reducer: Box<dyn Transformer>,
    pub classifier: Box<dyn Classifier>,
}

impl TrainedArtifacts {
    pub fn new(
        schema: FeatureSchema,
        scaler: Box<dyn Transformer>,
        reducer: Box<dyn Transformer>,
        classifier: Box<dyn Classifier>,
    ) -> Self {
        Self {
            schema,
            scaler,
            reducer,
            classifier,
        }
    }

    /// Cross-check the widths each artifact reports.
    ///
    /// Returns the first artifact whose input width disagrees with what
    /// feeds it. Unknown widths are skipped and caught per call instead.
    pub fn check_consistency(&self) -> Result<(), (PipelineStage, String)> {
        let stages = [
            (PipelineStage::Scaler, self.scaler.n_features_in(), self.scaler.n_features_out()),
            (PipelineStage::Reducer, self.reducer.n_features_in(), self.reducer.n_features_out()),
            (PipelineStage::Classifier, self.classifier.n_features_in(), None),
        ];
        let mut width = Some(self.schema.len());
        for (stage, n_in, n_out) in stages {
            if let (Some(expected), Some(actual)) = (width, n_in) {
                if expected != actual {
                    return Err((
                        stage,
                        format!(
                            "{} expects {} input features, upstream produces {}",
                            stage, actual, expected
                        ),
                    ));
                }
            }
            width = n_out;
        }
        Ok(())
    }
}

impl std::fmt::Debug for TrainedArtifacts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainedArtifacts")
            .field("features", &self.schema.len())
            .field("scaler_in", &self.scaler.n_features_in())
            .field("reducer_out", &self.reducer.n_features_out())
            .field("classifier_in", &self.classifier.n_features_in())
            .finish()
    }
}
