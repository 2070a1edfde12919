//! Pure-Rust artifacts evaluated from exported fit parameters.
//!
//! Each artifact is read from a JSON document holding the attributes of the
//! fitted estimator (means, scales, projection components, support vectors).

use crate::error::TransformError;
use crate::models::artifacts::{check_width, Classifier, Transformer};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Exported parameters of a fitted standard scaler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScalerParams {
    #[serde(default)]
    pub mean: Option<Vec<f64>>,
    #[serde(default)]
    pub scale: Option<Vec<f64>>,
}

/// Per-feature affine standardization with training-time statistics.
#[derive(Debug, Clone)]
pub struct StandardScaler {
    mean: Option<Array1<f64>>,
    scale: Option<Array1<f64>>,
    n_features: usize,
}

impl StandardScaler {
    pub fn new(mean: Option<Array1<f64>>, scale: Option<Array1<f64>>) -> Result<Self, String> {
        let n_features = match (&mean, &scale) {
            (Some(m), Some(s)) if m.len() != s.len() => {
                return Err(format!(
                    "mean has {} entries but scale has {}",
                    m.len(),
                    s.len()
                ))
            }
            (Some(m), _) => m.len(),
            (None, Some(s)) => s.len(),
            (None, None) => return Err("scaler has neither mean nor scale".to_string()),
        };
        // Constant training features were stored with zero scale.
        let scale = scale.map(|s| s.mapv(|v| if v == 0.0 { 1.0 } else { v }));
        Ok(Self {
            mean,
            scale,
            n_features,
        })
    }

    pub fn identity(n_features: usize) -> Self {
        Self {
            mean: Some(Array1::zeros(n_features)),
            scale: Some(Array1::ones(n_features)),
            n_features,
        }
    }

    pub fn from_params(params: ScalerParams) -> Result<Self, String> {
        Self::new(params.mean.map(Array1::from), params.scale.map(Array1::from))
    }
}

impl Transformer for StandardScaler {
    fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, TransformError> {
        check_width(self.n_features, &x)?;
        let mut out = x.to_owned();
        if let Some(mean) = &self.mean {
            out -= mean;
        }
        if let Some(scale) = &self.scale {
            out /= scale;
        }
        Ok(out)
    }

    fn n_features_in(&self) -> Option<usize> {
        Some(self.n_features)
    }

    fn n_features_out(&self) -> Option<usize> {
        Some(self.n_features)
    }
}

/// Exported parameters of a fitted (incremental) PCA.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReducerParams {
    pub mean: Vec<f64>,
    /// One row per retained component
    pub components: Vec<Vec<f64>>,
    #[serde(default)]
    pub whiten: bool,
    #[serde(default)]
    pub explained_variance: Option<Vec<f64>>,
}

/// Linear projection onto stored principal components.
#[derive(Debug, Clone)]
pub struct PcaProjection {
    mean: Array1<f64>,
    /// components × features
    components: Array2<f64>,
    whiten_scale: Option<Array1<f64>>,
}

impl PcaProjection {
    /// `explained_variance` enables whitening when present.
    pub fn new(
        mean: Array1<f64>,
        components: Array2<f64>,
        explained_variance: Option<Array1<f64>>,
    ) -> Result<Self, String> {
        if components.nrows() == 0 {
            return Err("projection has no components".to_string());
        }
        if components.ncols() != mean.len() {
            return Err(format!(
                "components have {} features but mean has {}",
                components.ncols(),
                mean.len()
            ));
        }
        let whiten_scale = match explained_variance {
            Some(var) if var.len() != components.nrows() => {
                return Err(format!(
                    "{} explained variances for {} components",
                    var.len(),
                    components.nrows()
                ))
            }
            Some(var) if var.iter().any(|v| *v <= 0.0) => {
                return Err("explained variance must be positive to whiten".to_string())
            }
            Some(var) => Some(var.mapv(f64::sqrt)),
            None => None,
        };
        Ok(Self {
            mean,
            components,
            whiten_scale,
        })
    }

    pub fn identity(n_features: usize) -> Self {
        Self {
            mean: Array1::zeros(n_features),
            components: Array2::eye(n_features),
            whiten_scale: None,
        }
    }

    pub fn from_params(params: ReducerParams) -> Result<Self, String> {
        let components = rows_to_array(params.components, "components")?;
        let variance = if params.whiten {
            let var = params
                .explained_variance
                .ok_or("whiten requires explained_variance")?;
            Some(Array1::from(var))
        } else {
            None
        };
        Self::new(Array1::from(params.mean), components, variance)
    }

    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }
}

impl Transformer for PcaProjection {
    fn transform(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, TransformError> {
        check_width(self.mean.len(), &x)?;
        let centered = &x - &self.mean;
        let mut projected = centered.dot(&self.components.t());
        if let Some(scale) = &self.whiten_scale {
            projected /= scale;
        }
        Ok(projected)
    }

    fn n_features_in(&self) -> Option<usize> {
        Some(self.mean.len())
    }

    fn n_features_out(&self) -> Option<usize> {
        Some(self.components.nrows())
    }
}

/// Kernel function of a support-vector classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Kernel {
    Linear,
    Rbf,
    Poly,
    Sigmoid,
}

fn default_degree() -> i32 {
    3
}

/// Exported parameters of a fitted binary support-vector classifier.
///
/// `dual_coef` and `intercept` follow the convention where a positive
/// decision value selects `classes[1]`. `prob_a`/`prob_b` are the Platt
/// scaling coefficients fitted by libsvm, which apply to the negated
/// decision value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvcParams {
    pub classes: Vec<i64>,
    pub kernel: Kernel,
    #[serde(default)]
    pub gamma: Option<f64>,
    #[serde(default)]
    pub coef0: f64,
    #[serde(default = "default_degree")]
    pub degree: i32,
    pub support_vectors: Vec<Vec<f64>>,
    pub dual_coef: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub prob_a: Option<f64>,
    #[serde(default)]
    pub prob_b: Option<f64>,
}

/// Lower bound libsvm applies to pairwise probabilities.
const MIN_PROB: f64 = 1e-7;

/// Binary kernel SVM with Platt-scaled probabilities.
#[derive(Debug, Clone)]
pub struct SvmClassifier {
    classes: [i64; 2],
    kernel: Kernel,
    gamma: f64,
    coef0: f64,
    degree: i32,
    support_vectors: Array2<f64>,
    dual_coef: Array1<f64>,
    intercept: f64,
    prob_a: f64,
    prob_b: f64,
}

impl SvmClassifier {
    pub fn from_params(params: SvcParams) -> Result<Self, String> {
        let classes: [i64; 2] = params
            .classes
            .as_slice()
            .try_into()
            .map_err(|_| format!("expected 2 classes, found {}", params.classes.len()))?;
        let gamma = match (params.kernel, params.gamma) {
            (Kernel::Linear, g) => g.unwrap_or(0.0),
            (_, Some(g)) if g > 0.0 => g,
            (kernel, _) => return Err(format!("{:?} kernel requires a positive gamma", kernel)),
        };
        let (prob_a, prob_b) = match (params.prob_a, params.prob_b) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(
                    "classifier was fitted without probability estimates (prob_a/prob_b)"
                        .to_string(),
                )
            }
        };
        let support_vectors = rows_to_array(params.support_vectors, "support_vectors")?;
        if support_vectors.nrows() != params.dual_coef.len() {
            return Err(format!(
                "{} support vectors but {} dual coefficients",
                support_vectors.nrows(),
                params.dual_coef.len()
            ));
        }
        Ok(Self {
            classes,
            kernel: params.kernel,
            gamma,
            coef0: params.coef0,
            degree: params.degree,
            support_vectors,
            dual_coef: Array1::from(params.dual_coef),
            intercept: params.intercept,
            prob_a,
            prob_b,
        })
    }

    fn kernel(&self, a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
        match self.kernel {
            Kernel::Linear => a.dot(&b),
            Kernel::Rbf => {
                let dist: f64 = a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum();
                (-self.gamma * dist).exp()
            }
            Kernel::Poly => (self.gamma * a.dot(&b) + self.coef0).powi(self.degree),
            Kernel::Sigmoid => (self.gamma * a.dot(&b) + self.coef0).tanh(),
        }
    }

    /// Signed distance to the separating surface for every row.
    pub fn decision_function(&self, x: ArrayView2<'_, f64>) -> Result<Array1<f64>, TransformError> {
        check_width(self.support_vectors.ncols(), &x)?;
        Ok(x.outer_iter()
            .map(|row| {
                self.support_vectors
                    .outer_iter()
                    .zip(self.dual_coef.iter())
                    .map(|(sv, coef)| coef * self.kernel(row, sv))
                    .sum::<f64>()
                    + self.intercept
            })
            .collect())
    }

    fn probability_of_first(&self, decision: f64) -> f64 {
        let f_apb = -decision * self.prob_a + self.prob_b;
        let p = if f_apb >= 0.0 {
            (-f_apb).exp() / (1.0 + (-f_apb).exp())
        } else {
            1.0 / (1.0 + f_apb.exp())
        };
        p.clamp(MIN_PROB, 1.0 - MIN_PROB)
    }

    fn labels(&self, decision: &Array1<f64>) -> Array1<i64> {
        decision.mapv(|d| if d > 0.0 { self.classes[1] } else { self.classes[0] })
    }

    fn probabilities(&self, decision: &Array1<f64>) -> Array2<f64> {
        let mut proba = Array2::zeros((decision.len(), 2));
        for (mut row, d) in proba.axis_iter_mut(Axis(0)).zip(decision.iter()) {
            let first = self.probability_of_first(*d);
            row[0] = first;
            row[1] = 1.0 - first;
        }
        proba
    }
}

impl Classifier for SvmClassifier {
    fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Array1<i64>, TransformError> {
        Ok(self.labels(&self.decision_function(x)?))
    }

    fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Array2<f64>, TransformError> {
        Ok(self.probabilities(&self.decision_function(x)?))
    }

    fn n_features_in(&self) -> Option<usize> {
        Some(self.support_vectors.ncols())
    }

    fn predict_with_proba(
        &self,
        x: ArrayView2<'_, f64>,
    ) -> Result<(Array1<i64>, Array2<f64>), TransformError> {
        let decision = self.decision_function(x)?;
        Ok((self.labels(&decision), self.probabilities(&decision)))
    }
}

fn rows_to_array(rows: Vec<Vec<f64>>, field: &str) -> Result<Array2<f64>, String> {
    let n_rows = rows.len();
    let n_cols = rows.first().map(Vec::len).unwrap_or(0);
    if rows.iter().any(|r| r.len() != n_cols) {
        return Err(format!("{} rows have unequal lengths", field));
    }
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((n_rows, n_cols), flat).map_err(|e| format!("{}: {}", field, e))
}
