//! Per-upload detection: validate, prepare, infer, assemble

use crate::assembler::assemble;
use crate::error::Result;
use crate::feature_preparer::FeaturePreparer;
use crate::models::artifacts::TrainedArtifacts;
use crate::models::inference::InferencePipeline;
use crate::schema;
use crate::types::{InputTable, PredictionResult};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Classifies uploaded tables against a shared artifact bundle.
#[derive(Clone)]
pub struct Detector {
    artifacts: Arc<TrainedArtifacts>,
}

impl Detector {
    pub fn new(artifacts: Arc<TrainedArtifacts>) -> Self {
        Self { artifacts }
    }

    pub fn artifacts(&self) -> &TrainedArtifacts {
        &self.artifacts
    }

    /// Classify every row of `table`.
    ///
    /// The schema is checked before any numeric work. Either every row gets
    /// a result or an error is returned.
    pub fn detect(&self, table: &InputTable) -> Result<Vec<PredictionResult>> {
        let start = Instant::now();
        let schema = &self.artifacts.schema;

        schema::validate(table, schema)?;

        let matrix = FeaturePreparer::new(schema).prepare(table)?;
        debug!(
            rows = matrix.rows(),
            features = matrix.cols(),
            imputed_columns = matrix.imputations().len(),
            "Features prepared"
        );

        let output = InferencePipeline::new(&self.artifacts).infer(matrix.values().view())?;
        let results = assemble(
            &table.row_indices(),
            &output.labels.to_vec(),
            &output.attack_probabilities.to_vec(),
        )?;

        let attacks = results.iter().filter(|r| r.is_attack()).count();
        info!(
            rows = results.len(),
            attacks,
            processing_time_us = start.elapsed().as_micros() as u64,
            "Upload classified"
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DetectorError, TransformError};
    use crate::models::artifacts::Classifier;
    use crate::models::native::{PcaProjection, StandardScaler};
    use crate::schema::FeatureSchema;
    use crate::types::Status;
    use ndarray::{Array1, Array2, ArrayView2};

    /// Attack when the first reduced feature exceeds 10.
    struct Threshold;

    impl Classifier for Threshold {
        fn predict(&self, x: ArrayView2<'_, f64>) -> std::result::Result<Array1<i64>, TransformError> {
            Ok(x.column(0).mapv(|v| i64::from(v > 10.0)))
        }

        fn predict_proba(&self, x: ArrayView2<'_, f64>) -> std::result::Result<Array2<f64>, TransformError> {
            let mut proba = Array2::zeros((x.nrows(), 2));
            for (i, v) in x.column(0).iter().enumerate() {
                let p = if *v > 10.0 { 0.9 } else { 0.2 };
                proba[[i, 0]] = 1.0 - p;
                proba[[i, 1]] = p;
            }
            Ok(proba)
        }

        fn n_features_in(&self) -> Option<usize> {
            Some(2)
        }
    }

    fn detector() -> Detector {
        Detector::new(Arc::new(TrainedArtifacts::new(
            FeatureSchema::new(vec!["Flow Duration".into(), "Fwd Packets".into()]).unwrap(),
            Box::new(StandardScaler::identity(2)),
            Box::new(PcaProjection::identity(2)),
            Box::new(Threshold),
        )))
    }

    #[test]
    fn test_detect_end_to_end() {
        let table = InputTable::from_columns(vec![
            ("Label", vec![None, None, None]),
            ("Fwd Packets", vec![Some(1.0), Some(2.0), None]),
            (" Flow Duration", vec![Some(50.0), Some(3.0), None]),
        ]);
        let results = detector().detect(&table).unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].status, Status::Attack);
        assert_eq!(results[0].attack_probability, 0.9);
        assert_eq!(results[1].status, Status::Normal);
        // Row 2 is imputed with the mean duration 26.5
        assert_eq!(results[2].status, Status::Attack);
        assert_eq!(
            results.iter().map(|r| r.index).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[test]
    fn test_detect_stops_on_missing_columns() {
        let table = InputTable::from_columns(vec![("Flow Duration", vec![Some(1.0)])]);
        match detector().detect(&table) {
            Err(DetectorError::MissingColumns(cols)) => assert_eq!(cols, vec!["Fwd Packets"]),
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
