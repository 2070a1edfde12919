//! Feature preparation for model inference.
//!
//! Selects the trained feature columns from an uploaded table, in schema
//! order, and fills missing values with the column mean computed over the
//! current upload. Imputed values therefore depend on the batch they were
//! uploaded with and are not comparable across uploads.

use crate::error::{DetectorError, Result};
use crate::schema::FeatureSchema;
use crate::types::{Cell, InputTable};
use ndarray::Array2;
use tracing::debug;

/// Mean fill applied to one feature column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnImputation {
    pub column: String,
    /// Number of cells that were missing
    pub filled: usize,
    /// Value written into each missing cell
    pub mean: f64,
}

/// Dense rows × features matrix in schema order, free of missing values.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    values: Array2<f64>,
    imputations: Vec<ColumnImputation>,
}

impl FeatureMatrix {
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn into_values(self) -> Array2<f64> {
        self.values
    }

    pub fn rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn cols(&self) -> usize {
        self.values.ncols()
    }

    /// Columns that needed imputation, in schema order.
    pub fn imputations(&self) -> &[ColumnImputation] {
        &self.imputations
    }
}

/// Transforms uploaded tables into model input matrices.
pub struct FeaturePreparer<'a> {
    schema: &'a FeatureSchema,
}

impl<'a> FeaturePreparer<'a> {
    pub fn new(schema: &'a FeatureSchema) -> Self {
        Self { schema }
    }

    /// Number of features produced per row.
    pub fn feature_count(&self) -> usize {
        self.schema.len()
    }

    /// Build the feature matrix for `table`.
    pub fn prepare(&self, table: &InputTable) -> Result<FeatureMatrix> {
        let indices = self.column_indices(table)?;
        let n_rows = table.row_count();
        if n_rows == 0 {
            return Err(DetectorError::EmptyInput);
        }

        let mut values = Array2::<f64>::zeros((n_rows, indices.len()));
        let mut imputations = Vec::new();
        let mut degenerate = Vec::new();

        for (j, (name, &src)) in self.schema.names().iter().zip(&indices).enumerate() {
            let mut missing_rows = Vec::new();
            let mut sum = 0.0;
            let mut count = 0usize;

            for (i, cell) in table.column(src).enumerate() {
                match cell {
                    Cell::Number(v) if v.is_finite() => {
                        values[[i, j]] = *v;
                        sum += v;
                        count += 1;
                    }
                    Cell::Missing => missing_rows.push(i),
                    other => {
                        return Err(DetectorError::InvalidValue {
                            column: name.clone(),
                            row: i,
                            value: other.to_string(),
                        })
                    }
                }
            }

            if missing_rows.is_empty() {
                continue;
            }
            if count == 0 {
                degenerate.push(name.clone());
                continue;
            }

            let mean = sum / count as f64;
            for &i in &missing_rows {
                values[[i, j]] = mean;
            }
            debug!(column = %name, filled = missing_rows.len(), mean, "Imputed missing values");
            imputations.push(ColumnImputation {
                column: name.clone(),
                filled: missing_rows.len(),
                mean,
            });
        }

        if !degenerate.is_empty() {
            return Err(DetectorError::DegenerateColumns(degenerate));
        }

        Ok(FeatureMatrix {
            values,
            imputations,
        })
    }

    fn column_indices(&self, table: &InputTable) -> Result<Vec<usize>> {
        let mut indices = Vec::with_capacity(self.schema.len());
        let mut missing = Vec::new();
        for name in self.schema.names() {
            match table.column_index(name) {
                Some(i) => indices.push(i),
                None => missing.push(name.clone()),
            }
        }
        if missing.is_empty() {
            Ok(indices)
        } else {
            Err(DetectorError::MissingColumns(missing))
        }
    }
}

/// Convenience wrapper over [`FeaturePreparer::prepare`].
pub fn prepare(table: &InputTable, schema: &FeatureSchema) -> Result<FeatureMatrix> {
    FeaturePreparer::new(schema).prepare(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn schema(names: &[&str]) -> FeatureSchema {
        FeatureSchema::new(names.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    #[test]
    fn test_prepare_reorders_to_schema_and_copies_values() {
        let table = InputTable::from_columns(vec![
            ("extra", vec![Some(9.0), Some(9.0)]),
            ("b", vec![Some(0.1), Some(-2.5)]),
            ("a", vec![Some(1e9), Some(3.0)]),
        ]);
        let matrix = prepare(&table, &schema(&["a", "b"])).unwrap();
        assert_eq!(matrix.values(), &array![[1e9, 0.1], [3.0, -2.5]]);
        assert!(matrix.imputations().is_empty());
    }

    #[test]
    fn test_prepare_fills_with_column_mean() {
        let table = InputTable::from_columns(vec![
            ("a", vec![Some(1.0), Some(2.0), None, None, Some(8.0)]),
            ("b", vec![Some(5.0); 5]),
        ]);
        let matrix = prepare(&table, &schema(&["a", "b"])).unwrap();
        let expected = 11.0 / 3.0;

        assert_eq!(matrix.rows(), 5);
        assert_eq!(matrix.cols(), 2);
        assert!((matrix.values()[[2, 0]] - expected).abs() < 1e-12);
        assert!((matrix.values()[[3, 0]] - expected).abs() < 1e-12);
        assert_eq!(matrix.values()[[4, 0]], 8.0);
        assert_eq!(
            matrix.imputations(),
            &[ColumnImputation {
                column: "a".to_string(),
                filled: 2,
                mean: expected,
            }]
        );
    }

    #[test]
    fn test_entirely_missing_column_is_degenerate() {
        let table = InputTable::from_columns(vec![
            ("a", vec![None, None]),
            ("b", vec![Some(1.0), None]),
        ]);
        match prepare(&table, &schema(&["a", "b"])) {
            Err(DetectorError::DegenerateColumns(cols)) => assert_eq!(cols, vec!["a"]),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_text_and_infinite_values_are_rejected() {
        let table = InputTable::new(
            vec!["a".into()],
            vec![vec![Cell::Number(1.0)], vec![Cell::Text("tcp".into())]],
        );
        match prepare(&table, &schema(&["a"])) {
            Err(DetectorError::InvalidValue { column, row, value }) => {
                assert_eq!(column, "a");
                assert_eq!(row, 1);
                assert_eq!(value, "tcp");
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let table = InputTable::from_columns(vec![("a", vec![Some(f64::INFINITY)])]);
        assert!(matches!(
            prepare(&table, &schema(&["a"])),
            Err(DetectorError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_empty_table() {
        let table = InputTable::new(vec!["a".into()], vec![]);
        assert!(matches!(
            prepare(&table, &schema(&["a"])),
            Err(DetectorError::EmptyInput)
        ));
    }

    #[test]
    fn test_missing_column() {
        let table = InputTable::from_columns(vec![("a", vec![Some(1.0)])]);
        assert!(matches!(
            prepare(&table, &schema(&["a", "b"])),
            Err(DetectorError::MissingColumns(cols)) if cols == vec!["b".to_string()]
        ));
    }
}
