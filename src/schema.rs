//! Trained feature schema and upload validation.

use crate::error::{DetectorError, Result};
use crate::types::InputTable;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Ordered feature names the artifacts were fitted on.
///
/// The order is part of the contract: the scaler, reducer and classifier
/// address features positionally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureSchema {
    names: Vec<String>,
}

impl FeatureSchema {
    /// Build a schema, rejecting empty lists and duplicate names.
    pub fn new(names: Vec<String>) -> std::result::Result<Self, String> {
        if names.is_empty() {
            return Err("feature list is empty".to_string());
        }
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(format!("duplicate feature name {:?}", name));
            }
        }
        Ok(Self { names })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Required features absent from `table`, in schema order.
    pub fn missing_columns(&self, table: &InputTable) -> Vec<String> {
        let present: HashSet<&str> = table.columns().iter().map(|c| c.trim()).collect();
        self.names
            .iter()
            .filter(|name| !present.contains(name.as_str()))
            .cloned()
            .collect()
    }

    /// Required features matched by more than one header once trimmed.
    pub fn ambiguous_columns(&self, table: &InputTable) -> Vec<String> {
        self.names
            .iter()
            .filter(|name| {
                table
                    .columns()
                    .iter()
                    .filter(|c| c.trim() == name.as_str())
                    .count()
                    > 1
            })
            .cloned()
            .collect()
    }
}

impl TryFrom<Vec<String>> for FeatureSchema {
    type Error = String;

    fn try_from(names: Vec<String>) -> std::result::Result<Self, Self::Error> {
        Self::new(names)
    }
}

impl From<FeatureSchema> for Vec<String> {
    fn from(schema: FeatureSchema) -> Self {
        schema.names
    }
}

/// Check that every required feature column is present in the upload,
/// exactly once.
pub fn validate(table: &InputTable, schema: &FeatureSchema) -> Result<()> {
    let missing = schema.missing_columns(table);
    if !missing.is_empty() {
        return Err(DetectorError::MissingColumns(missing));
    }
    let ambiguous = schema.ambiguous_columns(table);
    if !ambiguous.is_empty() {
        return Err(DetectorError::AmbiguousColumns(ambiguous));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> FeatureSchema {
        FeatureSchema::new(vec![
            "Destination Port".into(),
            "Flow Duration".into(),
            "Total Fwd Packets".into(),
        ])
        .unwrap()
    }

    #[test]
    fn test_schema_rejects_empty_and_duplicates() {
        assert!(FeatureSchema::new(vec![]).is_err());
        assert!(FeatureSchema::new(vec!["a".into(), "a".into()]).is_err());
        assert_eq!(schema().len(), 3);
    }

    #[test]
    fn test_validate_accepts_extra_and_padded_columns() {
        let table = InputTable::from_columns(vec![
            (" Destination Port", vec![Some(80.0)]),
            ("Flow Duration ", vec![Some(1.0)]),
            ("  Total Fwd Packets  ", vec![Some(2.0)]),
            ("Label", vec![None]),
        ]);
        assert!(validate(&table, &schema()).is_ok());
    }

    #[test]
    fn test_validate_reports_set_difference_in_schema_order() {
        let table = InputTable::from_columns(vec![
            ("Unrelated", vec![Some(1.0)]),
            ("Flow Duration", vec![Some(1.0)]),
        ]);
        match validate(&table, &schema()) {
            Err(DetectorError::MissingColumns(missing)) => {
                assert_eq!(missing, vec!["Destination Port", "Total Fwd Packets"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_headers_equal_after_trimming() {
        let table = InputTable::from_columns(vec![
            ("Destination Port", vec![Some(80.0)]),
            ("Flow Duration", vec![Some(1.0)]),
            ("Flow Duration ", vec![Some(2.0)]),
            ("Total Fwd Packets", vec![Some(2.0)]),
            ("Label", vec![None]),
            ("Label ", vec![None]),
        ]);
        match validate(&table, &schema()) {
            Err(DetectorError::AmbiguousColumns(names)) => {
                assert_eq!(names, vec!["Flow Duration"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_schema_deserializes_from_json_array() {
        let schema: FeatureSchema = serde_json::from_str(r#"["a", "b"]"#).unwrap();
        assert_eq!(schema.names(), &["a".to_string(), "b".to_string()]);
        assert!(serde_json::from_str::<FeatureSchema>(r#"["a", "a"]"#).is_err());
    }
}
