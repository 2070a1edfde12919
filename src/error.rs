//! Error types for the attack detection pipeline.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Boxed error carried as the cause of a load failure.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Why an artifact could not be loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadFailureKind {
    /// The file does not exist or cannot be opened
    MissingFile,
    /// The file exists but does not deserialize into a usable artifact
    CorruptArtifact,
    /// The ordered feature-name list cannot be read
    SchemaUnreadable,
}

impl fmt::Display for LoadFailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoadFailureKind::MissingFile => "missing file",
            LoadFailureKind::CorruptArtifact => "corrupt artifact",
            LoadFailureKind::SchemaUnreadable => "unreadable feature list",
        };
        f.write_str(s)
    }
}

/// Failure to read one of the four trained resources.
#[derive(Debug, Error)]
#[error("{kind} at {}: {source}", path.display())]
pub struct LoadFailure {
    pub kind: LoadFailureKind,
    pub path: PathBuf,
    #[source]
    pub source: BoxError,
}

impl LoadFailure {
    pub fn new(kind: LoadFailureKind, path: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        Self {
            kind,
            path: path.into(),
            source: source.into(),
        }
    }
}

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Scaler,
    Reducer,
    Classifier,
    Assembly,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStage::Scaler => "scaler",
            PipelineStage::Reducer => "reducer",
            PipelineStage::Classifier => "classifier",
            PipelineStage::Assembly => "assembly",
        };
        f.write_str(s)
    }
}

/// Errors raised by a single fitted artifact.
#[derive(Debug, Error)]
pub enum TransformError {
    /// Input width does not match what the artifact was fitted on
    #[error("expected {expected} columns, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Artifact produced output the pipeline cannot interpret
    #[error("invalid output: {0}")]
    InvalidOutput(String),

    /// Backend runtime error
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Errors surfaced to callers of the detector.
#[derive(Debug, Error)]
pub enum DetectorError {
    /// Trained artifacts could not be loaded; fatal for the session
    #[error("failed to load artifacts: {0}")]
    Load(#[from] LoadFailure),

    /// Required feature columns absent from the upload
    #[error("missing columns in uploaded file: {}", .0.join(", "))]
    MissingColumns(Vec<String>),

    /// Required columns that appear more than once after header trimming
    #[error("columns appear more than once in uploaded file: {}", .0.join(", "))]
    AmbiguousColumns(Vec<String>),

    /// Required columns with no values at all, so no mean can be imputed
    #[error("columns contain no values to impute from: {}", .0.join(", "))]
    DegenerateColumns(Vec<String>),

    /// A required cell is not a finite number
    #[error("invalid value {value:?} in column {column:?} at row {row}")]
    InvalidValue {
        column: String,
        row: usize,
        value: String,
    },

    /// The upload contains no data rows
    #[error("uploaded table contains no rows")]
    EmptyInput,

    /// Prepared features and fitted artifacts disagree
    #[error("{stage} stage failed: {source}")]
    Pipeline {
        stage: PipelineStage,
        #[source]
        source: TransformError,
    },

    /// Upload has an extension the reader does not handle
    #[error("unsupported file format {0:?}; expected csv, xlsx or xls")]
    UnsupportedFormat(String),

    /// Upload could not be read or parsed
    #[error("failed to read {}: {source}", path.display())]
    Input {
        path: PathBuf,
        #[source]
        source: BoxError,
    },
}

impl DetectorError {
    pub fn pipeline(stage: PipelineStage, source: TransformError) -> Self {
        DetectorError::Pipeline { stage, source }
    }

    /// Whether the caller can recover by fixing the uploaded file.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, DetectorError::Load(_))
    }
}

/// Result alias used across the library.
pub type Result<T, E = DetectorError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message_lists_names() {
        let err = DetectorError::MissingColumns(vec!["Flow Duration".into(), "Fwd IAT Min".into()]);
        assert_eq!(
            err.to_string(),
            "missing columns in uploaded file: Flow Duration, Fwd IAT Min"
        );
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_load_failure_is_fatal() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: DetectorError =
            LoadFailure::new(LoadFailureKind::MissingFile, "models/scaler.json", io).into();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("missing file at models/scaler.json"));
    }

    #[test]
    fn test_pipeline_error_names_stage() {
        let err = DetectorError::pipeline(
            PipelineStage::Reducer,
            TransformError::ShapeMismatch {
                expected: 10,
                actual: 8,
            },
        );
        assert_eq!(err.to_string(), "reducer stage failed: expected 10 columns, got 8");
    }
}
