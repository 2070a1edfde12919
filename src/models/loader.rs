//! Trained artifact loader and process-wide artifact cache

use crate::error::{BoxError, LoadFailure, LoadFailureKind, PipelineStage};
use crate::models::artifacts::{Classifier, TrainedArtifacts, Transformer};
use crate::models::native::{PcaProjection, StandardScaler, SvmClassifier};
use crate::schema::FeatureSchema;
use once_cell::sync::OnceCell;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Where the four trained resources live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub features: PathBuf,
    pub scaler: PathBuf,
    pub reducer: PathBuf,
    pub classifier: PathBuf,
}

impl ArtifactPaths {
    fn for_stage(&self, stage: PipelineStage) -> &Path {
        match stage {
            PipelineStage::Scaler => &self.scaler,
            PipelineStage::Reducer => &self.reducer,
            PipelineStage::Classifier | PipelineStage::Assembly => &self.classifier,
        }
    }
}

/// Serialization an artifact file uses, chosen by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFormat {
    /// Exported fit parameters evaluated natively
    Json,
    /// ONNX graph evaluated by ONNX Runtime
    Onnx,
}

impl ArtifactFormat {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(ArtifactFormat::Json),
            "onnx" => Some(ArtifactFormat::Onnx),
            _ => None,
        }
    }
}

/// Loader for the feature list and the three fitted artifacts
pub struct ArtifactLoader {
    paths: ArtifactPaths,
    /// Number of threads for ONNX inference
    onnx_threads: usize,
}

impl ArtifactLoader {
    pub fn new(paths: ArtifactPaths) -> Self {
        Self::with_threads(paths, 1)
    }

    pub fn with_threads(paths: ArtifactPaths, onnx_threads: usize) -> Self {
        Self {
            paths,
            onnx_threads: onnx_threads.max(1),
        }
    }

    pub fn paths(&self) -> &ArtifactPaths {
        &self.paths
    }

    /// Read every resource from storage. Uncached; see [`load_artifacts`].
    pub fn load(&self) -> Result<TrainedArtifacts, LoadFailure> {
        let schema = self.load_schema()?;
        let scaler = self.load_transformer(&self.paths.scaler, "scaler", |bytes| {
            StandardScaler::from_params(parse_json(bytes)?).map_err(BoxError::from)
        })?;
        let reducer = self.load_transformer(&self.paths.reducer, "reducer", |bytes| {
            PcaProjection::from_params(parse_json(bytes)?).map_err(BoxError::from)
        })?;
        let classifier = self.load_classifier()?;

        let artifacts = TrainedArtifacts::new(schema, scaler, reducer, classifier);
        if let Err((stage, message)) = artifacts.check_consistency() {
            return Err(LoadFailure::new(
                LoadFailureKind::CorruptArtifact,
                self.paths.for_stage(stage),
                message,
            ));
        }

        info!(
            features = artifacts.schema.len(),
            components = ?artifacts.reducer.n_features_out(),
            "Trained artifacts loaded"
        );
        Ok(artifacts)
    }

    fn load_schema(&self) -> Result<FeatureSchema, LoadFailure> {
        let path = &self.paths.features;
        let bytes = read_file(path)?;
        let names: Vec<String> = serde_json::from_slice(&bytes)
            .map_err(|e| LoadFailure::new(LoadFailureKind::SchemaUnreadable, path, e))?;
        let schema = FeatureSchema::new(names)
            .map_err(|e| LoadFailure::new(LoadFailureKind::SchemaUnreadable, path, e))?;
        info!(path = %path.display(), features = schema.len(), "Feature list loaded");
        Ok(schema)
    }

    fn load_transformer<T, F>(
        &self,
        path: &Path,
        name: &str,
        from_json: F,
    ) -> Result<Box<dyn Transformer>, LoadFailure>
    where
        T: Transformer + 'static,
        F: FnOnce(&[u8]) -> Result<T, BoxError>,
    {
        match self.format(path)? {
            ArtifactFormat::Json => {
                let bytes = read_file(path)?;
                let artifact = from_json(bytes.as_slice()).map_err(|e| corrupt(path, e))?;
                info!(model = %name, path = %path.display(), "Artifact loaded");
                Ok(Box::new(artifact))
            }
            ArtifactFormat::Onnx => self.load_onnx_transformer(path, name),
        }
    }

    fn load_classifier(&self) -> Result<Box<dyn Classifier>, LoadFailure> {
        let path = &self.paths.classifier;
        match self.format(path)? {
            ArtifactFormat::Json => {
                let bytes = read_file(path)?;
                let svc = parse_json(&bytes)
                    .and_then(|params| SvmClassifier::from_params(params).map_err(BoxError::from))
                    .map_err(|e| corrupt(path, e))?;
                info!(model = "classifier", path = %path.display(), "Artifact loaded");
                Ok(Box::new(svc))
            }
            ArtifactFormat::Onnx => self.load_onnx_classifier(path),
        }
    }

    fn format(&self, path: &Path) -> Result<ArtifactFormat, LoadFailure> {
        if !path.exists() {
            return Err(LoadFailure::new(
                LoadFailureKind::MissingFile,
                path,
                "file not found",
            ));
        }
        ArtifactFormat::from_path(path)
            .ok_or_else(|| corrupt(path, "unrecognized artifact extension (expected .json or .onnx)"))
    }

    #[cfg(feature = "onnx")]
    fn load_onnx_transformer(
        &self,
        path: &Path,
        name: &str,
    ) -> Result<Box<dyn Transformer>, LoadFailure> {
        crate::models::onnx::OnnxTransformer::load(path, name, self.onnx_threads)
            .map(|t| Box::new(t) as Box<dyn Transformer>)
            .map_err(|e| corrupt(path, BoxError::from(e)))
    }

    #[cfg(not(feature = "onnx"))]
    fn load_onnx_transformer(
        &self,
        path: &Path,
        _name: &str,
    ) -> Result<Box<dyn Transformer>, LoadFailure> {
        Err(corrupt(path, "built without ONNX support"))
    }

    #[cfg(feature = "onnx")]
    fn load_onnx_classifier(&self, path: &Path) -> Result<Box<dyn Classifier>, LoadFailure> {
        crate::models::onnx::OnnxClassifier::load(path, "classifier", self.onnx_threads)
            .map(|c| Box::new(c) as Box<dyn Classifier>)
            .map_err(|e| corrupt(path, BoxError::from(e)))
    }

    #[cfg(not(feature = "onnx"))]
    fn load_onnx_classifier(&self, path: &Path) -> Result<Box<dyn Classifier>, LoadFailure> {
        Err(corrupt(path, "built without ONNX support"))
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, LoadFailure> {
    std::fs::read(path).map_err(|e| {
        let kind = if e.kind() == std::io::ErrorKind::NotFound {
            LoadFailureKind::MissingFile
        } else {
            LoadFailureKind::CorruptArtifact
        };
        LoadFailure::new(kind, path, e)
    })
}

fn parse_json<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, BoxError> {
    serde_json::from_slice(bytes).map_err(BoxError::from)
}

fn corrupt(path: &Path, source: impl Into<BoxError>) -> LoadFailure {
    LoadFailure::new(LoadFailureKind::CorruptArtifact, path, source)
}

/// Process-wide artifact bundle.
///
/// Initialization rule: loaded on first successful call to
/// [`load_artifacts`], never reloaded, never mutated. A failed load leaves
/// the cell empty so a later call reads storage again.
static ARTIFACTS: OnceCell<Arc<TrainedArtifacts>> = OnceCell::new();

/// Load the artifacts once per process and share them afterwards.
///
/// `paths` only matters for the call that performs the load; later calls
/// return the cached bundle without touching storage.
pub fn load_artifacts(
    paths: &ArtifactPaths,
    onnx_threads: usize,
) -> Result<Arc<TrainedArtifacts>, LoadFailure> {
    ARTIFACTS
        .get_or_try_init(|| {
            ArtifactLoader::with_threads(paths.clone(), onnx_threads)
                .load()
                .map(Arc::new)
        })
        .cloned()
}

/// The cached bundle, if a load has succeeded in this process.
pub fn cached_artifacts() -> Option<Arc<TrainedArtifacts>> {
    ARTIFACTS.get().cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_bundle(dir: &TempDir) -> ArtifactPaths {
        let paths = ArtifactPaths {
            features: dir.path().join("features_list.json"),
            scaler: dir.path().join("scaler.json"),
            reducer: dir.path().join("ipca_model.json"),
            classifier: dir.path().join("svm_rbf_model.json"),
        };
        fs::write(&paths.features, r#"["Flow Duration", "Total Fwd Packets"]"#).unwrap();
        fs::write(&paths.scaler, r#"{"mean": [10.0, 2.0], "scale": [5.0, 1.0]}"#).unwrap();
        fs::write(
            &paths.reducer,
            r#"{"mean": [0.0, 0.0], "components": [[0.6, 0.8]]}"#,
        )
        .unwrap();
        fs::write(
            &paths.classifier,
            r#"{
                "classes": [0, 1],
                "kernel": "rbf",
                "gamma": 0.5,
                "support_vectors": [[1.0], [-1.0]],
                "dual_coef": [1.0, -1.0],
                "intercept": 0.0,
                "prob_a": -1.5,
                "prob_b": 0.1
            }"#,
        )
        .unwrap();
        paths
    }

    #[test]
    fn test_load_json_bundle() {
        let dir = TempDir::new().unwrap();
        let artifacts = ArtifactLoader::new(write_bundle(&dir)).load().unwrap();
        assert_eq!(artifacts.schema.names()[0], "Flow Duration");
        assert_eq!(artifacts.scaler.n_features_in(), Some(2));
        assert_eq!(artifacts.reducer.n_features_out(), Some(1));
        assert_eq!(artifacts.classifier.n_features_in(), Some(1));
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let paths = write_bundle(&dir);
        fs::remove_file(&paths.reducer).unwrap();

        let err = ArtifactLoader::new(paths.clone()).load().unwrap_err();
        assert_eq!(err.kind, LoadFailureKind::MissingFile);
        assert_eq!(err.path, paths.reducer);
    }

    #[test]
    fn test_corrupt_artifact() {
        let dir = TempDir::new().unwrap();
        let paths = write_bundle(&dir);
        fs::write(&paths.scaler, "not json").unwrap();

        let err = ArtifactLoader::new(paths.clone()).load().unwrap_err();
        assert_eq!(err.kind, LoadFailureKind::CorruptArtifact);
        assert_eq!(err.path, paths.scaler);
    }

    #[test]
    fn test_unreadable_schema() {
        let dir = TempDir::new().unwrap();
        let paths = write_bundle(&dir);
        fs::write(&paths.features, r#"{"features": 3}"#).unwrap();
        let err = ArtifactLoader::new(paths.clone()).load().unwrap_err();
        assert_eq!(err.kind, LoadFailureKind::SchemaUnreadable);

        fs::write(&paths.features, "[]").unwrap();
        let err = ArtifactLoader::new(paths).load().unwrap_err();
        assert_eq!(err.kind, LoadFailureKind::SchemaUnreadable);
    }

    #[test]
    fn test_width_drift_is_reported_against_artifact() {
        let dir = TempDir::new().unwrap();
        let paths = write_bundle(&dir);
        fs::write(
            &paths.features,
            r#"["Flow Duration", "Total Fwd Packets", "Fwd IAT Min"]"#,
        )
        .unwrap();

        let err = ArtifactLoader::new(paths.clone()).load().unwrap_err();
        assert_eq!(err.kind, LoadFailureKind::CorruptArtifact);
        assert_eq!(err.path, paths.scaler);
    }

    #[test]
    fn test_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let paths = write_bundle(&dir);
        let joblib = dir.path().join("scaler.joblib");
        fs::write(&joblib, b"\x80\x04").unwrap();

        let err = ArtifactLoader::new(ArtifactPaths {
            scaler: joblib.clone(),
            ..paths
        })
        .load()
        .unwrap_err();
        assert_eq!(err.kind, LoadFailureKind::CorruptArtifact);
        assert_eq!(err.path, joblib);
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ArtifactFormat::from_path(Path::new("models/svm.ONNX")),
            Some(ArtifactFormat::Onnx)
        );
        assert_eq!(
            ArtifactFormat::from_path(Path::new("models/scaler.json")),
            Some(ArtifactFormat::Json)
        );
        assert_eq!(ArtifactFormat::from_path(Path::new("models/scaler")), None);
    }
}
