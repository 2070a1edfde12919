//! Configuration management for the attack detector

use crate::models::loader::ArtifactPaths;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default configuration file location
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub artifacts: ArtifactsConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Locations of the trained artifacts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactsConfig {
    /// JSON array of feature names in training order
    pub features_path: PathBuf,
    /// Fitted scaler (.json or .onnx)
    pub scaler_path: PathBuf,
    /// Fitted dimensionality reducer (.json or .onnx)
    pub reducer_path: PathBuf,
    /// Fitted classifier (.json or .onnx)
    pub classifier_path: PathBuf,
    /// Number of threads per ONNX session (default: 1)
    #[serde(default = "default_onnx_threads")]
    pub onnx_threads: usize,
}

fn default_onnx_threads() -> usize {
    1
}

impl ArtifactsConfig {
    pub fn paths(&self) -> ArtifactPaths {
        ArtifactPaths {
            features: self.features_path.clone(),
            scaler: self.scaler_path.clone(),
            reducer: self.reducer_path.clone(),
            classifier: self.classifier_path.clone(),
        }
    }
}

/// Result presentation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Only export rows classified as attacks
    #[serde(default)]
    pub attacks_only: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific path.
    ///
    /// Values missing from the file fall back to [`AppConfig::default`];
    /// `ATTACK_DETECTOR__SECTION__KEY` environment variables override both.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(
                Config::try_from(&AppConfig::default())
                    .context("Failed to serialize default configuration")?,
            )
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(Environment::with_prefix("ATTACK_DETECTOR").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            artifacts: ArtifactsConfig {
                features_path: PathBuf::from("results/features_list.json"),
                scaler_path: PathBuf::from("models/scaler.json"),
                reducer_path: PathBuf::from("models/ipca_model.json"),
                classifier_path: PathBuf::from("models/svm_rbf_model.json"),
                onnx_threads: default_onnx_threads(),
            },
            output: OutputConfig {
                attacks_only: false,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(
            config.artifacts.features_path,
            PathBuf::from("results/features_list.json")
        );
        assert_eq!(config.artifacts.onnx_threads, 1);
        assert!(!config.output.attacks_only);
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(
            file,
            "[artifacts]\nclassifier_path = \"models/svm.onnx\"\n\n[output]\nattacks_only = true"
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.artifacts.classifier_path, PathBuf::from("models/svm.onnx"));
        assert_eq!(config.artifacts.scaler_path, PathBuf::from("models/scaler.json"));
        assert!(config.output.attacks_only);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AppConfig::load_from_path("does/not/exist.toml").unwrap();
        assert_eq!(config.logging.format, "pretty");
        assert_eq!(config.artifacts.paths().reducer, PathBuf::from("models/ipca_model.json"));
    }
}
