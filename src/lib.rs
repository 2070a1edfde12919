//! Network Attack Detector Library
//!
//! Classifies network-traffic records as normal or attack by running
//! uploaded tables through a pre-trained pipeline: feature standardization,
//! dimensionality reduction and a binary classifier.

pub mod assembler;
pub mod config;
pub mod detector;
pub mod error;
pub mod feature_preparer;
pub mod input;
pub mod models;
pub mod report;
pub mod schema;
pub mod types;

pub use config::AppConfig;
pub use detector::Detector;
pub use error::{DetectorError, LoadFailure, LoadFailureKind};
pub use feature_preparer::{FeatureMatrix, FeaturePreparer};
pub use models::{load_artifacts, TrainedArtifacts};
pub use report::DetectionSummary;
pub use schema::FeatureSchema;
pub use types::{Cell, InputTable, PredictionResult, Status};
