//! Trained artifacts and inference components

pub mod artifacts;
pub mod inference;
pub mod loader;
pub mod native;
#[cfg(feature = "onnx")]
pub mod onnx;

pub use artifacts::{Classifier, TrainedArtifacts, Transformer};
pub use inference::{InferenceOutput, InferencePipeline};
pub use loader::{load_artifacts, ArtifactLoader, ArtifactPaths};
