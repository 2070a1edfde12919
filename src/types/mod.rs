//! Core data types

pub mod prediction;
pub mod table;

pub use prediction::{PredictionResult, Status};
pub use table::{Cell, InputTable};
