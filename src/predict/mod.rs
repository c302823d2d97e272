//! Prediction and inference
//!
//! Load exported models, turn assembled features into scores, period
//! splits and explanations.

pub mod explain;
pub mod inference;
pub mod model;
pub mod periods;

pub use inference::{format_prediction, BatchPrediction, PredictionEngine};
pub use model::{ModelArtifact, ModelRegistry, ModelRole, ModelSet};
