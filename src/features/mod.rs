//! Feature extraction
//!
//! Rating replay, rolling snapshots and assembly of model-ready inputs.

pub mod assembler;
pub mod boxscore;
pub mod elo;
pub mod rolling;
pub mod sport_metrics;

pub use assembler::{
    feature_names, to_array, AssembledFeatures, FeatureAssembler, FeatureMap, FeatureSource,
};
pub use boxscore::BoxscoreStats;
pub use elo::{EloConfig, RatingEngine, RatingReplay};
pub use rolling::RollingFeatureStore;
