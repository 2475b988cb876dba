//! Reward predictor for ranking propositions.
//!
//! This crate loads a trained reward model and scores feature matrices
//! built by the pipeline. It handles:
//! - Reading and validating tree ensemble artifacts
//! - Checking the model's feature contract against the active schema
//! - Selecting matrix columns by name and scoring rows in parallel
//!
//! ```ignore
//! use predictor::RewardPredictor;
//!
//! let schema = FeatureSchema::for_version(FeatureSchemaVersion::V3);
//! let predictor = RewardPredictor::load(Path::new("models/reward.json"), &schema)?;
//! let scores = predictor.predict(&matrix)?;
//! ```

pub mod error;
pub mod model;
pub mod forest;
pub mod adapter;

pub use adapter::RewardPredictor;
pub use error::{PredictorError, Result};
pub use forest::{ModelArtifact, Node, RandomForest, Tree};
pub use model::RewardModel;
