//! The model seam.
//!
//! Anything that maps one ordered numeric row to a reward score can sit
//! behind the predictor. The bundled implementation is the tree ensemble in
//! [`crate::forest`]; tests plug in small hand-written models.

use crate::error::Result;
use pipeline::FeatureSchemaVersion;

/// A trained reward model.
///
/// `Send + Sync` lets one loaded model be shared by every scoring worker.
pub trait RewardModel: Send + Sync {
    /// Identifier of the trained artifact, also keys its category encoding
    fn model_version(&self) -> &str;

    /// Ordered column names the model was trained on
    fn feature_names(&self) -> &[String];

    /// Schema generation the artifact declares, if any
    fn schema_version(&self) -> Option<FeatureSchemaVersion> {
        None
    }

    /// Reward score of one row laid out like [`RewardModel::feature_names`]
    fn predict_row(&self, row: &[f64]) -> Result<f64>;
}
