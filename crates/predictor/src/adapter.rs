//! Reward predictor adapter.
//!
//! Wraps a [`RewardModel`] and checks, once at construction, that its
//! feature contract is the active schema. At prediction time the matrix
//! columns are selected by name, so column order in the matrix does not
//! matter and extra columns are ignored.

use crate::error::{PredictorError, Result};
use crate::forest::RandomForest;
use crate::model::RewardModel;
use pipeline::{FeatureMatrix, FeatureSchema};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, instrument};

/// A loaded model bound to one feature schema.
pub struct RewardPredictor {
    model: Box<dyn RewardModel>,
    schema: FeatureSchema,
}

impl RewardPredictor {
    /// Load a tree ensemble artifact and bind it to `schema`
    pub fn load(path: &Path, schema: &FeatureSchema) -> Result<Self> {
        let forest = RandomForest::load(path)?;
        Self::from_model(forest, schema)
    }

    /// Bind an already constructed model to `schema`.
    ///
    /// Fails with [`PredictorError::SchemaMismatch`] when the model's
    /// feature names (or declared schema version) differ from the schema.
    pub fn from_model(model: impl RewardModel + 'static, schema: &FeatureSchema) -> Result<Self> {
        let version_ok = model.schema_version().is_none_or(|v| v == schema.version());
        if !version_ok || !schema.matches_names(model.feature_names()) {
            return Err(PredictorError::SchemaMismatch {
                schema: schema.version().to_string(),
                expected: schema.column_names().into_iter().map(str::to_string).collect(),
                found: model.feature_names().to_vec(),
            });
        }

        debug!(
            "Bound model {} to schema {}",
            model.model_version(),
            schema.version()
        );
        Ok(Self {
            model: Box::new(model),
            schema: schema.clone(),
        })
    }

    pub fn model_version(&self) -> &str {
        self.model.model_version()
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn feature_names(&self) -> &[String] {
        self.model.feature_names()
    }

    /// One score per matrix row, in row order
    #[instrument(skip(self, matrix), fields(rows = matrix.n_rows()))]
    pub fn predict(&self, matrix: &FeatureMatrix) -> Result<Vec<f64>> {
        let layout = self.column_layout(matrix)?;

        matrix
            .rows()
            .par_iter()
            .map(|row| {
                let selected: Vec<f64> = layout.iter().map(|&idx| row[idx]).collect();
                self.model.predict_row(&selected)
            })
            .collect()
    }

    /// Matrix column index of every model feature, in model order
    fn column_layout(&self, matrix: &FeatureMatrix) -> Result<Vec<usize>> {
        let mut seen = HashSet::new();
        for column in matrix.columns() {
            if !seen.insert(column.as_str()) {
                return Err(PredictorError::DuplicateColumn(column.clone()));
            }
        }

        let layout = self
            .model
            .feature_names()
            .iter()
            .map(|name| {
                matrix
                    .column_index(name)
                    .ok_or_else(|| PredictorError::MissingFeature(name.clone()))
            })
            .collect::<Result<Vec<usize>>>()?;

        let extra = matrix.n_columns() - layout.len();
        if extra > 0 {
            debug!("Ignoring {} matrix columns unknown to model {}", extra, self.model_version());
        }
        Ok(layout)
    }
}

impl std::fmt::Debug for RewardPredictor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RewardPredictor")
            .field("model_version", &self.model.model_version())
            .field("schema", &self.schema.version())
            .finish()
    }
}
