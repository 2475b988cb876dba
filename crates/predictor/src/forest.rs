//! Tree ensemble model artifacts.
//!
//! Artifacts are JSON documents:
//!
//! ```json
//! {
//!   "model_version": "2024-11",
//!   "schema_version": "V3",
//!   "feature_names": ["PAGE_SECTION", "..."],
//!   "trees": [
//!     { "nodes": [
//!         {"split": {"feature": 0, "threshold": 1.5, "left": 1, "right": 2}},
//!         {"leaf": {"value": 0.2}},
//!         {"leaf": {"value": 0.9}}
//!     ] }
//!   ]
//! }
//! ```
//!
//! Traversal starts at node 0 and goes left when `x[feature] <= threshold`.
//! The score is the mean leaf value over all trees. Children always have a
//! larger index than their parent, so every walk terminates.

use crate::error::{PredictorError, Result};
use crate::model::RewardModel;
use pipeline::FeatureSchemaVersion;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    fn validate(&self, tree_idx: usize, n_features: usize) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(corrupt(format!("tree {} has no nodes", tree_idx)));
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let Node::Split {
                feature,
                threshold,
                left,
                right,
            } = node
            {
                if *feature >= n_features {
                    return Err(corrupt(format!(
                        "tree {} node {} splits on feature {} of {}",
                        tree_idx, idx, feature, n_features
                    )));
                }
                if threshold.is_nan() {
                    return Err(corrupt(format!("tree {} node {} has a NaN threshold", tree_idx, idx)));
                }
                for child in [*left, *right] {
                    if child <= idx || child >= self.nodes.len() {
                        return Err(corrupt(format!(
                            "tree {} node {} points to invalid child {}",
                            tree_idx, idx, child
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    fn leaf_value(&self, row: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }
}

/// The on-disk artifact layout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model_version: String,
    #[serde(default)]
    pub schema_version: Option<FeatureSchemaVersion>,
    pub feature_names: Vec<String>,
    pub trees: Vec<Tree>,
}

/// A validated tree ensemble.
#[derive(Debug, Clone)]
pub struct RandomForest {
    artifact: ModelArtifact,
}

impl RandomForest {
    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self> {
        if artifact.trees.is_empty() {
            return Err(corrupt("artifact has no trees".to_string()));
        }
        let n_features = artifact.feature_names.len();
        for (idx, tree) in artifact.trees.iter().enumerate() {
            tree.validate(idx, n_features)?;
        }
        Ok(Self { artifact })
    }

    /// Read and validate an artifact file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PredictorError::ModelNotFound(path.display().to_string()));
        }
        let file = File::open(path)?;
        let artifact: ModelArtifact = serde_json::from_reader(BufReader::new(file))
            .map_err(|e| corrupt(format!("{}: {}", path.display(), e)))?;

        let forest = Self::from_artifact(artifact)?;
        info!(
            "Loaded model {} ({} trees, {} features) from {}",
            forest.artifact.model_version,
            forest.artifact.trees.len(),
            forest.artifact.feature_names.len(),
            path.display()
        );
        Ok(forest)
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn n_trees(&self) -> usize {
        self.artifact.trees.len()
    }
}

impl RewardModel for RandomForest {
    fn model_version(&self) -> &str {
        &self.artifact.model_version
    }

    fn feature_names(&self) -> &[String] {
        &self.artifact.feature_names
    }

    fn schema_version(&self) -> Option<FeatureSchemaVersion> {
        self.artifact.schema_version
    }

    fn predict_row(&self, row: &[f64]) -> Result<f64> {
        let expected = self.artifact.feature_names.len();
        if row.len() != expected {
            return Err(PredictorError::RowWidth {
                expected,
                found: row.len(),
            });
        }
        let total: f64 = self.artifact.trees.iter().map(|tree| tree.leaf_value(row)).sum();
        Ok(total / self.artifact.trees.len() as f64)
    }
}

fn corrupt(reason: String) -> PredictorError {
    PredictorError::CorruptModel(reason)
}
