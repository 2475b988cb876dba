//! Errors that can occur when loading or querying a reward model.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PredictorError {
    #[error("Model artifact not found: {0}")]
    ModelNotFound(String),

    #[error("Corrupt model artifact: {0}")]
    CorruptModel(String),

    /// The artifact's feature contract differs from the active schema
    #[error("Model expects {found:?} but schema {schema} provides {expected:?}")]
    SchemaMismatch {
        schema: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Feature matrix lacks column {0} required by the model")]
    MissingFeature(String),

    #[error("Feature matrix has column {0} more than once")]
    DuplicateColumn(String),

    #[error("Row has {found} values, model expects {expected}")]
    RowWidth { expected: usize, found: usize },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl PredictorError {
    /// Errors that mean the model cannot serve this feature layout at all
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            PredictorError::SchemaMismatch { .. }
                | PredictorError::MissingFeature(_)
                | PredictorError::DuplicateColumn(_)
                | PredictorError::RowWidth { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, PredictorError>;
