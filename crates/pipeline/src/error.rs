//! Error types for the feature pipeline.

use std::io;
use thiserror::Error;

/// Errors raised while building, encoding or assembling feature vectors
#[derive(Error, Debug)]
pub enum FeatureError {
    /// A required column is absent after default filling
    #[error("Missing required feature column: {column}")]
    MissingColumn { column: String },

    /// A numeric column holds something that is neither a number nor a flag
    #[error("Invalid numeric value for {column}: {value:?}")]
    InvalidNumeric { column: String, value: String },

    /// A categorical value was not seen when the encoding was built
    #[error("Unknown value {value:?} for categorical column {column}")]
    UnknownCategory { column: String, value: String },

    /// A code that maps back to no value (including the reserved unknown code)
    #[error("Code {code} does not decode for column {column}")]
    UnknownCode { column: String, code: i64 },

    /// A categorical value reached the matrix without being encoded
    #[error("Categorical column {column} is not encoded")]
    UnencodedColumn { column: String },

    /// A persisted encoding belongs to another model
    #[error("Encoding is for model {found}, expected {expected}")]
    ModelVersionMismatch { expected: String, found: String },

    /// A persisted code list names the same value twice
    #[error("Value {value:?} appears more than once in a persisted code list")]
    DuplicateCategory { value: String },

    /// A model version that cannot be used as part of a file name
    #[error("Invalid model version {version:?}")]
    InvalidModelVersion { version: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FeatureError {
    /// Contract failures: the feature row does not match what the model expects
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            FeatureError::MissingColumn { .. }
                | FeatureError::UnencodedColumn { .. }
                | FeatureError::ModelVersionMismatch { .. }
                | FeatureError::DuplicateCategory { .. }
                | FeatureError::InvalidModelVersion { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, FeatureError>;
