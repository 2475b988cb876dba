//! Error types for the aggregator crate.

use data_loader::DataLoadError;
use thiserror::Error;

/// Errors raised while computing windowed aggregates and derived views
#[derive(Error, Debug)]
pub enum AggregateError {
    /// No interaction event carries a category for this proposition and the
    /// caller asked for misses to be reported instead of counted as zero
    #[error("No category known for proposition {proposition}")]
    CategoryNotFound { proposition: String },

    /// Derived outcomes do not line up with the events they belong to
    #[error("Expected {expected} event outcomes but got {found}")]
    OutcomeCount { expected: usize, found: usize },

    /// The derived dataset could not be assembled
    #[error(transparent)]
    Data(#[from] DataLoadError),
}

pub type Result<T> = std::result::Result<T, AggregateError>;
