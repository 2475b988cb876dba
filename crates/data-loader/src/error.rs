//! Error types for the data-loader crate.
//!
//! Everything that can go wrong between a raw row handed over by a table
//! reader and a validated [`ClientDataset`](crate::ClientDataset) ends up
//! here: malformed dates and amounts, missing key columns, records that
//! belong to another client, and store lookups that miss.

use thiserror::Error;

/// Errors that can occur while turning raw rows into client datasets
#[derive(Error, Debug)]
pub enum DataLoadError {
    /// A date or number in a row could not be parsed
    ///
    /// `row` is 1-based and counts data rows (the header is not a row).
    #[error("Parse error at row {row} in {table}: {reason}")]
    ParseError {
        table: String,
        row: usize,
        reason: String,
    },

    /// A standalone value (not tied to a table row) had an invalid format
    #[error("Invalid value for {field}: {value:?}")]
    InvalidValue { field: String, value: String },

    /// A column every row of the table must carry is absent
    #[error("Missing required column {column} in {table} (row {row})")]
    MissingColumn {
        table: String,
        column: String,
        row: usize,
    },

    /// A record inside a client dataset belongs to a different client
    #[error("Record for user {found} found in dataset of client {client}")]
    ForeignRecord { client: String, found: String },

    /// The store has no tables for the requested client
    #[error("Client {0} not found in event store")]
    ClientNotFound(String),

    /// I/O error surfaced by a store implementation
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DataLoadError {
    /// True for errors caused by the shape of the input tables rather than
    /// by individual values.
    pub fn is_schema_error(&self) -> bool {
        matches!(self, DataLoadError::MissingColumn { .. })
    }
}

/// Convenience type alias for Results in this crate
pub type Result<T> = std::result::Result<T, DataLoadError>;
