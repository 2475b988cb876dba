//! Errors surfaced by the parallel driver and the scorer.

use crate::report::RunReport;
use aggregator::AggregateError;
use data_loader::DataLoadError;
use pipeline::FeatureError;
use predictor::PredictorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DriverError {
    #[error(transparent)]
    Data(#[from] DataLoadError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Feature(#[from] FeatureError),

    #[error(transparent)]
    Predictor(#[from] PredictorError),

    #[error("Invalid driver configuration: {0}")]
    InvalidConfig(String),

    /// The client list handed to the partitioner names a client twice
    #[error("Client {0} appears more than once in the client list")]
    DuplicateClient(String),

    /// The run stopped early; `report` holds what was done until then
    #[error("Run aborted at client {client}: {source}")]
    Aborted {
        client: String,
        #[source]
        source: Box<DriverError>,
        report: RunReport,
    },

    #[error("Output sink failed: {0}")]
    Sink(String),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl DriverError {
    /// Schema and model contract failures. These stop the whole run no
    /// matter which per-client policy is configured.
    pub fn is_contract_violation(&self) -> bool {
        match self {
            DriverError::Data(e) => e.is_schema_error(),
            DriverError::Aggregate(AggregateError::Data(e)) => e.is_schema_error(),
            DriverError::Feature(e) => e.is_schema_error(),
            DriverError::Predictor(e) => e.is_contract_violation(),
            DriverError::InvalidConfig(_) => true,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, DriverError>;
