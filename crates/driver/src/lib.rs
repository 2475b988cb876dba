//! # Driver Crate
//!
//! Runs per-client work over the whole client population and scores
//! candidate propositions.
//!
//! ## Components
//!
//! ### Parallel driver
//! - Clients are partitioned into fixed-size batches, each client in
//!   exactly one batch
//! - Batches run on a bounded rayon pool; workers load their own snapshot
//!   of each client and share nothing mutable
//! - Finished batches stream into a [`RowSink`] on the caller's thread;
//!   row order across batches is not defined
//! - Client failures follow [`ClientErrorPolicy`]; contract violations
//!   always stop the run
//!
//! ### Scoring
//! [`RewardScorer`] builds, encodes and scores feature rows for candidate
//! propositions with a loaded [`predictor::RewardPredictor`].
//!
//! ## Example Usage
//!
//! ```ignore
//! use driver::{DriverConfig, DriverJob, ParallelDriver, JsonLinesSink};
//!
//! let config = DriverConfig::from_json_file(Path::new("driver.json"))?;
//! let driver = ParallelDriver::new(store, config)?;
//! let mut sink = JsonLinesSink::new(std::io::stdout());
//! let report = driver.run_all(&DriverJob::enrich(driver.config()), &mut sink)?;
//! ```

pub mod error;
pub mod config;
pub mod partition;
pub mod report;
pub mod sink;
pub mod traits;
pub mod jobs;
pub mod driver;
pub mod scoring;
pub mod telemetry;

pub use config::{ClientErrorPolicy, DriverConfig, DEFAULT_BATCH_SIZE, DEFAULT_WORKER_COUNT};
pub use driver::ParallelDriver;
pub use error::{DriverError, Result};
pub use jobs::{DriverJob, DriverRow, ScoreEventsJob};
pub use partition::{partition_clients, ClientBatch};
pub use report::RunReport;
pub use scoring::{RewardScorer, ScoredEvent, ScoredProposition, ScoringRequest};
pub use sink::{JsonLinesSink, RowSink, VecSink};
pub use telemetry::init_tracing;
pub use traits::{ClientJob, JobContext};
