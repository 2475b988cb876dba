//! Core trait for per-client work.
//!
//! The driver knows how to batch clients, spread batches over workers and
//! stream results; what happens to one client is a `ClientJob`.

use crate::config::DriverConfig;
use crate::error::Result;
use data_loader::EventStore;

/// What a job sees besides the client id
#[derive(Clone, Copy)]
pub struct JobContext<'a> {
    pub store: &'a dyn EventStore,
    pub config: &'a DriverConfig,
}

/// Work done for one client inside a worker.
///
/// `Sync` because one job value is shared by every worker of a run.
/// Implementations load their own snapshot through `ctx.store` and must not
/// touch any other client's tables.
pub trait ClientJob: Sync {
    type Row: Send;

    /// Returns the name of this job (for logging)
    fn name(&self) -> &str;

    /// Process one client and return its output rows
    fn run(&self, ctx: &JobContext<'_>, client_id: &str) -> Result<Vec<Self::Row>>;
}
