//! The batch-parallel driver.
//!
//! Clients are cut into batches, each batch runs on one worker of a
//! dedicated rayon pool, and finished batches stream through a bounded
//! channel into the caller's sink. Workers share the store handle, the job
//! and an abort flag; every client's data is a private snapshot.

use crate::config::{ClientErrorPolicy, DriverConfig};
use crate::error::{DriverError, Result};
use crate::partition::{partition_clients, ClientBatch};
use crate::report::RunReport;
use crate::sink::RowSink;
use crate::traits::{ClientJob, JobContext};
use data_loader::{ClientId, EventStore};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use tracing::{debug, error, info, instrument, warn};

/// What one worker hands back for one batch
struct BatchOutcome<R> {
    index: usize,
    rows: Vec<R>,
    report: RunReport,
    /// Set when this batch stopped the run
    abort: Option<(ClientId, DriverError)>,
}

pub struct ParallelDriver {
    store: Arc<dyn EventStore>,
    config: DriverConfig,
}

impl ParallelDriver {
    pub fn new(store: Arc<dyn EventStore>, config: DriverConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub fn config(&self) -> &DriverConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn EventStore {
        self.store.as_ref()
    }

    /// Run `job` over every client in the store
    pub fn run_all<J, S>(&self, job: &J, sink: &mut S) -> Result<RunReport>
    where
        J: ClientJob,
        S: RowSink<J::Row>,
    {
        let client_ids = self.store.client_ids()?;
        self.run(job, client_ids, sink)
    }

    /// Run `job` over `client_ids`.
    ///
    /// Rows reach `sink` batch by batch in completion order. A contract
    /// violation, or any client failure under
    /// [`ClientErrorPolicy::AbortAll`], stops the run with
    /// [`DriverError::Aborted`]; batches already delivered stay delivered.
    #[instrument(skip_all, fields(job = job.name(), clients = client_ids.len()))]
    pub fn run<J, S>(&self, job: &J, client_ids: Vec<ClientId>, sink: &mut S) -> Result<RunReport>
    where
        J: ClientJob,
        S: RowSink<J::Row>,
    {
        let batches = partition_clients(client_ids, self.config.batch_size)?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.worker_count)
            .thread_name(|i| format!("driver-worker-{}", i))
            .build()?;

        info!(
            "Running {} over {} batches on {} workers",
            job.name(),
            batches.len(),
            self.config.worker_count
        );

        let abort = AtomicBool::new(false);
        let (tx, rx) = mpsc::sync_channel::<BatchOutcome<J::Row>>(self.config.channel_capacity());

        let mut report = RunReport::default();
        let mut aborted: Option<(ClientId, DriverError)> = None;
        let mut sink_error: Option<DriverError> = None;

        std::thread::scope(|scope| {
            let batches = &batches;
            let abort = &abort;
            let pool = &pool;
            scope.spawn(move || {
                pool.install(|| {
                    batches.par_iter().for_each_with(tx, |tx, batch| {
                        let outcome = self.run_batch(job, batch, abort);
                        // The receiver outlives every sender
                        let _ = tx.send(outcome);
                    });
                });
            });

            for outcome in rx {
                info!(
                    "Batch {} finished: {} succeeded, {} failed, {} skipped",
                    outcome.index, outcome.report.succeeded, outcome.report.failed, outcome.report.skipped
                );
                report = report.merge(outcome.report);

                if sink_error.is_none() {
                    if let Err(e) = sink.write_batch(outcome.rows) {
                        error!("Sink rejected batch {}: {}", outcome.index, e);
                        abort.store(true, Ordering::SeqCst);
                        sink_error = Some(e);
                    }
                }

                if aborted.is_none() {
                    aborted = outcome.abort;
                }
            }
        });

        if let Some(e) = sink_error {
            return Err(e);
        }
        sink.finish()?;

        if let Some((client, source)) = aborted {
            error!("Run of {} aborted at client {}: {}", job.name(), client, report);
            return Err(DriverError::Aborted {
                client,
                source: Box::new(source),
                report,
            });
        }

        info!("Run of {} finished: {}", job.name(), report);
        Ok(report)
    }

    fn run_batch<J: ClientJob>(&self, job: &J, batch: &ClientBatch, abort: &AtomicBool) -> BatchOutcome<J::Row> {
        let ctx = JobContext {
            store: self.store.as_ref(),
            config: &self.config,
        };
        let mut outcome = BatchOutcome {
            index: batch.index,
            rows: Vec::new(),
            report: RunReport {
                batches: 1,
                ..RunReport::default()
            },
            abort: None,
        };

        for (position, client_id) in batch.client_ids.iter().enumerate() {
            let remaining = batch.len() - position - 1;
            if abort.load(Ordering::SeqCst) {
                outcome.report.skipped += remaining + 1;
                break;
            }

            match self.run_client(job, &ctx, client_id) {
                Ok(rows) => {
                    outcome.report.succeeded += 1;
                    outcome.report.rows += rows.len();
                    outcome.rows.extend(rows);
                }
                Err(e) => {
                    outcome.report.failed += 1;

                    if e.is_contract_violation() || self.config.on_client_error == ClientErrorPolicy::AbortAll {
                        error!(client = %client_id, "Client failed, stopping run: {}", e);
                        abort.store(true, Ordering::SeqCst);
                        outcome.report.skipped += remaining;
                        outcome.abort = Some((client_id.clone(), e));
                        break;
                    }

                    match self.config.on_client_error {
                        ClientErrorPolicy::AbortBatch => {
                            warn!(client = %client_id, "Client failed, abandoning batch {}: {}", batch.index, e);
                            outcome.report.skipped += remaining;
                            break;
                        }
                        _ => warn!(client = %client_id, "Skipping client: {}", e),
                    }
                }
            }
        }

        outcome
    }

    #[instrument(level = "debug", skip(self, job, ctx), fields(job = job.name()))]
    fn run_client<J: ClientJob>(&self, job: &J, ctx: &JobContext<'_>, client_id: &str) -> Result<Vec<J::Row>> {
        let rows = job.run(ctx, client_id)?;
        debug!("Client {} produced {} rows", client_id, rows.len());
        Ok(rows)
    }
}

impl std::fmt::Debug for ParallelDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelDriver")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
