//! The per-client jobs a run can execute.

use crate::config::DriverConfig;
use crate::error::Result;
use crate::scoring::{RewardScorer, ScoredEvent};
use crate::traits::{ClientJob, JobContext};
use aggregator::{enrich_events, purchase_view, EnrichmentOptions, EventOutcomeRow, PurchaseViewRow};
use data_loader::RawRow;
use serde::Serialize;
use tracing::debug;

/// One output row of a [`DriverJob`]
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DriverRow {
    PurchaseView(PurchaseViewRow),
    EventOutcome(EventOutcomeRow),
    Table(RawRow),
}

/// The table-level jobs of the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverJob {
    /// Compute event outcomes and write the enriched events back to the store
    Enrich(EnrichmentOptions),
    /// Prior view counts for every purchase
    PurchaseView,
    /// Every client's interaction table as rows
    CollectEvents,
    /// Every client's purchase table as rows
    CollectPurchases,
}

impl DriverJob {
    /// Enrichment with the outcome groups chosen in `config`
    pub fn enrich(config: &DriverConfig) -> Self {
        DriverJob::Enrich(config.enrichment)
    }
}

impl ClientJob for DriverJob {
    type Row = DriverRow;

    fn name(&self) -> &str {
        match self {
            DriverJob::Enrich(_) => "enrich",
            DriverJob::PurchaseView => "purchase_view",
            DriverJob::CollectEvents => "collect_events",
            DriverJob::CollectPurchases => "collect_purchases",
        }
    }

    fn run(&self, ctx: &JobContext<'_>, client_id: &str) -> Result<Vec<DriverRow>> {
        let dataset = ctx.store.load_client(client_id)?;
        let rows = match self {
            DriverJob::Enrich(options) => {
                let (enriched, outcomes) = enrich_events(&dataset, *options, ctx.config.category_miss)?;
                ctx.store.write_client(&enriched)?;
                dataset
                    .events()
                    .iter()
                    .zip(outcomes)
                    .map(|(event, outcome)| DriverRow::EventOutcome(EventOutcomeRow::new(event, outcome)))
                    .collect()
            }
            DriverJob::PurchaseView => purchase_view(&dataset)
                .into_iter()
                .map(DriverRow::PurchaseView)
                .collect(),
            DriverJob::CollectEvents => dataset.event_rows().into_iter().map(DriverRow::Table).collect(),
            DriverJob::CollectPurchases => dataset.purchase_rows().into_iter().map(DriverRow::Table).collect(),
        };
        Ok(rows)
    }
}

/// Score every interaction event of each client.
pub struct ScoreEventsJob<'s> {
    scorer: &'s RewardScorer,
}

impl<'s> ScoreEventsJob<'s> {
    pub fn new(scorer: &'s RewardScorer) -> Self {
        Self { scorer }
    }
}

impl ClientJob for ScoreEventsJob<'_> {
    type Row = ScoredEvent;

    fn name(&self) -> &str {
        "score_events"
    }

    fn run(&self, ctx: &JobContext<'_>, client_id: &str) -> Result<Vec<ScoredEvent>> {
        let dataset = ctx.store.load_client(client_id)?;
        let scored = self.scorer.score_events(&dataset)?;
        debug!("Scored {} events of client {}", scored.len(), client_id);
        Ok(scored)
    }
}
