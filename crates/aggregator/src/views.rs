//! Per-client derived views.
//!
//! - **Purchase view**: every purchase with the number of times the
//!   proposition was seen in the 30, 7 and 1 days before it
//! - **Event outcomes**: every interaction event with the purchases that
//!   followed it (7 and 30 days) and the spend on its product and category
//!   up to the event date
//!
//! Rows inside one client are computed in parallel and keep input order.
//! Nothing here mutates the input dataset; derived columns are written into
//! a new dataset by [`apply_outcomes`].

use crate::error::{AggregateError, Result};
use crate::spend::{self, CategoryIndex, CategoryMissPolicy};
use crate::window::{count_in_window, Anchor};
use chrono::NaiveDate;
use data_loader::{ClientDataset, ClientId, EventRecord, PropositionId, PurchaseRecord};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Derived column names written back into the events table
pub mod derived {
    pub const PURCHASES_7_DAY_AFTER: &str = "purchases_7_day_after";
    pub const PURCHASES_30_DAY_AFTER: &str = "purchases_30_day_after";
    pub const TOTAL_SPEND_ON_PRODUCT: &str = "total_spend_on_product";
    pub const TOTAL_SPEND_ON_CATEGORY_PRODUCT: &str = "total_spend_on_category_product";
}

// =============================================================================
// Purchase view
// =============================================================================

/// One purchase with prior view counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseViewRow {
    #[serde(rename = "USER_CLIENT_NUMBER")]
    pub user_id: ClientId,
    #[serde(rename = "DATE")]
    pub date: NaiveDate,
    #[serde(rename = "PROPOSITION")]
    pub proposition_id: PropositionId,
    #[serde(rename = "AMOUNT")]
    pub amount: f64,
    #[serde(rename = "NUMBER_OF_TIMES_SEEN_30_days")]
    pub seen_30_days: usize,
    #[serde(rename = "NUMBER_OF_TIMES_SEEN_7_days")]
    pub seen_7_days: usize,
    #[serde(rename = "NUMBER_OF_TIMES_SEEN_1_days")]
    pub seen_1_days: usize,
}

impl PurchaseViewRow {
    fn compute(purchase: &PurchaseRecord, events: &[EventRecord]) -> Self {
        let anchor = Anchor::of(purchase);
        Self {
            user_id: purchase.user_id.clone(),
            date: purchase.date,
            proposition_id: purchase.proposition_id.clone(),
            amount: purchase.amount,
            seen_30_days: count_in_window(events, &anchor, -30),
            seen_7_days: count_in_window(events, &anchor, -7),
            seen_1_days: count_in_window(events, &anchor, -1),
        }
    }
}

/// Prior view counts for every purchase of one client
#[instrument(skip(dataset), fields(client_id = dataset.client_id()))]
pub fn purchase_view(dataset: &ClientDataset) -> Vec<PurchaseViewRow> {
    let events = dataset.events();
    let rows: Vec<PurchaseViewRow> = dataset
        .purchases()
        .par_iter()
        .map(|purchase| PurchaseViewRow::compute(purchase, events))
        .collect();
    debug!("Computed purchase view with {} rows", rows.len());
    rows
}

// =============================================================================
// Event outcomes
// =============================================================================

/// Which outcome groups to compute for each interaction event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnrichmentOptions {
    /// purchases_7_day_after and purchases_30_day_after
    pub purchases_after: bool,
    /// total_spend_on_product
    pub product_spend: bool,
    /// total_spend_on_category_product
    pub category_spend: bool,
}

impl EnrichmentOptions {
    pub fn all() -> Self {
        Self {
            purchases_after: true,
            product_spend: true,
            category_spend: true,
        }
    }

    pub fn none() -> Self {
        Self {
            purchases_after: false,
            product_spend: false,
            category_spend: false,
        }
    }

    pub fn with_purchases_after(mut self, enabled: bool) -> Self {
        self.purchases_after = enabled;
        self
    }

    pub fn with_product_spend(mut self, enabled: bool) -> Self {
        self.product_spend = enabled;
        self
    }

    pub fn with_category_spend(mut self, enabled: bool) -> Self {
        self.category_spend = enabled;
        self
    }
}

impl Default for EnrichmentOptions {
    fn default() -> Self {
        Self::all()
    }
}

/// Outcomes derived for one interaction event. Disabled groups are `None`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EventOutcomes {
    pub purchases_7_day_after: Option<usize>,
    pub purchases_30_day_after: Option<usize>,
    pub total_spend_on_product: Option<f64>,
    pub total_spend_on_category_product: Option<f64>,
}

impl EventOutcomes {
    /// Derived (column, value) pairs for the enabled groups
    pub fn columns(&self) -> Vec<(&'static str, String)> {
        let mut cols = Vec::with_capacity(4);
        if let Some(count) = self.purchases_7_day_after {
            cols.push((derived::PURCHASES_7_DAY_AFTER, count.to_string()));
        }
        if let Some(count) = self.purchases_30_day_after {
            cols.push((derived::PURCHASES_30_DAY_AFTER, count.to_string()));
        }
        if let Some(spend) = self.total_spend_on_product {
            cols.push((derived::TOTAL_SPEND_ON_PRODUCT, spend.to_string()));
        }
        if let Some(spend) = self.total_spend_on_category_product {
            cols.push((derived::TOTAL_SPEND_ON_CATEGORY_PRODUCT, spend.to_string()));
        }
        cols
    }
}

/// Computes [`EventOutcomes`] for the events of one client.
pub struct OutcomeCalculator<'d> {
    dataset: &'d ClientDataset,
    categories: CategoryIndex,
    options: EnrichmentOptions,
    miss_policy: CategoryMissPolicy,
}

impl<'d> OutcomeCalculator<'d> {
    pub fn new(dataset: &'d ClientDataset, options: EnrichmentOptions) -> Self {
        Self {
            dataset,
            categories: CategoryIndex::from_events(dataset.events()),
            options,
            miss_policy: CategoryMissPolicy::default(),
        }
    }

    /// Configure how unresolvable categories are handled (default: Zero)
    pub fn with_miss_policy(mut self, policy: CategoryMissPolicy) -> Self {
        self.miss_policy = policy;
        self
    }

    pub fn categories(&self) -> &CategoryIndex {
        &self.categories
    }

    /// Outcomes for a single event of this client
    pub fn outcomes_for(&self, event: &EventRecord) -> Result<EventOutcomes> {
        let purchases = self.dataset.purchases();
        let anchor = Anchor::of(event);
        let mut outcomes = EventOutcomes::default();

        if self.options.purchases_after {
            outcomes.purchases_7_day_after = Some(count_in_window(purchases, &anchor, 7));
            outcomes.purchases_30_day_after = Some(count_in_window(purchases, &anchor, 30));
        }
        if self.options.product_spend {
            outcomes.total_spend_on_product = Some(spend::total_spend_on_product(
                purchases,
                &event.user_id,
                &event.proposition_id,
                event.date,
            ));
        }
        if self.options.category_spend {
            outcomes.total_spend_on_category_product = Some(spend::total_spend_on_category_of(
                purchases,
                &self.categories,
                &event.proposition_id,
                event.category.as_deref(),
                event.date,
                self.miss_policy,
            )?);
        }

        Ok(outcomes)
    }

    /// Outcomes for every event, in event order
    #[instrument(skip(self), fields(client_id = self.dataset.client_id()))]
    pub fn compute(&self) -> Result<Vec<EventOutcomes>> {
        let outcomes: Vec<EventOutcomes> = self
            .dataset
            .events()
            .par_iter()
            .map(|event| self.outcomes_for(event))
            .collect::<Result<_>>()?;
        debug!("Computed outcomes for {} events", outcomes.len());
        Ok(outcomes)
    }
}

/// Write outcomes into a NEW dataset as derived event columns.
///
/// Columns are appended for every group present in at least one outcome.
pub fn apply_outcomes(dataset: &ClientDataset, outcomes: &[EventOutcomes]) -> Result<ClientDataset> {
    if outcomes.len() != dataset.events().len() {
        return Err(AggregateError::OutcomeCount {
            expected: dataset.events().len(),
            found: outcomes.len(),
        });
    }

    let mut extra_columns: Vec<&'static str> = Vec::new();
    let events: Vec<EventRecord> = dataset
        .events()
        .iter()
        .zip(outcomes)
        .map(|(event, outcome)| {
            let mut enriched = event.clone();
            for (column, value) in outcome.columns() {
                if !extra_columns.contains(&column) {
                    extra_columns.push(column);
                }
                enriched.attributes.insert(column.to_string(), value);
            }
            enriched
        })
        .collect();

    Ok(dataset.with_events(events, &extra_columns)?)
}

/// Compute outcomes and return the enriched dataset alongside them
pub fn enrich_events(
    dataset: &ClientDataset,
    options: EnrichmentOptions,
    miss_policy: CategoryMissPolicy,
) -> Result<(ClientDataset, Vec<EventOutcomes>)> {
    let outcomes = OutcomeCalculator::new(dataset, options)
        .with_miss_policy(miss_policy)
        .compute()?;
    let enriched = apply_outcomes(dataset, &outcomes)?;
    Ok((enriched, outcomes))
}

/// One event of the events-with-outcomes output table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventOutcomeRow {
    #[serde(rename = "USER_CLIENT_NUMBER")]
    pub user_id: ClientId,
    #[serde(rename = "DATE")]
    pub date: NaiveDate,
    #[serde(rename = "PROPOSITION")]
    pub proposition_id: PropositionId,
    #[serde(flatten)]
    pub outcomes: EventOutcomes,
}

impl EventOutcomeRow {
    pub fn new(event: &EventRecord, outcomes: EventOutcomes) -> Self {
        Self {
            user_id: event.user_id.clone(),
            date: event.date,
            proposition_id: event.proposition_id.clone(),
            outcomes,
        }
    }
}
