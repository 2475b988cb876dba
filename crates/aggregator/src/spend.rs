//! Cumulative spend up to a cutoff date.
//!
//! Two aggregates feed the reward model:
//! - spend on the anchor's proposition, keyed by (user, proposition)
//! - spend on the anchor proposition's category, keyed by category only
//!
//! Both are one-sided: every purchase on or before the cutoff counts.

use crate::error::{AggregateError, Result};
use crate::window::DateWindow;
use chrono::NaiveDate;
use data_loader::{EventRecord, PropositionId, PurchaseRecord};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

/// What to do when a proposition's category cannot be resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CategoryMissPolicy {
    /// Count the category spend as 0.0
    #[default]
    Zero,
    /// Fail with [`AggregateError::CategoryNotFound`]
    Reject,
}

/// Total amount a user spent on one proposition up to `cutoff` (inclusive)
pub fn total_spend_on_product(
    purchases: &[PurchaseRecord],
    user_id: &str,
    proposition_id: &str,
    cutoff: NaiveDate,
) -> f64 {
    let window = DateWindow::up_to(cutoff);
    purchases
        .iter()
        .filter(|p| p.user_id == user_id && p.proposition_id == proposition_id && window.contains(p.date))
        .map(|p| p.amount)
        .sum()
}

/// Proposition to category lookup built from the interaction stream.
///
/// A proposition takes the category of the first event (in table order)
/// that carries one.
#[derive(Debug, Clone, Default)]
pub struct CategoryIndex {
    by_proposition: HashMap<PropositionId, String>,
}

impl CategoryIndex {
    pub fn from_events(events: &[EventRecord]) -> Self {
        let mut by_proposition = HashMap::new();
        for event in events {
            if let Some(category) = &event.category {
                by_proposition
                    .entry(event.proposition_id.clone())
                    .or_insert_with(|| category.clone());
            }
        }
        Self { by_proposition }
    }

    pub fn category_of(&self, proposition_id: &str) -> Option<&str> {
        self.by_proposition.get(proposition_id).map(String::as_str)
    }

    /// A purchase's own category wins over the lookup
    pub fn category_of_purchase<'a>(&'a self, purchase: &'a PurchaseRecord) -> Option<&'a str> {
        purchase
            .category
            .as_deref()
            .or_else(|| self.category_of(&purchase.proposition_id))
    }

    pub fn len(&self) -> usize {
        self.by_proposition.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_proposition.is_empty()
    }
}

/// Total amount spent on any proposition of `category` up to `cutoff`
pub fn total_spend_on_category(
    purchases: &[PurchaseRecord],
    index: &CategoryIndex,
    category: &str,
    cutoff: NaiveDate,
) -> f64 {
    let window = DateWindow::up_to(cutoff);
    purchases
        .iter()
        .filter(|p| window.contains(p.date) && index.category_of_purchase(p) == Some(category))
        .map(|p| p.amount)
        .sum()
}

/// Category spend for the category of `proposition_id`.
///
/// `known_category` short-circuits the lookup when the anchor row already
/// carries its category. An unresolvable category is handled by `policy`.
pub fn total_spend_on_category_of(
    purchases: &[PurchaseRecord],
    index: &CategoryIndex,
    proposition_id: &str,
    known_category: Option<&str>,
    cutoff: NaiveDate,
    policy: CategoryMissPolicy,
) -> Result<f64> {
    match known_category.or_else(|| index.category_of(proposition_id)) {
        Some(category) => Ok(total_spend_on_category(purchases, index, category, cutoff)),
        None => match policy {
            CategoryMissPolicy::Zero => {
                debug!("No category for proposition {}, category spend is 0", proposition_id);
                Ok(0.0)
            }
            CategoryMissPolicy::Reject => Err(AggregateError::CategoryNotFound {
                proposition: proposition_id.to_string(),
            }),
        },
    }
}
