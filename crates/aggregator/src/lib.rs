//! # Aggregator Crate
//!
//! Windowed aggregates over one client's purchase and interaction streams.
//!
//! ## Components
//!
//! ### Windows
//! Signed day offsets around an anchor (user, proposition, date):
//! - Negative offsets look back ("seen 7 days before this purchase")
//! - Positive offsets look forward ("bought within 30 days of this view")
//! - Both ends of the window are inclusive
//!
//! ### Spend
//! Cumulative spend up to an anchor date:
//! - Per (user, proposition)
//! - Per category, where a proposition's category comes from the first
//!   interaction event that carries one
//!
//! ### Views
//! Per-client derived tables built from the two above:
//! - Purchase view: prior view counts for every purchase
//! - Event outcomes: following purchases and spend for every interaction
//!
//! ## Example Usage
//!
//! ```ignore
//! use aggregator::{purchase_view, enrich_events, EnrichmentOptions, CategoryMissPolicy};
//!
//! let view = purchase_view(&dataset);
//! let (enriched, outcomes) = enrich_events(&dataset, EnrichmentOptions::all(), CategoryMissPolicy::Zero)?;
//! ```
//!
//! All functions are pure with respect to their inputs and never touch
//! another client's records.

// Public modules
pub mod error;
pub mod traits;
pub mod window;
pub mod spend;
pub mod views;

// Re-export commonly used types
pub use error::{AggregateError, Result};
pub use spend::{total_spend_on_category, total_spend_on_category_of, total_spend_on_product, CategoryIndex, CategoryMissPolicy};
pub use traits::TimedRecord;
pub use views::{
    apply_outcomes, derived, enrich_events, purchase_view, EnrichmentOptions, EventOutcomeRow, EventOutcomes,
    OutcomeCalculator, PurchaseViewRow,
};
pub use window::{
    count_in_window, records_in, records_in_window, Anchor, DateWindow, FOLLOWING_PURCHASE_OFFSETS, PRIOR_VIEW_OFFSETS,
};
