//! Core trait for the windowed aggregator.
//!
//! Purchases and interaction events are matched by the same key, so the
//! window filters are written once against this trait.

use chrono::NaiveDate;
use data_loader::{EventRecord, PurchaseRecord};

/// A record positioned in time and keyed by (user, proposition).
///
/// `Sync` lets slices of records be filtered from rayon workers.
pub trait TimedRecord: Sync {
    fn user_id(&self) -> &str;
    fn proposition_id(&self) -> &str;
    fn date(&self) -> NaiveDate;
}

impl TimedRecord for EventRecord {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn proposition_id(&self) -> &str {
        &self.proposition_id
    }

    fn date(&self) -> NaiveDate {
        self.date
    }
}

impl TimedRecord for PurchaseRecord {
    fn user_id(&self) -> &str {
        &self.user_id
    }

    fn proposition_id(&self) -> &str {
        &self.proposition_id
    }

    fn date(&self) -> NaiveDate {
        self.date
    }
}
