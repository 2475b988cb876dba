//! Core domain types for the per-client event tables.
//!
//! Two event streams exist for every client: purchases and interactions
//! (page views, clicks). Both are keyed by user, proposition and calendar
//! date; interactions additionally carry a free-form attribute map with the
//! categorical signals the reward model consumes.

use chrono::NaiveDate;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

use crate::error::{DataLoadError, Result};

// =============================================================================
// Type Aliases
// =============================================================================

/// Identifier of a client (the `USER_CLIENT_NUMBER` column)
pub type ClientId = String;

/// Identifier of a proposition, i.e. a product that can be offered
pub type PropositionId = String;

// =============================================================================
// Column Names
// =============================================================================

/// Column names shared by the input and output tables.
pub mod columns {
    pub const USER_CLIENT_NUMBER: &str = "USER_CLIENT_NUMBER";
    pub const DATE: &str = "DATE";
    pub const TIMESTAMP_EVENT: &str = "TIMESTAMP_EVENT";
    pub const PROPOSITION: &str = "PROPOSITION";
    pub const AMOUNT: &str = "AMOUNT";
    pub const ARTICLE_CATEGORIE: &str = "ARTICLE_CATEGORIE";

    pub const PAGE_SECTION: &str = "PAGE_SECTION";
    pub const PAGE_NAME: &str = "PAGE_NAME";
    pub const DEVICE_INFO_BRAND: &str = "DEVICE_INFO_BRAND";
    pub const DEVICE_INFO_TYPE: &str = "DEVICE_INFO_TYPE";
    pub const DEVICE_INFO_BROWSER: &str = "DEVICE_INFO_BROWSER";
    pub const USER_SALES_GROUP: &str = "USER_SALES_GROUP";
    pub const USER_SEGMENT: &str = "USER_SEGMENT";
    pub const USER_SALES_DISTRICT: &str = "USER_SALES_DISTRICT";
    pub const PROMOTION_LABEL: &str = "PROMOTION_LABEL";
    pub const PROMOTION_PRICE: &str = "PROMOTION_PRICE";
    pub const USER_PROMOTIONS_ALLOWED: &str = "USER_PROMOTIONS_ALLOWED";

    /// Columns the store treats as record keys rather than attributes
    pub const KEY_COLUMNS: [&str; 5] = [USER_CLIENT_NUMBER, DATE, PROPOSITION, AMOUNT, ARTICLE_CATEGORIE];
}

// =============================================================================
// Raw Rows
// =============================================================================

/// One row as handed over by a table reader: column name to string value,
/// in the column order of the source table.
///
/// Serialises as a JSON object whose keys keep the column order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawRow {
    fields: Vec<(String, String)>,
}

impl RawRow {
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Set a column, replacing an existing value in place
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<String>) {
        let column = column.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((column, value)),
        }
    }

    /// Builder-style variant of [`RawRow::set`]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for RawRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (column, value) in &self.fields {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RawRow {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = RawRow::new();
        for (column, value) in iter {
            row.set(column, value);
        }
        row
    }
}

// =============================================================================
// Records
// =============================================================================

/// A single interaction (browsing) event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    pub user_id: ClientId,
    pub proposition_id: PropositionId,
    pub date: NaiveDate,
    pub amount: Option<f64>,
    /// `AMOUNT` cell as it was read, reused on write-back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_text: Option<String>,
    /// Product category (`ARTICLE_CATEGORIE`), when the export carries it
    pub category: Option<String>,
    /// Every non-key column: page section, device info, sales segmentation,
    /// promotion flags, and derived columns once a view is written back
    pub attributes: BTreeMap<String, String>,
}

impl EventRecord {
    pub fn new(
        user_id: impl Into<ClientId>,
        proposition_id: impl Into<PropositionId>,
        date: NaiveDate,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            proposition_id: proposition_id.into(),
            date,
            amount: None,
            amount_text: None,
            category: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_attribute(mut self, column: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(column.into(), value.into());
        self
    }

    pub fn attribute(&self, column: &str) -> Option<&str> {
        self.attributes.get(column).map(String::as_str)
    }
}

/// A purchase: an event whose amount is mandatory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub user_id: ClientId,
    pub proposition_id: PropositionId,
    pub date: NaiveDate,
    pub amount: f64,
    /// `AMOUNT` cell as it was read, reused on write-back
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount_text: Option<String>,
    pub category: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

impl PurchaseRecord {
    pub fn new(
        user_id: impl Into<ClientId>,
        proposition_id: impl Into<PropositionId>,
        date: NaiveDate,
        amount: f64,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            proposition_id: proposition_id.into(),
            date,
            amount,
            amount_text: None,
            category: None,
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

// =============================================================================
// ClientDataset
// =============================================================================

/// Both event streams of exactly one client.
///
/// Every record in both sequences carries the dataset's client id; this is
/// checked on construction. Records are not required to be sorted.
///
/// The dataset also remembers the column order of each source table so a
/// write-back keeps the original columns first and appends derived ones.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientDataset {
    client_id: ClientId,
    purchases: Vec<PurchaseRecord>,
    events: Vec<EventRecord>,
    purchase_columns: Vec<String>,
    event_columns: Vec<String>,
}

impl ClientDataset {
    /// Create a dataset, rejecting records that belong to another client.
    ///
    /// Column order defaults to the key columns followed by every attribute
    /// seen in the records (alphabetical).
    pub fn new(
        client_id: impl Into<ClientId>,
        purchases: Vec<PurchaseRecord>,
        events: Vec<EventRecord>,
    ) -> Result<Self> {
        let client_id = client_id.into();

        let foreign = purchases
            .iter()
            .map(|p| &p.user_id)
            .chain(events.iter().map(|e| &e.user_id))
            .find(|user| **user != client_id);
        if let Some(found) = foreign {
            return Err(DataLoadError::ForeignRecord {
                client: client_id,
                found: found.clone(),
            });
        }

        let purchase_columns = default_columns(
            &[columns::USER_CLIENT_NUMBER, columns::DATE, columns::PROPOSITION, columns::AMOUNT],
            purchases.iter().map(|p| &p.attributes),
            purchases.iter().any(|p| p.category.is_some()),
        );
        let event_columns = default_columns(
            &[columns::USER_CLIENT_NUMBER, columns::DATE, columns::PROPOSITION],
            events.iter().map(|e| &e.attributes),
            events.iter().any(|e| e.category.is_some()),
        );

        Ok(Self {
            client_id,
            purchases,
            events,
            purchase_columns,
            event_columns,
        })
    }

    /// Override the remembered column order of both tables
    pub fn with_columns(mut self, purchase_columns: Vec<String>, event_columns: Vec<String>) -> Self {
        self.purchase_columns = purchase_columns;
        self.event_columns = event_columns;
        self
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn purchases(&self) -> &[PurchaseRecord] {
        &self.purchases
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    pub fn purchase_columns(&self) -> &[String] {
        &self.purchase_columns
    }

    pub fn event_columns(&self) -> &[String] {
        &self.event_columns
    }

    /// Return a new dataset with the interaction events replaced.
    ///
    /// `extra_columns` are appended to the event column order unless already
    /// present. The purchase stream is carried over untouched.
    pub fn with_events(&self, events: Vec<EventRecord>, extra_columns: &[&str]) -> Result<Self> {
        if let Some(foreign) = events.iter().find(|e| e.user_id != self.client_id) {
            return Err(DataLoadError::ForeignRecord {
                client: self.client_id.clone(),
                found: foreign.user_id.clone(),
            });
        }

        let mut event_columns = self.event_columns.clone();
        for column in extra_columns {
            if !event_columns.iter().any(|c| c == column) {
                event_columns.push(column.to_string());
            }
        }

        Ok(Self {
            client_id: self.client_id.clone(),
            purchases: self.purchases.clone(),
            events,
            purchase_columns: self.purchase_columns.clone(),
            event_columns,
        })
    }

    /// (purchases, events) counts for logging
    pub fn counts(&self) -> (usize, usize) {
        (self.purchases.len(), self.events.len())
    }
}

fn default_columns<'a>(
    keys: &[&str],
    attributes: impl Iterator<Item = &'a BTreeMap<String, String>>,
    has_category: bool,
) -> Vec<String> {
    let mut cols: Vec<String> = keys.iter().map(|c| c.to_string()).collect();
    if has_category {
        cols.push(columns::ARTICLE_CATEGORIE.to_string());
    }
    let mut extra: Vec<&String> = attributes.flat_map(|map| map.keys()).collect();
    extra.sort();
    extra.dedup();
    for column in extra {
        if !cols.contains(column) {
            cols.push(column.clone());
        }
    }
    cols
}
