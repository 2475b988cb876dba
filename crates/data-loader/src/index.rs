//! Building client datasets from parsed tables.
//!
//! Two entry points:
//! - [`ClientDataset::from_rows`] for the per-client layout, where each client
//!   already has its own purchase and event tables
//! - [`partition_by_client`] for global exports that hold every client in
//!   one purchase table and one event table

use crate::error::Result;
use crate::parser;
use crate::types::*;
use std::collections::HashMap;
use tracing::debug;

impl ClientDataset {
    /// Parse one client's two tables and remember their column order
    pub fn from_rows(
        client_id: impl Into<ClientId>,
        purchase_rows: &[RawRow],
        event_rows: &[RawRow],
    ) -> Result<Self> {
        let purchases = parser::parse_purchases(purchase_rows)?;
        let events = parser::parse_events(event_rows)?;

        let dataset = ClientDataset::new(client_id, purchases, events)?;

        // Empty tables keep the default column order
        let purchase_columns = match parser::column_order(purchase_rows) {
            cols if cols.is_empty() => dataset.purchase_columns().to_vec(),
            cols => cols,
        };
        let event_columns = match parser::column_order(event_rows) {
            cols if cols.is_empty() => dataset.event_columns().to_vec(),
            cols => cols,
        };

        Ok(dataset.with_columns(purchase_columns, event_columns))
    }

    /// Render the purchase table for a full overwrite
    pub fn purchase_rows(&self) -> Vec<RawRow> {
        parser::purchases_to_rows(self.purchases(), self.purchase_columns())
    }

    /// Render the event table for a full overwrite
    pub fn event_rows(&self) -> Vec<RawRow> {
        parser::events_to_rows(self.events(), self.event_columns())
    }
}

/// Split global purchase and event tables into one dataset per client.
///
/// The client list is the distinct purchasers in first-seen order; events of
/// users that never purchased are not materialised. Record order inside each
/// client follows the input order.
pub fn partition_by_client(
    purchases: Vec<PurchaseRecord>,
    events: Vec<EventRecord>,
) -> Result<Vec<ClientDataset>> {
    let mut order: Vec<ClientId> = Vec::new();
    let mut purchases_by_client: HashMap<ClientId, Vec<PurchaseRecord>> = HashMap::new();

    for purchase in purchases {
        let bucket = purchases_by_client
            .entry(purchase.user_id.clone())
            .or_insert_with(|| {
                order.push(purchase.user_id.clone());
                Vec::new()
            });
        bucket.push(purchase);
    }

    let mut events_by_client: HashMap<ClientId, Vec<EventRecord>> = HashMap::new();
    let mut dropped = 0usize;
    for event in events {
        if purchases_by_client.contains_key(&event.user_id) {
            events_by_client
                .entry(event.user_id.clone())
                .or_default()
                .push(event);
        } else {
            dropped += 1;
        }
    }

    debug!(
        "Partitioned {} clients ({} events without purchases dropped)",
        order.len(),
        dropped
    );

    order
        .into_iter()
        .map(|client_id| {
            let purchases = purchases_by_client.remove(&client_id).unwrap_or_default();
            let events = events_by_client.remove(&client_id).unwrap_or_default();
            ClientDataset::new(client_id, purchases, events)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_partition_by_client_first_seen_order() {
        let purchases = vec![
            PurchaseRecord::new("B", "P1", date("2024-01-02"), 5.0),
            PurchaseRecord::new("A", "P1", date("2024-01-01"), 10.0),
            PurchaseRecord::new("B", "P2", date("2024-01-03"), 7.0),
        ];
        let events = vec![
            EventRecord::new("A", "P1", date("2024-01-01")),
            EventRecord::new("C", "P9", date("2024-01-01")),
            EventRecord::new("B", "P2", date("2024-01-01")),
        ];

        let datasets = partition_by_client(purchases, events).unwrap();

        let ids: Vec<_> = datasets.iter().map(|d| d.client_id()).collect();
        assert_eq!(ids, vec!["B", "A"]);
        assert_eq!(datasets[0].counts(), (2, 1));
        assert_eq!(datasets[1].counts(), (1, 1));
    }

    #[test]
    fn test_from_rows_keeps_column_order() {
        let purchase_rows = vec![RawRow::new()
            .with("AMOUNT", "3")
            .with("USER_CLIENT_NUMBER", "7")
            .with("DATE", "2024-03-01")
            .with("PROPOSITION", "P1")];

        let dataset = ClientDataset::from_rows("7", &purchase_rows, &[]).unwrap();

        assert_eq!(dataset.purchase_columns()[0], "AMOUNT");
        assert_eq!(dataset.purchase_rows(), purchase_rows);
        assert_eq!(dataset.event_columns().len(), 3);
    }
}
