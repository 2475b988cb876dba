//! Row parsing for the purchase and interaction tables.
//!
//! Reading the pipe-delimited files themselves is the job of whatever sits
//! in front of the engine; this module receives rows as [`RawRow`]s and turns
//! them into typed records:
//! - purchases: USER_CLIENT_NUMBER | DATE | PROPOSITION | AMOUNT | ...
//! - events: USER_CLIENT_NUMBER | DATE (or TIMESTAMP_EVENT) | PROPOSITION | ...
//!
//! It also renders records back into rows for a full-table write-back.

use crate::error::{DataLoadError, Result};
use crate::types::*;
use chrono::NaiveDate;
use std::collections::BTreeMap;

const PURCHASES_TABLE: &str = "purchases";
const EVENTS_TABLE: &str = "events";

/// Parse a date column value.
///
/// Accepts a plain ISO date or a timestamp whose time part is separated by
/// `T` or a space; only the date part is kept.
///
/// Example: "2024-11-18T10:32:00Z" -> 2024-11-18
pub fn parse_event_date(raw: &str) -> Result<NaiveDate> {
    let trimmed = raw.trim();
    let date_part = trimmed.split(['T', ' ']).next().unwrap_or(trimmed);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| DataLoadError::InvalidValue {
        field: "date".to_string(),
        value: raw.to_string(),
    })
}

/// Parse the purchase table rows
pub fn parse_purchases(rows: &[RawRow]) -> Result<Vec<PurchaseRecord>> {
    let mut purchases = Vec::with_capacity(rows.len());

    for (idx, row) in rows.iter().enumerate() {
        let row_no = idx + 1;

        let user_id = required(row, PURCHASES_TABLE, columns::USER_CLIENT_NUMBER, row_no)?;
        let date = required(row, PURCHASES_TABLE, columns::DATE, row_no)?;
        let proposition = required(row, PURCHASES_TABLE, columns::PROPOSITION, row_no)?;
        let amount = required(row, PURCHASES_TABLE, columns::AMOUNT, row_no)?;

        purchases.push(PurchaseRecord {
            user_id: user_id.to_string(),
            proposition_id: proposition.to_string(),
            date: date_in_row(date, PURCHASES_TABLE, row_no)?,
            amount: parse_amount(amount, PURCHASES_TABLE, row_no)?,
            amount_text: Some(amount.to_string()),
            category: optional(row, columns::ARTICLE_CATEGORIE),
            attributes: attributes_of(row),
        });
    }

    Ok(purchases)
}

/// Parse the interaction table rows
///
/// `DATE` wins over `TIMESTAMP_EVENT` when both are present.
pub fn parse_events(rows: &[RawRow]) -> Result<Vec<EventRecord>> {
    let mut events = Vec::with_capacity(rows.len());

    for (idx, row) in rows.iter().enumerate() {
        let row_no = idx + 1;

        let user_id = required(row, EVENTS_TABLE, columns::USER_CLIENT_NUMBER, row_no)?;
        let proposition = required(row, EVENTS_TABLE, columns::PROPOSITION, row_no)?;
        let date = row
            .get(columns::DATE)
            .or_else(|| row.get(columns::TIMESTAMP_EVENT))
            .ok_or_else(|| DataLoadError::MissingColumn {
                table: EVENTS_TABLE.to_string(),
                column: columns::DATE.to_string(),
                row: row_no,
            })?;

        let amount_text = optional(row, columns::AMOUNT);
        let amount = match &amount_text {
            Some(raw) => Some(parse_amount(raw, EVENTS_TABLE, row_no)?),
            None => None,
        };

        events.push(EventRecord {
            user_id: user_id.to_string(),
            proposition_id: proposition.to_string(),
            date: date_in_row(date, EVENTS_TABLE, row_no)?,
            amount,
            amount_text,
            category: optional(row, columns::ARTICLE_CATEGORIE),
            attributes: attributes_of(row),
        });
    }

    Ok(events)
}

/// Column order of a parsed table, taken from its first row
pub fn column_order(rows: &[RawRow]) -> Vec<String> {
    rows.first()
        .map(|row| row.columns().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Render purchases back into rows in the given column order
pub fn purchases_to_rows(purchases: &[PurchaseRecord], column_order: &[String]) -> Vec<RawRow> {
    purchases
        .iter()
        .map(|p| {
            column_order
                .iter()
                .map(|column| {
                    let value = match column.as_str() {
                        columns::USER_CLIENT_NUMBER => p.user_id.clone(),
                        columns::DATE => p.date.to_string(),
                        columns::PROPOSITION => p.proposition_id.clone(),
                        columns::AMOUNT => amount_cell(p.amount, p.amount_text.as_deref()),
                        columns::ARTICLE_CATEGORIE => p.category.clone().unwrap_or_default(),
                        other => p.attributes.get(other).cloned().unwrap_or_default(),
                    };
                    (column.clone(), value)
                })
                .collect()
        })
        .collect()
}

/// Render events back into rows in the given column order
pub fn events_to_rows(events: &[EventRecord], column_order: &[String]) -> Vec<RawRow> {
    events
        .iter()
        .map(|e| {
            column_order
                .iter()
                .map(|column| {
                    let value = match column.as_str() {
                        columns::USER_CLIENT_NUMBER => e.user_id.clone(),
                        columns::DATE => e.date.to_string(),
                        columns::PROPOSITION => e.proposition_id.clone(),
                        columns::AMOUNT => e
                            .amount
                            .map(|a| amount_cell(a, e.amount_text.as_deref()))
                            .unwrap_or_default(),
                        columns::ARTICLE_CATEGORIE => e.category.clone().unwrap_or_default(),
                        other => e.attributes.get(other).cloned().unwrap_or_default(),
                    };
                    (column.clone(), value)
                })
                .collect()
        })
        .collect()
}

/// The source text while it still denotes `amount`, a fresh rendering otherwise
fn amount_cell(amount: f64, text: Option<&str>) -> String {
    match text {
        Some(text) if text.trim().parse::<f64>().ok() == Some(amount) => text.to_string(),
        _ => amount.to_string(),
    }
}

fn required<'a>(row: &'a RawRow, table: &str, column: &str, row_no: usize) -> Result<&'a str> {
    row.get(column).ok_or_else(|| DataLoadError::MissingColumn {
        table: table.to_string(),
        column: column.to_string(),
        row: row_no,
    })
}

/// Present and non-blank
fn optional(row: &RawRow, column: &str) -> Option<String> {
    row.get(column)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn date_in_row(raw: &str, table: &str, row_no: usize) -> Result<NaiveDate> {
    parse_event_date(raw).map_err(|_| DataLoadError::ParseError {
        table: table.to_string(),
        row: row_no,
        reason: format!("Invalid date: {:?}", raw),
    })
}

fn parse_amount(raw: &str, table: &str, row_no: usize) -> Result<f64> {
    let amount: f64 = raw.trim().parse().map_err(|e| DataLoadError::ParseError {
        table: table.to_string(),
        row: row_no,
        reason: format!("Invalid amount {:?}: {}", raw, e),
    })?;
    if !amount.is_finite() {
        return Err(DataLoadError::ParseError {
            table: table.to_string(),
            row: row_no,
            reason: format!("Non-finite amount {:?}", raw),
        });
    }
    Ok(amount)
}

fn attributes_of(row: &RawRow) -> BTreeMap<String, String> {
    row.iter()
        .filter(|(column, _)| !columns::KEY_COLUMNS.contains(column))
        .map(|(column, value)| (column.to_string(), value.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn purchase_row(date: &str, amount: &str) -> RawRow {
        RawRow::new()
            .with("USER_CLIENT_NUMBER", "230")
            .with("DATE", date)
            .with("PROPOSITION", "P1")
            .with("AMOUNT", amount)
    }

    #[test]
    fn test_parse_event_date_variants() {
        let expected = NaiveDate::from_ymd_opt(2024, 11, 18).unwrap();
        assert_eq!(parse_event_date("2024-11-18").unwrap(), expected);
        assert_eq!(parse_event_date("2024-11-18T10:32:00Z").unwrap(), expected);
        assert_eq!(parse_event_date("2024-11-18 10:32:00").unwrap(), expected);
    }

    #[test]
    fn test_parse_event_date_rejects_garbage() {
        assert!(matches!(
            parse_event_date("18/11/2024"),
            Err(DataLoadError::InvalidValue { .. })
        ));
        assert!(parse_event_date("").is_err());
    }

    #[test]
    fn test_parse_purchases() {
        let rows = vec![purchase_row("2024-01-01", "10.5")];
        let purchases = parse_purchases(&rows).unwrap();

        assert_eq!(purchases.len(), 1);
        assert_eq!(purchases[0].user_id, "230");
        assert_eq!(purchases[0].amount, 10.5);
        assert!(purchases[0].attributes.is_empty());
    }

    #[test]
    fn test_malformed_date_is_parse_error_with_row() {
        let rows = vec![purchase_row("2024-01-01", "1"), purchase_row("not-a-date", "1")];
        match parse_purchases(&rows) {
            Err(DataLoadError::ParseError { row, table, .. }) => {
                assert_eq!(row, 2);
                assert_eq!(table, "purchases");
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_amount_column_is_schema_error() {
        let rows = vec![RawRow::new()
            .with("USER_CLIENT_NUMBER", "230")
            .with("DATE", "2024-01-01")
            .with("PROPOSITION", "P1")];
        let err = parse_purchases(&rows).unwrap_err();
        assert!(err.is_schema_error());
    }

    #[test]
    fn test_parse_events_falls_back_to_timestamp() {
        let rows = vec![RawRow::new()
            .with("USER_CLIENT_NUMBER", "230")
            .with("TIMESTAMP_EVENT", "2024-11-05T08:00:00Z")
            .with("PROPOSITION", "P1")
            .with("PAGE_SECTION", "deals")
            .with("ARTICLE_CATEGORIE", "")];
        let events = parse_events(&rows).unwrap();

        assert_eq!(events[0].date, NaiveDate::from_ymd_opt(2024, 11, 5).unwrap());
        assert_eq!(events[0].attribute("PAGE_SECTION"), Some("deals"));
        assert_eq!(events[0].category, None);
    }

    #[test]
    fn test_events_round_trip_through_rows() {
        let rows = vec![RawRow::new()
            .with("USER_CLIENT_NUMBER", "230")
            .with("DATE", "2024-11-05")
            .with("PROPOSITION", "P1")
            .with("PAGE_SECTION", "deals")
            .with("ARTICLE_CATEGORIE", "shoes")];
        let order = column_order(&rows);
        let events = parse_events(&rows).unwrap();

        assert_eq!(events_to_rows(&events, &order), rows);
    }

    #[test]
    fn test_amount_text_survives_write_back() {
        let rows = vec![purchase_row("2024-11-05", "10.50"), purchase_row("2024-11-06", "3")];
        let order = column_order(&rows);
        let purchases = parse_purchases(&rows).unwrap();

        assert_eq!(purchases[0].amount, 10.5);
        assert_eq!(purchases_to_rows(&purchases, &order), rows);
    }

    #[test]
    fn test_changed_amount_is_rendered_fresh() {
        let rows = vec![purchase_row("2024-11-05", "10.50")];
        let order = column_order(&rows);
        let mut purchases = parse_purchases(&rows).unwrap();
        purchases[0].amount = 12.25;

        let written = purchases_to_rows(&purchases, &order);
        assert_eq!(written[0].get("AMOUNT"), Some("12.25"));

        let built = vec![PurchaseRecord::new("230", "P1", purchases[0].date, 7.0)];
        assert_eq!(purchases_to_rows(&built, &order)[0].get("AMOUNT"), Some("7"));
    }

    #[test]
    fn test_event_amount_text_survives_write_back() {
        let rows = vec![RawRow::new()
            .with("USER_CLIENT_NUMBER", "230")
            .with("DATE", "2024-11-05")
            .with("PROPOSITION", "P1")
            .with("AMOUNT", "4.00")];
        let order = column_order(&rows);
        let events = parse_events(&rows).unwrap();

        assert_eq!(events[0].amount, Some(4.0));
        assert_eq!(events_to_rows(&events, &order), rows);
    }
}
