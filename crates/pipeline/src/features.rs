//! Feature vector construction for reward scoring.
//!
//! One vector is built per anchor event. Its slots and their order come
//! from the active [`FeatureSchema`]; values come from the anchor's
//! attribute map, the anchor itself (proposition, category, date) and the
//! spend aggregates computed by the aggregator crate.

use crate::error::{FeatureError, Result};
use crate::schema::{ColumnKind, ColumnSource, ColumnSpec, DefaultValue, FeatureSchema};
use aggregator::{CategoryIndex, CategoryMissPolicy, EventOutcomes};
use chrono::{Datelike, NaiveDate};
use data_loader::{EventRecord, PurchaseRecord};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A single slot value.
///
/// `Code` only appears after a vector went through the category encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureValue {
    Numeric(f64),
    Categorical(String),
    Code(i64),
}

impl FeatureValue {
    pub fn as_categorical(&self) -> Option<&str> {
        match self {
            FeatureValue::Categorical(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            FeatureValue::Numeric(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<&DefaultValue> for FeatureValue {
    fn from(default: &DefaultValue) -> Self {
        match default {
            DefaultValue::Numeric(value) => FeatureValue::Numeric(*value),
            DefaultValue::Categorical(value) => FeatureValue::Categorical(value.clone()),
        }
    }
}

/// Ordered (column, value) pairs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    entries: Vec<(String, FeatureValue)>,
}

impl FeatureVector {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Set a slot, replacing an existing value in place
    pub fn set(&mut self, column: impl Into<String>, value: FeatureValue) {
        let column = column.into();
        match self.entries.iter_mut().find(|(name, _)| *name == column) {
            Some(slot) => slot.1 = value,
            None => self.entries.push((column, value)),
        }
    }

    pub fn with(mut self, column: impl Into<String>, value: FeatureValue) -> Self {
        self.set(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&FeatureValue> {
        self.entries
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FeatureValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Reconcile this vector with a contract.
    ///
    /// The result has exactly the schema's columns in schema order. Extra
    /// keys are dropped, absent columns take their default, and an absent
    /// column without one is rejected. Numeric slots holding text are
    /// parsed like raw attributes.
    pub fn conform(self, schema: &FeatureSchema) -> Result<FeatureVector> {
        let mut entries = Vec::with_capacity(schema.len());
        for spec in schema.columns() {
            let value = match self.get(&spec.name) {
                Some(FeatureValue::Categorical(raw)) if spec.kind == ColumnKind::Numeric => {
                    FeatureValue::Numeric(parse_numeric(spec, raw)?)
                }
                Some(value) => value.clone(),
                None => default_for(spec)?,
            };
            entries.push((spec.name.clone(), value));
        }

        let dropped = self.len().saturating_sub(
            self.names().filter(|name| schema.column(name).is_some()).count(),
        );
        if dropped > 0 {
            debug!("Dropped {} columns outside schema {}", dropped, schema.version());
        }

        Ok(FeatureVector { entries })
    }
}

/// Spend aggregates of one anchor. `None` means "not computed".
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AnchorAggregates {
    pub total_spend_on_product: Option<f64>,
    pub total_spend_on_category_product: Option<f64>,
}

impl AnchorAggregates {
    pub fn new(product: f64, category: f64) -> Self {
        Self {
            total_spend_on_product: Some(product),
            total_spend_on_category_product: Some(category),
        }
    }

    /// Spend of the anchor's user up to the anchor date
    pub fn compute(
        purchases: &[PurchaseRecord],
        categories: &CategoryIndex,
        anchor: &EventRecord,
        policy: CategoryMissPolicy,
    ) -> aggregator::Result<Self> {
        let product = aggregator::total_spend_on_product(
            purchases,
            &anchor.user_id,
            &anchor.proposition_id,
            anchor.date,
        );
        let category = aggregator::total_spend_on_category_of(
            purchases,
            categories,
            &anchor.proposition_id,
            anchor.category.as_deref(),
            anchor.date,
            policy,
        )?;
        Ok(Self::new(product, category))
    }
}

impl From<&EventOutcomes> for AnchorAggregates {
    fn from(outcomes: &EventOutcomes) -> Self {
        Self {
            total_spend_on_product: outcomes.total_spend_on_product,
            total_spend_on_category_product: outcomes.total_spend_on_category_product,
        }
    }
}

/// Monday = 0 ... Sunday = 6
pub fn day_of_week(date: NaiveDate) -> u32 {
    date.weekday().num_days_from_monday()
}

/// Builds feature vectors for one schema.
#[derive(Debug, Clone, Copy)]
pub struct FeatureVectorBuilder<'s> {
    schema: &'s FeatureSchema,
}

impl<'s> FeatureVectorBuilder<'s> {
    pub fn new(schema: &'s FeatureSchema) -> Self {
        Self { schema }
    }

    pub fn schema(&self) -> &FeatureSchema {
        self.schema
    }

    /// Build the vector of one anchor event
    pub fn build(&self, anchor: &EventRecord, aggregates: &AnchorAggregates) -> Result<FeatureVector> {
        let mut entries = Vec::with_capacity(self.schema.len());
        for spec in self.schema.columns() {
            entries.push((spec.name.clone(), self.value_of(spec, anchor, aggregates)?));
        }
        Ok(FeatureVector { entries })
    }

    /// Build vectors for many anchors in parallel, keeping input order
    pub fn build_all(&self, anchors: &[(&EventRecord, AnchorAggregates)]) -> Result<Vec<FeatureVector>> {
        anchors
            .par_iter()
            .map(|(anchor, aggregates)| self.build(anchor, aggregates))
            .collect()
    }

    fn value_of(&self, spec: &ColumnSpec, anchor: &EventRecord, aggregates: &AnchorAggregates) -> Result<FeatureValue> {
        match spec.source {
            ColumnSource::Attribute => text_value(spec, anchor.attribute(&spec.name)),
            ColumnSource::Proposition => text_value(spec, Some(anchor.proposition_id.as_str())),
            ColumnSource::Category => text_value(
                spec,
                anchor.category.as_deref().or_else(|| anchor.attribute(&spec.name)),
            ),
            ColumnSource::DayOfWeek => Ok(FeatureValue::Numeric(day_of_week(anchor.date) as f64)),
            ColumnSource::TotalSpendOnProduct => number_value(spec, aggregates.total_spend_on_product),
            ColumnSource::TotalSpendOnCategory => number_value(spec, aggregates.total_spend_on_category_product),
        }
    }
}

fn text_value(spec: &ColumnSpec, raw: Option<&str>) -> Result<FeatureValue> {
    match (spec.kind, raw) {
        (_, None) => default_for(spec),
        (ColumnKind::Categorical, Some(value)) => Ok(FeatureValue::Categorical(value.to_string())),
        (ColumnKind::Numeric, Some(value)) => Ok(FeatureValue::Numeric(parse_numeric(spec, value)?)),
    }
}

fn number_value(spec: &ColumnSpec, value: Option<f64>) -> Result<FeatureValue> {
    match value {
        Some(value) => Ok(FeatureValue::Numeric(value)),
        None => default_for(spec),
    }
}

fn default_for(spec: &ColumnSpec) -> Result<FeatureValue> {
    spec.default
        .as_ref()
        .map(FeatureValue::from)
        .ok_or_else(|| FeatureError::MissingColumn {
            column: spec.name.clone(),
        })
}

/// Decimal numbers, `true`/`false` flags (any case) and blanks.
fn parse_numeric(spec: &ColumnSpec, raw: &str) -> Result<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return match default_for(spec)? {
            FeatureValue::Numeric(value) => Ok(value),
            _ => Ok(0.0),
        };
    }
    if trimmed.eq_ignore_ascii_case("true") {
        return Ok(1.0);
    }
    if trimmed.eq_ignore_ascii_case("false") {
        return Ok(0.0);
    }

    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(value),
        _ => Err(FeatureError::InvalidNumeric {
            column: spec.name.clone(),
            value: raw.to_string(),
        }),
    }
}
