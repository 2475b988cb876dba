//! Versioned feature contracts.
//!
//! A [`FeatureSchema`] is the ordered list of columns a reward model was
//! trained on. The builder fills it, the encoder reads its categorical
//! columns and the predictor refuses any artifact whose feature names differ.
//!
//! Three generations exist:
//!
//! | Version | Columns | Adds |
//! |---------|---------|------|
//! | V1 | 11 | page, device, sales and promotion attributes, day_of_week |
//! | V2 | 14 | PAGE_NAME, PROPOSITION, total_spend_on_product |
//! | V3 | 16 | ARTICLE_CATEGORIE, total_spend_on_category_product |

use aggregator::derived;
use data_loader::columns;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the calendar feature derived from the anchor date
pub const DAY_OF_WEEK: &str = "day_of_week";

/// Whether a column holds a string to encode or a number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    Categorical,
    Numeric,
}

/// Where the value of a column comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnSource {
    /// An entry of the anchor's attribute map, named like the column
    Attribute,
    /// The anchor's proposition id
    Proposition,
    /// The anchor's category (`ARTICLE_CATEGORIE`)
    Category,
    /// Monday = 0 ... Sunday = 6
    DayOfWeek,
    TotalSpendOnProduct,
    TotalSpendOnCategory,
}

/// One slot of a feature contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub name: String,
    pub kind: ColumnKind,
    pub source: ColumnSource,
    /// Used when the anchor lacks the value. `None` makes the column required.
    pub default: Option<DefaultValue>,
}

/// Fill value for absent columns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    Numeric(f64),
    Categorical(String),
}

impl ColumnSpec {
    /// Categorical attribute defaulting to the empty string
    pub fn categorical(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ColumnKind::Categorical,
            source: ColumnSource::Attribute,
            default: Some(DefaultValue::Categorical(String::new())),
        }
    }

    /// Numeric or flag attribute defaulting to 0
    pub fn numeric(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: ColumnKind::Numeric,
            source: ColumnSource::Attribute,
            default: Some(DefaultValue::Numeric(0.0)),
        }
    }

    /// Column computed from the anchor itself, with no default
    pub fn derived(name: &str, kind: ColumnKind, source: ColumnSource) -> Self {
        Self {
            name: name.to_string(),
            kind,
            source,
            default: None,
        }
    }

    pub fn with_source(mut self, source: ColumnSource) -> Self {
        self.source = source;
        self
    }

    pub fn is_required(&self) -> bool {
        self.default.is_none()
    }
}

/// The known generations of the feature contract
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FeatureSchemaVersion {
    V1,
    V2,
    V3,
}

impl FeatureSchemaVersion {
    pub const ALL: [FeatureSchemaVersion; 3] = [Self::V1, Self::V2, Self::V3];

    pub fn latest() -> Self {
        Self::V3
    }
}

impl fmt::Display for FeatureSchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::V1 => "V1",
            Self::V2 => "V2",
            Self::V3 => "V3",
        };
        f.write_str(name)
    }
}

/// An ordered feature contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSchema {
    version: FeatureSchemaVersion,
    columns: Vec<ColumnSpec>,
}

impl FeatureSchema {
    /// The built-in contract for a version
    pub fn for_version(version: FeatureSchemaVersion) -> Self {
        let mut columns = vec![
            ColumnSpec::categorical(columns::PAGE_SECTION),
            ColumnSpec::categorical(columns::DEVICE_INFO_BRAND),
            ColumnSpec::categorical(columns::DEVICE_INFO_TYPE),
            ColumnSpec::categorical(columns::DEVICE_INFO_BROWSER),
            ColumnSpec::categorical(columns::USER_SALES_GROUP),
            ColumnSpec::categorical(columns::USER_SEGMENT),
            ColumnSpec::categorical(columns::USER_SALES_DISTRICT),
            ColumnSpec::categorical(columns::PROMOTION_LABEL),
            ColumnSpec::numeric(columns::PROMOTION_PRICE),
            ColumnSpec::numeric(columns::USER_PROMOTIONS_ALLOWED),
            ColumnSpec::derived(DAY_OF_WEEK, ColumnKind::Numeric, ColumnSource::DayOfWeek),
        ];

        if version >= FeatureSchemaVersion::V2 {
            columns.push(ColumnSpec::categorical(columns::PAGE_NAME));
            columns.push(ColumnSpec::derived(
                columns::PROPOSITION,
                ColumnKind::Categorical,
                ColumnSource::Proposition,
            ));
            columns.push(ColumnSpec::derived(
                derived::TOTAL_SPEND_ON_PRODUCT,
                ColumnKind::Numeric,
                ColumnSource::TotalSpendOnProduct,
            ));
        }

        if version >= FeatureSchemaVersion::V3 {
            columns.push(ColumnSpec::categorical(columns::ARTICLE_CATEGORIE).with_source(ColumnSource::Category));
            columns.push(ColumnSpec::derived(
                derived::TOTAL_SPEND_ON_CATEGORY_PRODUCT,
                ColumnKind::Numeric,
                ColumnSource::TotalSpendOnCategory,
            ));
        }

        Self { version, columns }
    }

    pub fn version(&self) -> FeatureSchemaVersion {
        self.version
    }

    pub fn columns(&self) -> &[ColumnSpec] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Column names in contract order
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    pub fn categorical_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.kind == ColumnKind::Categorical)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Whether `names` is exactly this contract, order included
    pub fn matches_names<S: AsRef<str>>(&self, names: &[S]) -> bool {
        names.len() == self.columns.len()
            && names
                .iter()
                .zip(&self.columns)
                .all(|(name, column)| name.as_ref() == column.name)
    }

    /// Whether this contract needs any spend aggregate
    pub fn needs_spend(&self) -> bool {
        self.columns.iter().any(|c| {
            matches!(
                c.source,
                ColumnSource::TotalSpendOnProduct | ColumnSource::TotalSpendOnCategory
            )
        })
    }
}
