//! Dense numeric matrix handed to the predictor.

use crate::error::{FeatureError, Result};
use crate::features::{FeatureValue, FeatureVector};
use crate::schema::FeatureSchema;

/// Row-major feature matrix with named columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMatrix {
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    /// Assemble encoded vectors in schema column order.
    ///
    /// Vectors are conformed to the schema first; a categorical value that
    /// was never encoded is rejected.
    pub fn from_vectors(schema: &FeatureSchema, vectors: &[FeatureVector]) -> Result<Self> {
        let columns: Vec<String> = schema.column_names().into_iter().map(str::to_string).collect();
        let mut rows = Vec::with_capacity(vectors.len());

        for vector in vectors {
            let conformed = vector.clone().conform(schema)?;
            let row = conformed
                .iter()
                .map(|(column, value)| match value {
                    FeatureValue::Numeric(x) => Ok(*x),
                    FeatureValue::Code(code) => Ok(*code as f64),
                    FeatureValue::Categorical(_) => Err(FeatureError::UnencodedColumn {
                        column: column.to_string(),
                    }),
                })
                .collect::<Result<Vec<f64>>>()?;
            rows.push(row);
        }

        Ok(Self { columns, rows })
    }

    /// Wrap raw rows; every row must be as wide as `columns`
    pub fn from_rows(columns: Vec<String>, rows: Vec<Vec<f64>>) -> Option<Self> {
        rows.iter()
            .all(|row| row.len() == columns.len())
            .then_some(Self { columns, rows })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
