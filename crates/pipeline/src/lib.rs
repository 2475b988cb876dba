//! Feature pipeline for reward scoring.
//!
//! This crate provides:
//! - Versioned feature contracts (`FeatureSchema`) shared with the predictor
//! - `FeatureVectorBuilder` for turning an anchor event and its aggregates
//!   into one ordered feature row
//! - `CategoryEncoding` for stable categorical codes, persisted per model
//! - `FeatureMatrix` for the dense rows the predictor consumes
//!
//! ## Architecture
//! Rows move through the pipeline in stages:
//! 1. The builder fills every schema slot (attributes, calendar, spend)
//! 2. The encoder replaces categorical values with integer codes
//! 3. The matrix checks nothing is left unencoded and flattens to `f64`
//!
//! ## Example Usage
//! ```ignore
//! use pipeline::{FeatureSchema, FeatureSchemaVersion, FeatureVectorBuilder, CategoryEncoding, FeatureMatrix};
//!
//! let schema = FeatureSchema::for_version(FeatureSchemaVersion::V3);
//! let builder = FeatureVectorBuilder::new(&schema);
//! let vector = builder.build(&event, &aggregates)?;
//!
//! let encoding = CategoryEncoding::load(model_dir, "2024-11")?;
//! let encoded = encoding.apply(&vector, UnknownValuePolicy::Reject)?;
//! let matrix = FeatureMatrix::from_vectors(&schema, &[encoded])?;
//! ```

pub mod error;
pub mod schema;
pub mod features;
pub mod encoder;
pub mod matrix;

// Re-export main types
pub use encoder::{CategoryDecoding, CategoryEncoding, ColumnCodes, UnknownValuePolicy, UNKNOWN_CODE};
pub use error::{FeatureError, Result};
pub use features::{day_of_week, AnchorAggregates, FeatureValue, FeatureVector, FeatureVectorBuilder};
pub use matrix::FeatureMatrix;
pub use schema::{
    ColumnKind, ColumnSource, ColumnSpec, DefaultValue, FeatureSchema, FeatureSchemaVersion, DAY_OF_WEEK,
};
