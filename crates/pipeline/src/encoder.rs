//! Stable integer codes for categorical feature values.
//!
//! ## Algorithm
//! 1. `build` scans the vectors once per column and gives each new value the
//!    next code, so codes follow first-seen order (not alphabetical)
//! 2. `apply` swaps every covered categorical value for its code
//! 3. `invert` produces a decoding that maps codes back to values
//!
//! An encoding is tied to the model it was built for. It is persisted next
//! to the model as `category_encoding_<model_version>.json` and loaded, not
//! rebuilt, at scoring time.

use crate::error::{FeatureError, Result};
use crate::features::{FeatureValue, FeatureVector};
use crate::schema::FeatureSchema;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Code given to unseen values under [`UnknownValuePolicy::Reserved`].
/// Never assigned to a real value.
pub const UNKNOWN_CODE: i64 = -1;

/// What `apply` does with a value the encoding has never seen
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownValuePolicy {
    /// Fail with [`FeatureError::UnknownCategory`]
    #[default]
    Reject,
    /// Map to [`UNKNOWN_CODE`]
    Reserved,
}

/// Codes of one column. Serialises as the value list, index = code.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct ColumnCodes {
    values: Vec<String>,
    codes: HashMap<String, i64>,
}

impl ColumnCodes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Code of `value`, assigning the next one if it is new
    pub fn insert(&mut self, value: &str) -> i64 {
        if let Some(code) = self.codes.get(value) {
            return *code;
        }
        let code = self.values.len() as i64;
        self.values.push(value.to_string());
        self.codes.insert(value.to_string(), code);
        code
    }

    pub fn code_of(&self, value: &str) -> Option<i64> {
        self.codes.get(value).copied()
    }

    pub fn value_of(&self, code: i64) -> Option<&str> {
        usize::try_from(code)
            .ok()
            .and_then(|idx| self.values.get(idx))
            .map(String::as_str)
    }

    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Index in the list is the code, so a repeated value is rejected
impl TryFrom<Vec<String>> for ColumnCodes {
    type Error = FeatureError;

    fn try_from(values: Vec<String>) -> Result<Self> {
        let mut codes = ColumnCodes::new();
        for value in &values {
            if codes.code_of(value).is_some() {
                return Err(FeatureError::DuplicateCategory { value: value.clone() });
            }
            codes.insert(value);
        }
        Ok(codes)
    }
}

impl From<ColumnCodes> for Vec<String> {
    fn from(codes: ColumnCodes) -> Self {
        codes.values
    }
}

/// Per-column value to code mapping for one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryEncoding {
    model_version: String,
    columns: BTreeMap<String, ColumnCodes>,
}

impl CategoryEncoding {
    /// Scan `vectors` once per column and assign first-seen codes.
    ///
    /// Every vector must carry every listed column as a categorical value.
    pub fn build(model_version: impl Into<String>, vectors: &[FeatureVector], columns: &[&str]) -> Result<Self> {
        let mut encoded = BTreeMap::new();
        for column in columns {
            let mut codes = ColumnCodes::new();
            for vector in vectors {
                match vector.get(column) {
                    Some(FeatureValue::Categorical(value)) => {
                        codes.insert(value);
                    }
                    Some(_) => {
                        debug!("Column {} already holds a non-categorical value, skipped", column);
                    }
                    None => {
                        return Err(FeatureError::MissingColumn {
                            column: column.to_string(),
                        });
                    }
                }
            }
            encoded.insert(column.to_string(), codes);
        }

        let encoding = Self {
            model_version: model_version.into(),
            columns: encoded,
        };
        debug!(
            "Built category encoding for model {} over {} columns",
            encoding.model_version,
            encoding.columns.len()
        );
        Ok(encoding)
    }

    /// [`CategoryEncoding::build`] over every categorical column of `schema`
    pub fn build_for_schema(
        model_version: impl Into<String>,
        schema: &FeatureSchema,
        vectors: &[FeatureVector],
    ) -> Result<Self> {
        Self::build(model_version, vectors, &schema.categorical_columns())
    }

    pub fn model_version(&self) -> &str {
        &self.model_version
    }

    pub fn column(&self, name: &str) -> Option<&ColumnCodes> {
        self.columns.get(name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    /// Code of one value under `policy`
    pub fn encode_value(&self, column: &str, value: &str, policy: UnknownValuePolicy) -> Result<i64> {
        let known = self.columns.get(column).and_then(|codes| codes.code_of(value));
        match (known, policy) {
            (Some(code), _) => Ok(code),
            (None, UnknownValuePolicy::Reserved) => Ok(UNKNOWN_CODE),
            (None, UnknownValuePolicy::Reject) => Err(FeatureError::UnknownCategory {
                column: column.to_string(),
                value: value.to_string(),
            }),
        }
    }

    /// Replace covered categorical values with their codes.
    ///
    /// Columns the encoding does not cover are left as they are.
    pub fn apply(&self, vector: &FeatureVector, policy: UnknownValuePolicy) -> Result<FeatureVector> {
        let mut encoded = FeatureVector::new();
        for (column, value) in vector.iter() {
            let value = match value {
                FeatureValue::Categorical(raw) if self.columns.contains_key(column) => {
                    FeatureValue::Code(self.encode_value(column, raw, policy)?)
                }
                other => other.clone(),
            };
            encoded.set(column, value);
        }
        Ok(encoded)
    }

    /// [`CategoryEncoding::apply`] over many vectors, keeping input order
    pub fn apply_all(&self, vectors: &[FeatureVector], policy: UnknownValuePolicy) -> Result<Vec<FeatureVector>> {
        vectors
            .par_iter()
            .map(|vector| self.apply(vector, policy))
            .collect()
    }

    pub fn invert(&self) -> CategoryDecoding {
        CategoryDecoding {
            columns: self
                .columns
                .iter()
                .map(|(column, codes)| (column.clone(), codes.values().to_vec()))
                .collect(),
        }
    }

    /// Path of the persisted encoding for `model_version` inside `dir`.
    ///
    /// The version must be a plain file name component.
    pub fn file_path(dir: &Path, model_version: &str) -> Result<PathBuf> {
        let plain = !model_version.is_empty()
            && !model_version.contains("..")
            && !model_version.chars().any(|c| c == '/' || c == '\\' || c == '\0');
        if !plain {
            return Err(FeatureError::InvalidModelVersion {
                version: model_version.to_string(),
            });
        }
        Ok(dir.join(format!("category_encoding_{}.json", model_version)))
    }

    /// Write the encoding to `dir`, replacing any previous file atomically
    pub fn save(&self, dir: &Path) -> Result<PathBuf> {
        let path = Self::file_path(dir, &self.model_version)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = BufWriter::new(tmp.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, self)?;
            writer.flush()?;
        }
        tmp.persist(&path).map_err(|e| e.error)?;

        info!("Saved category encoding to {}", path.display());
        Ok(path)
    }

    /// Load the encoding persisted for `model_version`
    pub fn load(dir: &Path, model_version: &str) -> Result<Self> {
        let path = Self::file_path(dir, model_version)?;
        let file = File::open(&path)?;
        let encoding: CategoryEncoding = serde_json::from_reader(BufReader::new(file))?;

        if encoding.model_version != model_version {
            return Err(FeatureError::ModelVersionMismatch {
                expected: model_version.to_string(),
                found: encoding.model_version,
            });
        }

        debug!("Loaded category encoding from {}", path.display());
        Ok(encoding)
    }
}

/// Code to value mapping, the inverse of a [`CategoryEncoding`].
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryDecoding {
    columns: BTreeMap<String, Vec<String>>,
}

impl CategoryDecoding {
    pub fn decode_value(&self, column: &str, code: i64) -> Result<&str> {
        self.columns
            .get(column)
            .and_then(|values| usize::try_from(code).ok().and_then(|idx| values.get(idx)))
            .map(String::as_str)
            .ok_or_else(|| FeatureError::UnknownCode {
                column: column.to_string(),
                code,
            })
    }

    /// Replace codes in covered columns with their values
    pub fn decode(&self, vector: &FeatureVector) -> Result<FeatureVector> {
        let mut decoded = FeatureVector::new();
        for (column, value) in vector.iter() {
            let value = match value {
                FeatureValue::Code(code) if self.columns.contains_key(column) => {
                    FeatureValue::Categorical(self.decode_value(column, *code)?.to_string())
                }
                other => other.clone(),
            };
            decoded.set(column, value);
        }
        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn vector(section: &str, brand: &str) -> FeatureVector {
        FeatureVector::new()
            .with("PAGE_SECTION", FeatureValue::Categorical(section.into()))
            .with("DEVICE_INFO_BRAND", FeatureValue::Categorical(brand.into()))
            .with("PROMOTION_PRICE", FeatureValue::Numeric(3.0))
    }

    fn sample() -> Vec<FeatureVector> {
        vec![
            vector("search", "Samsung"),
            vector("catalog", "Apple"),
            vector("search", "Apple"),
            vector("home", "Samsung"),
        ]
    }

    fn encoding() -> CategoryEncoding {
        CategoryEncoding::build("m-1", &sample(), &["PAGE_SECTION", "DEVICE_INFO_BRAND"]).unwrap()
    }

    #[test]
    fn test_codes_follow_first_seen_order() {
        let encoding = encoding();
        let sections = encoding.column("PAGE_SECTION").unwrap();

        assert_eq!(sections.values(), &["search", "catalog", "home"]);
        assert_eq!(sections.code_of("search"), Some(0));
        assert_eq!(sections.code_of("home"), Some(2));
    }

    #[test]
    fn test_apply_leaves_numeric_columns() {
        let encoded = encoding().apply(&sample()[1], UnknownValuePolicy::Reject).unwrap();

        assert_eq!(encoded.get("PAGE_SECTION"), Some(&FeatureValue::Code(1)));
        assert_eq!(encoded.get("DEVICE_INFO_BRAND"), Some(&FeatureValue::Code(1)));
        assert_eq!(encoded.get("PROMOTION_PRICE"), Some(&FeatureValue::Numeric(3.0)));
    }

    #[test]
    fn test_invert_after_apply_is_identity() {
        let encoding = encoding();
        let decoding = encoding.invert();

        for original in sample() {
            let encoded = encoding.apply(&original, UnknownValuePolicy::Reject).unwrap();
            assert_eq!(decoding.decode(&encoded).unwrap(), original);
        }
    }

    #[test]
    fn test_unseen_value_rejected_by_default() {
        let result = encoding().apply(&vector("checkout", "Apple"), UnknownValuePolicy::default());

        assert!(matches!(
            result,
            Err(FeatureError::UnknownCategory { ref column, ref value })
                if column == "PAGE_SECTION" && value == "checkout"
        ));
    }

    #[test]
    fn test_unseen_value_reserved_code() {
        let encoding = encoding();
        let encoded = encoding
            .apply(&vector("checkout", "Apple"), UnknownValuePolicy::Reserved)
            .unwrap();

        assert_eq!(encoded.get("PAGE_SECTION"), Some(&FeatureValue::Code(UNKNOWN_CODE)));
        assert!(matches!(
            encoding.invert().decode(&encoded),
            Err(FeatureError::UnknownCode { code: UNKNOWN_CODE, .. })
        ));
    }

    #[test]
    fn test_build_requires_columns() {
        let result = CategoryEncoding::build("m-1", &sample(), &["USER_SEGMENT"]);
        assert!(matches!(result, Err(FeatureError::MissingColumn { .. })));
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let encoding = encoding();

        let path = encoding.save(dir.path()).unwrap();
        assert!(path.ends_with("category_encoding_m-1.json"));

        let loaded = CategoryEncoding::load(dir.path(), "m-1").unwrap();
        assert_eq!(loaded, encoding);
        assert_eq!(loaded.column("DEVICE_INFO_BRAND").unwrap().code_of("Apple"), Some(1));
    }

    #[test]
    fn test_load_rejects_other_model() {
        let dir = tempdir().unwrap();
        let path = encoding().save(dir.path()).unwrap();
        std::fs::rename(&path, CategoryEncoding::file_path(dir.path(), "m-2").unwrap()).unwrap();

        let result = CategoryEncoding::load(dir.path(), "m-2");
        assert!(matches!(
            result,
            Err(FeatureError::ModelVersionMismatch { ref found, .. }) if found == "m-1"
        ));
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            CategoryEncoding::load(dir.path(), "absent"),
            Err(FeatureError::Io(_))
        ));
    }

    #[test]
    fn test_load_rejects_repeated_value() {
        let dir = tempdir().unwrap();
        let raw = r#"{"model_version": "m-1", "columns": {"PAGE_SECTION": ["home", "home", "search"]}}"#;
        std::fs::write(CategoryEncoding::file_path(dir.path(), "m-1").unwrap(), raw).unwrap();

        let err = CategoryEncoding::load(dir.path(), "m-1").unwrap_err();
        assert!(err.to_string().contains("home"));
    }

    #[test]
    fn test_persisted_codes_keep_list_positions() {
        let codes: ColumnCodes = serde_json::from_str(r#"["home", "search", "catalog"]"#).unwrap();
        assert_eq!(codes.code_of("catalog"), Some(2));

        let repeated = serde_json::from_str::<ColumnCodes>(r#"["home", "home", "search"]"#);
        assert!(repeated.is_err());
    }

    #[test]
    fn test_model_version_must_be_plain_name() {
        let dir = tempdir().unwrap();
        for version in ["../escape", "a/b", "a\\b", "", ".."] {
            assert!(matches!(
                CategoryEncoding::file_path(dir.path(), version),
                Err(FeatureError::InvalidModelVersion { .. })
            ));
        }
        assert!(CategoryEncoding::file_path(dir.path(), "2024-11.v2").is_ok());

        let mut encoding = encoding();
        encoding.model_version = "../m".into();
        assert!(encoding.save(dir.path()).is_err());
    }
}
