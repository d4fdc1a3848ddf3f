//! Record validation: JSON Schema conformance plus the cross-field rules a
//! schema cannot express cleanly.
//!
//! Validation never fails fast and never returns `Err` for a bad record. Every
//! violation is reported as a human-readable string so batch tooling can show
//! all problems in a file at once.

use crate::error::{ReviewError, Result};
use crate::schema::ReviewRecord;
use crate::scoring::TOXICITY_TAU;
use crate::text::{MAX_REVIEW_WORDS, MIN_REVIEW_WORDS};
use log::debug;
use serde_json::Value;
use std::fmt;
use std::path::Path;

const FULL20_SCHEMA: &str = include_str!("../schema/full-20.json");

/// A compiled record schema.
pub struct RecordSchema {
    validator: jsonschema::Validator,
    raw: Value,
}

impl RecordSchema {
    /// The built-in FULL-20 layout.
    pub fn full20() -> Result<Self> {
        let raw: Value = serde_json::from_str(FULL20_SCHEMA)?;
        Self::from_value(raw)
    }

    pub fn from_value(raw: Value) -> Result<Self> {
        let validator =
            jsonschema::validator_for(&raw).map_err(|e| ReviewError::Schema(e.to_string()))?;
        Ok(Self { validator, raw })
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!("Loading record schema from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Self::from_value(serde_json::from_str(&text)?)
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Keys listed under the top-level `required`, in schema order.
    pub fn required_keys(&self) -> Vec<&str> {
        self.raw
            .get("required")
            .and_then(Value::as_array)
            .map(|keys| keys.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    fn schema_errors(&self, record: &Value) -> Vec<String> {
        self.validator
            .iter_errors(record)
            .map(|error| {
                let path = error.instance_path.to_string();
                let path = if path.is_empty() { "(root)".to_string() } else { path };
                format!("schema: {}: {}", path, error)
            })
            .collect()
    }
}

impl fmt::Debug for RecordSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordSchema")
            .field("title", &self.raw.get("title"))
            .finish()
    }
}

/// Validates one decoded line against `schema` and the business rules.
/// An empty result means the record is valid.
pub fn validate_record(record: &Value, schema: &RecordSchema) -> Vec<String> {
    let mut errors = schema.schema_errors(record);
    errors.extend(check_business_rules(record));
    errors
}

/// Rules evaluated independently of the schema result:
/// the tau5 flag must agree with an integer toxicity score, and a non-empty
/// review must carry a word count inside the review window.
pub fn check_business_rules(record: &Value) -> Vec<String> {
    let mut errors = Vec::new();

    if let Some(toxicity) = record.get("toxicity_1to7").and_then(Value::as_i64) {
        let expected = toxicity >= TOXICITY_TAU as i64;
        let flag = record.get("toxicity_flag_tau5").and_then(Value::as_bool);
        if flag != Some(expected) {
            let shown = flag.map_or_else(|| "missing".to_string(), |f| f.to_string());
            errors.push(format!(
                "rule: toxicity_flag_tau5 mismatch (toxicity_1to7={}, flag={}, expected {})",
                toxicity, shown, expected
            ));
        }
    }

    let has_review = record
        .get("review_text")
        .and_then(Value::as_str)
        .map(|text| !text.trim().is_empty())
        .unwrap_or(false);
    if has_review {
        let word_count = record.get("word_count").and_then(Value::as_i64);
        let in_window = word_count
            .map(|wc| (MIN_REVIEW_WORDS as i64..=MAX_REVIEW_WORDS as i64).contains(&wc))
            .unwrap_or(false);
        if !in_window {
            let shown = record
                .get("word_count")
                .map_or_else(|| "missing".to_string(), Value::to_string);
            errors.push(format!(
                "rule: word_count {} not in [{}, {}] for non-empty review_text",
                shown, MIN_REVIEW_WORDS, MAX_REVIEW_WORDS
            ));
        }
    }

    errors
}

impl ReviewRecord {
    pub fn validate(&self, schema: &RecordSchema) -> Vec<String> {
        match self.to_value() {
            Ok(value) => validate_record(&value, schema),
            Err(e) => vec![format!("serialization: {}", e)],
        }
    }
}
