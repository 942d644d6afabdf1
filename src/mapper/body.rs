//! Flat JSON request body.

use super::FieldStore;
use std::collections::BTreeMap;

/// Flat string-to-string JSON object. Serializes with sorted keys.
pub type BodyMap = BTreeMap<String, String>;

/// Why a body could not be used for mapping.
#[derive(Debug, thiserror::Error)]
pub enum BodyUndecodable {
    #[error("body is empty")]
    Empty,

    #[error("body is not a flat JSON string map: {0}")]
    Json(#[from] serde_json::Error),
}

/// Decode a request body as a flat JSON object of string values.
///
/// Nested objects, arrays, numbers, booleans and nulls are all rejected, so
/// the caller falls back to passing the original bytes through.
pub fn decode_body(bytes: &[u8]) -> Result<BodyMap, BodyUndecodable> {
    if bytes.is_empty() {
        return Err(BodyUndecodable::Empty);
    }
    Ok(serde_json::from_slice(bytes)?)
}

/// Any present key is a rule source, including keys holding `""`.
/// Absent keys are skipped rather than materialized as empty strings.
impl FieldStore for BodyMap {
    type Value = String;

    fn source_value(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }

    fn write(&mut self, key: &str, value: String) {
        self.insert(key.to_string(), value);
    }

    fn remove(&mut self, key: &str) {
        BTreeMap::remove(self, key);
    }
}
