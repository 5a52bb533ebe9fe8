//! Documents handed to index writers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{QuiverError, Result};

/// A document: field names mapped to JSON values, kept in name order.
///
/// Serializes as a plain JSON object, so a JSON-lines input file
/// deserializes into documents line by line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    fields: BTreeMap<String, Value>,
}

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field insertion.
    pub fn with_field<S: Into<String>, V: Into<Value>>(mut self, name: S, value: V) -> Self {
        self.add_field(name, value);
        self
    }

    /// Insert or overwrite a field.
    pub fn add_field<S: Into<String>, V: Into<Value>>(&mut self, name: S, value: V) {
        self.fields.insert(name.into(), value.into());
    }

    /// Get a field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Get a field rendered as text: strings as-is, other values as JSON.
    pub fn get_text(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
    }

    /// Iterate over fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Parse one JSON object into a document.
    pub fn from_json_str(line: &str) -> Result<Self> {
        match serde_json::from_str::<Value>(line)? {
            Value::Object(map) => Ok(Document {
                fields: map.into_iter().collect(),
            }),
            other => Err(QuiverError::other(format!(
                "Expected a JSON object per document, got: {other}"
            ))),
        }
    }
}
