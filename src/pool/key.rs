//! Partition keys.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{QuiverError, Result};

/// Identifier of one index partition.
///
/// Keys compare by exact value. The only validation is that a key is
/// non-empty and free of control characters; trimming or case folding is up
/// to whoever builds the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Validate and wrap a key.
    pub fn new<S: Into<String>>(key: S) -> Result<Self> {
        let key = key.into();
        if key.is_empty() {
            return Err(QuiverError::invalid_key("partition key must not be empty"));
        }
        if key.chars().any(char::is_control) {
            return Err(QuiverError::invalid_key(format!(
                "partition key {key:?} contains control characters"
            )));
        }
        Ok(PartitionKey(key))
    }

    /// The conventional key of the `index`-th partition: `part-00000`, `part-00001`, ...
    pub fn numbered(index: usize) -> Self {
        PartitionKey(format!("part-{index:05}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for PartitionKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for PartitionKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PartitionKey {
    type Error = QuiverError;

    fn try_from(value: String) -> Result<Self> {
        PartitionKey::new(value)
    }
}

impl TryFrom<&str> for PartitionKey {
    type Error = QuiverError;

    fn try_from(value: &str) -> Result<Self> {
        PartitionKey::new(value)
    }
}

impl From<PartitionKey> for String {
    fn from(key: PartitionKey) -> Self {
        key.0
    }
}
