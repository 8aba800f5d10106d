//! Project-wide, type-safe wrappers around Flow catalog names.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Collection names consist of Unicode letters, numbers, and symbols: - _ . /
#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Collection(String);

impl Collection {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for Collection {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transform names a single transform of a derivation.
#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Transform(String);

impl Transform {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for Transform {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

/// A JSON Pointer identifying a location within a document, per RFC 6901.
#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JsonPointer(String);

impl JsonPointer {
    pub fn new(ptr: impl Into<String>) -> Self {
        Self(ptr.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::ops::Deref for JsonPointer {
    type Target = str;

    fn deref(&self) -> &str {
        &self.0
    }
}

/// A composite key: an ordered, non-empty list of document locations.
#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq, Eq)]
#[serde(transparent)]
pub struct CompositeKey(Vec<JsonPointer>);

impl CompositeKey {
    pub fn new(ptrs: Vec<JsonPointer>) -> Self {
        Self(ptrs)
    }

    pub fn iter(&self) -> impl Iterator<Item = &JsonPointer> {
        self.0.iter()
    }
}

impl std::ops::Deref for CompositeKey {
    type Target = [JsonPointer];

    fn deref(&self) -> &[JsonPointer] {
        &self.0
    }
}

/// Matches documents of a source collection against partition field values,
/// per §3's "optional source partition selector".
#[derive(Serialize, Deserialize, Debug, Clone, Default, JsonSchema, PartialEq)]
pub struct PartitionSelector {
    #[serde(default)]
    pub include: std::collections::BTreeMap<String, Vec<serde_json::Value>>,
    #[serde(default)]
    pub exclude: std::collections::BTreeMap<String, Vec<serde_json::Value>>,
}

impl PartitionSelector {
    /// True if `partitions` (field name -> value, in the collection's
    /// partition field order) passes this selector.
    pub fn matches(&self, partitions: &[(&str, &serde_json::Value)]) -> bool {
        for (field, values) in &self.include {
            let found = partitions
                .iter()
                .any(|(f, v)| f == field && values.contains(v));
            if !found {
                return false;
            }
        }
        for (field, values) in &self.exclude {
            let excluded = partitions
                .iter()
                .any(|(f, v)| f == field && values.contains(v));
            if excluded {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_partition_selector_include_and_exclude() {
        let selector = PartitionSelector {
            include: [("region".to_string(), vec![json!("eu"), json!("us")])].into(),
            exclude: [("tier".to_string(), vec![json!("internal")])].into(),
        };

        assert!(selector.matches(&[(
            "region",
            &json!("eu")
        ), ("tier", &json!("external"))]));
        assert!(!selector.matches(&[("region", &json!("apac"))]));
        assert!(!selector.matches(&[("region", &json!("eu")), ("tier", &json!("internal"))]));
    }

    #[test]
    fn test_empty_selector_matches_everything() {
        let selector = PartitionSelector::default();
        assert!(selector.matches(&[("region", &json!("eu"))]));
        assert!(selector.matches(&[]));
    }
}
