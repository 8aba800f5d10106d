//! TransformSpec and the runtime Shuffle derived from it (§3 Transform,
//! §3 Shuffle). Lambda bodies (update/publish) and register schemas belong
//! to derivation execution, which is out of scope (non-goals, §1); only
//! the shape that drives shuffled reads is modeled here.

use crate::names::{Collection, CompositeKey, PartitionSelector, Transform};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq)]
pub struct TransformSpec {
    pub name: Transform,
    pub source: Collection,
    #[serde(default)]
    pub source_partitions: Option<PartitionSelector>,
    /// Overriding JSON Schema for source documents, if the transform reads
    /// with a schema other than the source collection's own.
    #[serde(default)]
    pub source_schema: Option<serde_json::Value>,
    /// Shuffle key, defaulting to the source collection's key when absent.
    #[serde(default)]
    pub shuffle_key: Option<CompositeKey>,
    #[serde(default)]
    pub read_delay_seconds: i32,
    #[serde(default)]
    pub priority: u32,
}

/// The runtime object derived from a transform (§3 Shuffle), carrying
/// exactly the fields `ReadBuilder::build_reads` needs.
#[derive(Debug, Clone, PartialEq)]
pub struct Shuffle {
    pub source_collection: Collection,
    pub group_name: String,
    pub shuffle_key_ptrs: Vec<String>,
    pub uses_source_key: bool,
    pub read_delay_seconds: i32,
    pub priority: u32,
    pub source_partitions: Option<PartitionSelector>,
    pub source_schema: Option<serde_json::Value>,
}

impl Shuffle {
    /// Derive the runtime Shuffle from a transform belonging to `derivation`.
    pub fn from_transform(derivation: &Collection, transform: &TransformSpec, source_key: &CompositeKey) -> Self {
        let (shuffle_key_ptrs, uses_source_key) = match &transform.shuffle_key {
            Some(key) => (key.iter().map(|p| p.as_str().to_string()).collect(), false),
            None => (
                source_key.iter().map(|p| p.as_str().to_string()).collect(),
                true,
            ),
        };

        Shuffle {
            source_collection: transform.source.clone(),
            group_name: format!("{derivation}/{name}", name = transform.name.as_str()),
            shuffle_key_ptrs,
            uses_source_key,
            read_delay_seconds: transform.read_delay_seconds,
            priority: transform.priority,
            source_partitions: transform.source_partitions.clone(),
            source_schema: transform.source_schema.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::names::JsonPointer;

    #[test]
    fn test_shuffle_defaults_to_source_key() {
        let transform = TransformSpec {
            name: Transform::new("fromOrders"),
            source: Collection::new("acmeCo/orders"),
            source_partitions: None,
            source_schema: None,
            shuffle_key: None,
            read_delay_seconds: 0,
            priority: 0,
        };
        let source_key = CompositeKey::new(vec![JsonPointer::new("/id")]);
        let shuffle = Shuffle::from_transform(&Collection::new("acmeCo/totals"), &transform, &source_key);

        assert!(shuffle.uses_source_key);
        assert_eq!(shuffle.shuffle_key_ptrs, vec!["/id".to_string()]);
        assert_eq!(shuffle.group_name, "acmeCo/totals/fromOrders");
    }

    #[test]
    fn test_shuffle_uses_explicit_key_when_present() {
        let transform = TransformSpec {
            name: Transform::new("fromOrders"),
            source: Collection::new("acmeCo/orders"),
            source_partitions: None,
            source_schema: None,
            shuffle_key: Some(CompositeKey::new(vec![JsonPointer::new("/customerId")])),
            read_delay_seconds: 30,
            priority: 1,
        };
        let source_key = CompositeKey::new(vec![JsonPointer::new("/id")]);
        let shuffle = Shuffle::from_transform(&Collection::new("acmeCo/totals"), &transform, &source_key);

        assert!(!shuffle.uses_source_key);
        assert_eq!(shuffle.shuffle_key_ptrs, vec!["/customerId".to_string()]);
        assert_eq!(shuffle.read_delay_seconds, 30);
    }
}
