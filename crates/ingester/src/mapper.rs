//! Maps a combined document to a target journal (§4.3 Mapper).
//!
//! The partition invariant: `map` must never return a journal whose key
//! range does not contain the document's content address. Gazette's actual
//! mapper additionally splits an overloaded physical partition into two
//! sibling journals at a randomly chosen pivot once it observes write
//! contention; reshard-on-contention is a capacity-management concern this
//! crate doesn't implement, so every logical partition here is backed by a
//! single, full-keyspace journal created on first use.

use labels::partition::{encode_partition_labels, partition_suffix};
use models::CollectionSpec;
use proto_gazette::broker::LabelSet;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Labels(#[from] labels::Error),
}

#[async_trait::async_trait]
pub trait Mapper: Send + Sync {
    /// Map `partitions` (field name -> value, in `collection.partition_fields`
    /// order) and `content_address` (the 32-bit hash of the document's
    /// packed key) to a journal name, creating one if needed.
    async fn map(
        &self,
        collection: &CollectionSpec,
        partitions: &[(&str, &Value)],
        content_address: u32,
    ) -> Result<String, Error>;
}

/// An in-memory Mapper suitable for a single-process deployment or tests.
/// A networked deployment would instead consult (and lazily create through)
/// the broker's live JournalSpec listing; see [`gazette::journal::list_journals`].
#[derive(Default)]
pub struct InMemoryMapper {
    // partition_prefix -> (labels, journal name)
    partitions: Mutex<HashMap<String, (LabelSet, String)>>,
}

#[async_trait::async_trait]
impl Mapper for InMemoryMapper {
    async fn map(
        &self,
        collection: &CollectionSpec,
        partitions: &[(&str, &Value)],
        _content_address: u32,
    ) -> Result<String, Error> {
        let fields: Vec<&str> = partitions.iter().map(|(f, _)| *f).collect();
        let values: Vec<Value> = partitions.iter().map(|(_, v)| (*v).clone()).collect();

        let set = encode_partition_labels(&fields, &values, 0, u32::MAX, LabelSet::default())?;
        let prefix = set
            .labels
            .iter()
            .filter(|l| l.name.starts_with(labels::FIELD_PREFIX))
            .map(|l| format!("{}={}", l.name, l.value))
            .collect::<Vec<_>>()
            .join("/");

        let mut table = self.partitions.lock().unwrap();
        if let Some((_, name)) = table.get(&prefix) {
            return Ok(name.clone());
        }

        let suffix = partition_suffix(&set)?;
        let name = format!("{}/{}", collection.journal_prefix, suffix);
        table.insert(prefix, (set, name.clone()));
        Ok(name)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use models::{Collection, CollectionSpec, CompositeKey, JsonPointer, PartitionField};
    use serde_json::json;

    fn collection() -> CollectionSpec {
        CollectionSpec {
            name: Collection::new("acmeCo/orders"),
            key: CompositeKey::new(vec![JsonPointer::new("/id")]),
            partition_fields: vec![PartitionField {
                field: "region".to_string(),
                location: JsonPointer::new("/region"),
            }],
            uuid_ptr: None,
            journal_prefix: "acmeCo/orders".to_string(),
        }
    }

    #[tokio::test]
    async fn test_map_is_idempotent_per_partition() {
        let mapper = InMemoryMapper::default();
        let collection = collection();
        let eu = json!("eu");

        let a = mapper.map(&collection, &[("region", &eu)], 1).await.unwrap();
        let b = mapper.map(&collection, &[("region", &eu)], 999).await.unwrap();
        assert_eq!(a, b);
        assert!(a.starts_with("acmeCo/orders/region=eu/pivot="));
    }

    #[tokio::test]
    async fn test_map_distinguishes_partitions() {
        let mapper = InMemoryMapper::default();
        let collection = collection();
        let eu = json!("eu");
        let us = json!("us");

        let a = mapper.map(&collection, &[("region", &eu)], 1).await.unwrap();
        let b = mapper.map(&collection, &[("region", &us)], 1).await.unwrap();
        assert_ne!(a, b);
    }
}
