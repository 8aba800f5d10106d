//! A scoped-down stand-in for the production combiner: in-memory reduction
//! of documents sharing a collection key, keyed by a packed tuple and
//! ordered by [`tuple::pack`]'s byte ordering.
//!
//! The production combiner spills to disk through a bump-allocator-backed
//! `MemTable`/`SpillWriter` pair and applies per-location JSON-Schema
//! `reduce` annotations (see `doc::combine` / `doc::reduce` in the teacher
//! corpus). Implementing that machinery is out of proportion with this
//! spec's scope (document validation and derivation lambda execution are
//! explicit non-goals, §1); this crate keeps the same two-phase shape —
//! build a `Spec` once per collection, accumulate documents, then `drain`
//! the reduced results — but reduces entirely in memory with a single
//! "deep merge, last-write-wins at the leaves" strategy.

use serde_json::Value;
use std::collections::BTreeMap;

mod reduce;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("document is missing its key location {0}")]
    MissingKeyLocation(String),
    #[error("document is missing its partition location {0}")]
    MissingPartitionLocation(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Specification of how documents are to be combined: which locations form
/// the composite key, and which locations are logical partition fields.
/// Partition fields must be supplied in sorted order, matching
/// `labels::partition::encode_partition_labels`'s requirement.
#[derive(Debug, Clone)]
pub struct Spec {
    key_ptrs: Vec<String>,
    partition_ptrs: Vec<String>,
}

impl Spec {
    pub fn new(key_ptrs: Vec<String>, partition_ptrs: Vec<String>) -> Self {
        Self {
            key_ptrs,
            partition_ptrs,
        }
    }

    pub fn key_ptrs(&self) -> &[String] {
        &self.key_ptrs
    }

    pub fn partition_ptrs(&self) -> &[String] {
        &self.partition_ptrs
    }
}

/// A single combined document, ready to be mapped to a partition and
/// published (§4.3 "the drain callback produces tuples `(document, packed
/// key, partitions)`").
#[derive(Debug, Clone, PartialEq)]
pub struct Drained {
    pub document: Value,
    pub packed_key: Vec<u8>,
    pub partitions: Vec<Value>,
}

/// An open combiner for one collection, owned by exactly one Ingestion
/// (§3 "Combiners exist only for the duration of one Ingestion").
#[derive(Debug, Default)]
pub struct Accumulator {
    spec: Option<Spec>,
    table: BTreeMap<Vec<u8>, Value>,
}

impl Accumulator {
    pub fn new(spec: Spec) -> Self {
        Self {
            spec: Some(spec),
            table: BTreeMap::new(),
        }
    }

    /// Reduce `document` into the entry sharing its extracted key.
    pub fn add(&mut self, document: Value) -> Result<()> {
        let spec = self.spec.as_ref().expect("Accumulator always holds a Spec");
        let packed = pack_key(spec, &document)?;

        let existing = self.table.remove(&packed);
        self.table.insert(packed, reduce::merge(existing, document));
        Ok(())
    }

    /// Close the combiner, forcing the in-place reductions and returning
    /// every combined document along with its packed key and extracted
    /// partition values, in key order.
    pub fn drain(self) -> Result<Vec<Drained>> {
        let spec = self.spec.expect("Accumulator always holds a Spec");
        let mut out = Vec::with_capacity(self.table.len());

        for (packed_key, document) in self.table {
            let mut partitions = Vec::with_capacity(spec.partition_ptrs.len());
            for ptr in &spec.partition_ptrs {
                let value = document
                    .pointer(ptr)
                    .cloned()
                    .ok_or_else(|| Error::MissingPartitionLocation(ptr.clone()))?;
                partitions.push(value);
            }
            out.push(Drained {
                document,
                packed_key,
                partitions,
            });
        }
        Ok(out)
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

fn pack_key(spec: &Spec, document: &Value) -> Result<Vec<u8>> {
    let mut values = Vec::with_capacity(spec.key_ptrs.len());
    for ptr in &spec.key_ptrs {
        let value = document
            .pointer(ptr)
            .cloned()
            .ok_or_else(|| Error::MissingKeyLocation(ptr.clone()))?;
        values.push(value);
    }
    // `tuple::pack` only fails on array/object/float elements, which a
    // well-formed collection key never extracts; key validation against
    // the collection schema is out of scope here (validation is a
    // connector-adjacent concern, §1).
    Ok(tuple::pack(&values).unwrap_or_default())
}
