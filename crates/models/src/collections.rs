//! CollectionSpec (§3 Collection): the subset of a catalog collection's
//! specification that the Ingester and shuffle read path need. Schema
//! validation, projections beyond key/partition extraction, and the
//! catalog build pipeline that produces these specs are out of scope
//! (non-goals, §1); this crate models only the shapes that flow through
//! the ingest and shuffle-read code paths.

use crate::names::{Collection, CompositeKey, JsonPointer};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A logical partition field: a document location projected into a
/// broker label, used both to route published documents to journals and
/// to prune journals during a shuffled read.
#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq, Eq, PartialOrd, Ord)]
pub struct PartitionField {
    pub field: String,
    pub location: JsonPointer,
}

#[derive(Serialize, Deserialize, Debug, Clone, JsonSchema, PartialEq)]
pub struct CollectionSpec {
    pub name: Collection,
    /// The collection's composite key, as JSON Pointers into each document.
    pub key: CompositeKey,
    /// Logical partition fields, in the sorted order labels are encoded in
    /// (`labels::partition::encode_partition_labels` requires this).
    pub partition_fields: Vec<PartitionField>,
    /// Location of the document's UUID placeholder, if the collection
    /// assigns one (required for any collection read by a derivation).
    pub uuid_ptr: Option<JsonPointer>,
    /// Prefix of journals backing this collection, e.g. `acmeCo/orders`.
    pub journal_prefix: String,
}

impl CollectionSpec {
    /// Extract this collection's partition values from `document`, in
    /// `partition_fields` order, for labeling or selector matching.
    pub fn partition_values<'d>(
        &self,
        document: &'d serde_json::Value,
    ) -> Vec<(&str, Option<&'d serde_json::Value>)> {
        self.partition_fields
            .iter()
            .map(|p| (p.field.as_str(), document.pointer(&p.location)))
            .collect()
    }
}
