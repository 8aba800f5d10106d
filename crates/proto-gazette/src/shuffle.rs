//! Wire types for the `Shuffle` streaming RPC (§6): a service exposed by
//! each shard acting as coordinator, which streams documents matching a
//! key range and offset window from a source journal. There's no
//! upstream `.proto` this mirrors one-for-one, since the RPC is internal
//! to the reader/coordinator protocol this spec describes rather than
//! part of the broker or consumer protocols themselves.

use crate::consumer::ShardId;
use crate::flow::RangeSpec;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShuffleRequest {
    /// Target journal, suffixed `;group-name` per §4.5 step (iii).
    pub journal: String,
    pub coordinator: ShardId,
    pub build: String,
    pub range: RangeSpec,
    pub offset: i64,
    /// Zero means unbounded (a tailing read); non-zero bounds a replay.
    pub end_offset: i64,
    pub source_schema: Option<String>,
    pub partition_include: std::collections::BTreeMap<String, Vec<serde_json::Value>>,
    pub partition_exclude: std::collections::BTreeMap<String, Vec<serde_json::Value>>,
    pub resolution_header: Option<crate::broker::Route>,
}

/// One frame of a Shuffle response, per §6: a batch of documents paired
/// with their UUID-derived clocks and byte offsets, or a terminal error.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShuffleResponse {
    pub documents_json: Vec<String>,
    pub uuids: Vec<String>,
    /// `(begin, end)` byte offsets, one pair per document.
    pub offsets: Vec<(i64, i64)>,
    pub terminal_error: Option<String>,
}
