//! Types mirroring `go.gazette.dev/core/consumer/protocol` (`consumer.proto`).

use crate::broker::LabelSet;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ShardId(pub String);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShardSpec {
    pub id: ShardId,
    pub labels: LabelSet,
    pub hint_backups: u32,
    pub max_txn_duration_seconds: i64,
    pub min_txn_duration_seconds: i64,
    pub disable: bool,
    pub hot_standbys: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    ShardNotFound = 1,
    NoShardPrimary = 2,
    NotShardPrimary = 3,
    EtcdTransactionFailed = 4,
    ShardStopped = 5,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRequest {
    pub selector: Option<crate::broker::LabelSelector>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResponseShard {
    pub spec: Option<ShardSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResponse {
    pub shards: Vec<ListResponseShard>,
}
