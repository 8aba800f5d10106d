//! Types mirroring `go.gazette.dev/core/broker/protocol` (`broker.proto`).

use serde::{Deserialize, Serialize};

/// A single label name/value pair attached to a JournalSpec or ShardSpec.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
    /// True if this label was matched as a selector prefix rather than an exact value.
    #[serde(default)]
    pub prefix: bool,
}

/// An ordered, deduplicated set of Labels. Labels must be maintained in
/// strictly ascending (name, value) order for the rest of the system
/// (partition/shard suffix derivation) to behave correctly.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelSet {
    pub labels: Vec<Label>,
}

/// A selection over LabelSets: every `include` label must match and no
/// `exclude` label may match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabelSelector {
    pub include: LabelSet,
    pub exclude: LabelSet,
}

/// Identifies a broker process within a Route.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProcessSpecId {
    pub zone: String,
    pub suffix: String,
}

/// A resolved set of broker members capable of serving a journal, with
/// an index of the current primary (or -1 if none).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub members: Vec<ProcessSpecId>,
    pub endpoints: Vec<String>,
    pub primary: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FragmentSpec {
    pub length: i64,
    pub compression_codec: i32,
    pub stores: Vec<String>,
    pub refresh_interval_seconds: i64,
    pub retention_seconds: i64,
    pub flush_interval_seconds: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JournalSpec {
    pub name: String,
    pub replication: i32,
    pub labels: LabelSet,
    pub fragment: FragmentSpec,
    pub flags: u32,
    pub max_append_rate: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    JournalNotFound = 1,
    NoJournalBrokerAtAssignment = 2,
    NotJournalBroker = 3,
    InsufficientJournalBrokers = 4,
    OffsetNotYetAvailable = 5,
    WrongAppendOffset = 6,
    IndexHasGreaterOffset = 7,
    RegisterMismatch = 8,
    FragmentStoreUnhealthy = 9,
    WrongRoute = 10,
    ProposedOffsetNotYetKnown = 11,
    EtcdTransactionFailed = 12,
    NotAllowed = 13,
}

impl Status {
    pub fn from_i32(v: i32) -> Option<Status> {
        use Status::*;
        Some(match v {
            0 => Ok,
            1 => JournalNotFound,
            2 => NoJournalBrokerAtAssignment,
            3 => NotJournalBroker,
            4 => InsufficientJournalBrokers,
            5 => OffsetNotYetAvailable,
            6 => WrongAppendOffset,
            7 => IndexHasGreaterOffset,
            8 => RegisterMismatch,
            9 => FragmentStoreUnhealthy,
            10 => WrongRoute,
            11 => ProposedOffsetNotYetKnown,
            12 => EtcdTransactionFailed,
            13 => NotAllowed,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppendRequest {
    pub journal: String,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppendResponse {
    pub status: i32,
    pub commit_begin_offset: i64,
    pub commit_end_offset: i64,
    pub route: Route,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadRequest {
    pub journal: String,
    pub offset: i64,
    pub end_offset: i64,
    pub block: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReadResponse {
    pub status: i32,
    pub offset: i64,
    pub write_head: i64,
    pub content: Vec<u8>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListRequest {
    pub selector: Option<LabelSelector>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResponseJournal {
    pub spec: Option<JournalSpec>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ListResponse {
    pub journals: Vec<ListResponseJournal>,
}

/// Helpers mirroring the free functions `labels` expects on `LabelSet`:
/// `values`, `range`, `set_value`, `add_value`, `remove`, and a `build_set`
/// test constructor. Kept here (rather than in the `labels` crate) because
/// they operate purely on the wire type.
impl LabelSet {
    pub fn values<'s>(&'s self, name: &str) -> Vec<&'s Label> {
        self.labels.iter().filter(|l| l.name == name).collect()
    }

    /// Labels whose value falls in `[begin, end)` when compared lexicographically,
    /// used by `has_range_spec` to check for label presence irrespective of value.
    pub fn range(&self, name: &str) -> Vec<&Label> {
        self.values(name)
    }

    pub fn set_value(mut self, name: &str, value: &str) -> Self {
        self.labels.retain(|l| l.name != name);
        self.insert_sorted(Label {
            name: name.to_string(),
            value: value.to_string(),
            prefix: false,
        });
        self
    }

    pub fn add_value(mut self, name: &str, value: &str) -> Self {
        self.insert_sorted(Label {
            name: name.to_string(),
            value: value.to_string(),
            prefix: false,
        });
        self
    }

    pub fn remove(mut self, name: &str) -> Self {
        self.labels.retain(|l| l.name != name);
        self
    }

    fn insert_sorted(&mut self, label: Label) {
        let idx = self
            .labels
            .binary_search(&label)
            .unwrap_or_else(|idx| idx);
        self.labels.insert(idx, label);
    }
}

/// Test-only constructor mirroring `labels::build_set` used throughout the
/// teacher's inline test modules.
pub fn build_set<'i, I>(pairs: I) -> LabelSet
where
    I: IntoIterator<Item = (&'i str, &'i str)>,
{
    let mut set = LabelSet::default();
    for (name, value) in pairs {
        set = set.add_value(name, value);
    }
    set
}
