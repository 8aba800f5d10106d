// NOTE constants in this file must be mirrored wherever a non-Rust
// consumer parses these labels. See §6 of the spec for the full list.

pub mod partition;
pub mod shard;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC};
use proto_gazette::broker::{Label, LabelSet};

// JournalSpec & ShardSpec labels.
pub const BUILD: &str = "estuary.dev/build";
pub const COLLECTION: &str = "estuary.dev/collection";
pub const FIELD_PREFIX: &str = "estuary.dev/field/";
pub const KEY_BEGIN: &str = "estuary.dev/key-begin";
pub const KEY_BEGIN_MIN: &str = "00000000";
pub const KEY_END: &str = "estuary.dev/key-end";
pub const KEY_END_MAX: &str = "ffffffff";
pub const MANAGED_BY_FLOW: &str = "estuary.dev/flow";

// ShardSpec labels.
pub const TASK_NAME: &str = "estuary.dev/task-name";
pub const TASK_TYPE: &str = "estuary.dev/task-type";
pub const TASK_TYPE_CAPTURE: &str = "capture";
pub const TASK_TYPE_DERIVATION: &str = "derivation";
pub const TASK_TYPE_MATERIALIZATION: &str = "materialization";
pub const RCLOCK_BEGIN: &str = "estuary.dev/rclock-begin";
pub const RCLOCK_BEGIN_MIN: &str = KEY_BEGIN;
pub const RCLOCK_END: &str = "estuary.dev/rclock-end";
pub const RCLOCK_END_MAX: &str = KEY_END_MAX;
pub const SPLIT_TARGET: &str = "estuary.dev/split-target";
pub const SPLIT_SOURCE: &str = "estuary.dev/split-source";
pub const LOG_LEVEL: &str = "estuary.dev/log-level";
pub const LOGS_JOURNAL: &str = "estuary.dev/logs-journal";
pub const STATS_JOURNAL: &str = "estuary.dev/stats-journal";
// Shard labels related to network connectivity to shards.
pub const HOSTNAME: &str = "estuary.dev/hostname";

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("expected one label for {0} (got {1:?})")]
    ExpectedOne(String, Vec<Label>),
    #[error("label {0} value is empty but shouldn't be")]
    ValueEmpty(String),
    #[error("invalid value {value:?} for label {name}")]
    InvalidValue { name: String, value: String },
    #[error("both split-source {0} and split-target {1} are set but shouldn't be")]
    SplitSourceAndTarget(String, String),
    #[error("partition values may only be null, bool, integer or string")]
    InvalidValueType,
    #[error("fields must be passed in strictly sorted order")]
    FieldsNotSorted,
    #[error("fields and values must be the same length")]
    FieldsValuesLengthMismatch,
    #[error(transparent)]
    ParseInt(#[from] std::num::ParseIntError),
    #[error(transparent)]
    Utf8(#[from] std::str::Utf8Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// The set of bytes that `encode_field_value` leaves un-escaped: alphanumerics
/// plus `.`, `-`, and `_`. Everything else, including space, is percent-escaped;
/// space specifically becomes `%20` rather than `+`.
const PARTITION_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC.remove(b'.').remove(b'-').remove(b'_');

pub(crate) fn percent_encoding(s: &str) -> percent_encoding::PercentEncode<'_> {
    percent_encoding::utf8_percent_encode(s, PARTITION_ENCODE_SET)
}

/// Return all Labels in `set` having the given `name`, in the order they appear.
pub fn values<'s>(set: &'s LabelSet, name: &str) -> Vec<&'s Label> {
    set.values(name)
}

/// Return all Labels in `set` having the given `name`, used to test presence
/// of a label irrespective of value (used by `has_range_spec`).
pub fn range<'s>(set: &'s LabelSet, name: &str) -> Vec<&'s Label> {
    set.range(name)
}

/// Replace all values of `name` within `set` with a single `value`.
pub fn set_value(set: LabelSet, name: &str, value: &str) -> LabelSet {
    set.set_value(name, value)
}

/// Append another value of `name` to `set`, keeping labels sorted.
pub fn add_value(set: LabelSet, name: &str, value: &str) -> LabelSet {
    set.add_value(name, value)
}

/// Remove all values of `name` from `set`.
pub fn remove(set: LabelSet, name: &str) -> LabelSet {
    set.remove(name)
}

/// Test helper building a LabelSet from `(name, value)` pairs.
pub fn build_set<'i, I>(pairs: I) -> LabelSet
where
    I: IntoIterator<Item = (&'i str, &'i str)>,
{
    proto_gazette::broker::build_set(pairs)
}

pub(crate) fn expect_one<'s>(set: &'s LabelSet, name: &str) -> Result<&'s str> {
    let labels = values(set, name);

    if labels.len() != 1 {
        Err(Error::ExpectedOne(name.to_string(), labels.into_iter().cloned().collect()))
    } else if labels[0].value.is_empty() {
        Err(Error::ValueEmpty(name.to_string()))
    } else {
        Ok(&set.labels[set.labels.iter().position(|l| l.name == name).unwrap()].value)
    }
}

pub(crate) fn maybe_one<'s>(set: &'s LabelSet, name: &str) -> Result<&'s str> {
    let labels = values(set, name);

    if labels.len() > 1 {
        Err(Error::ExpectedOne(name.to_string(), labels.into_iter().cloned().collect()))
    } else if labels.is_empty() {
        Ok("")
    } else if labels[0].value.is_empty() {
        Err(Error::ValueEmpty(name.to_string()))
    } else {
        Ok(&set.labels[set.labels.iter().position(|l| l.name == name).unwrap()].value)
    }
}

pub(crate) fn expect_one_u32(set: &LabelSet, name: &str) -> Result<u32> {
    let value = expect_one(set, name)?;

    let (8, Ok(parsed)) = (value.len(), u32::from_str_radix(value, 16)) else {
        return Err(Error::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
        });
    };
    Ok(parsed)
}

/// Encode a named 32-bit value as an 8-character lower-case hex label.
pub fn encode_hex_u32(set: LabelSet, name: &str, value: u32) -> LabelSet {
    set_value(set, name, &format!("{value:08x}"))
}

/// Decode a named 32-bit value from its 8-character lower-case hex label.
pub fn parse_hex_u32(set: &LabelSet, name: &str) -> Result<u32> {
    expect_one_u32(set, name)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_hex_u32_round_trip() {
        for v in [0u32, 1, 256, 0xdead_beef, u32::MAX] {
            let set = encode_hex_u32(LabelSet::default(), KEY_BEGIN, v);
            assert_eq!(parse_hex_u32(&set, KEY_BEGIN).unwrap(), v);
        }
    }

    #[test]
    fn test_parse_hex_u32_rejects_malformed() {
        let set = set_value(LabelSet::default(), KEY_BEGIN, "0011");
        assert!(parse_hex_u32(&set, KEY_BEGIN).is_err());

        let set = set_value(LabelSet::default(), KEY_BEGIN, "0000000z");
        assert!(parse_hex_u32(&set, KEY_BEGIN).is_err());

        let set = LabelSet::default();
        assert!(parse_hex_u32(&set, KEY_BEGIN).is_err());
    }
}
