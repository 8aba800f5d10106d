//! Types mirroring the subset of `flow.proto` that the read/ingest path depends on.

use serde::{Deserialize, Serialize};

/// A 32-bit key range and 32-bit rclock range assigned to a shard or journal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeSpec {
    pub key_begin: u32,
    pub key_end: u32,
    pub r_clock_begin: u32,
    pub r_clock_end: u32,
}

impl RangeSpec {
    pub const KEY_BEGIN_MIN: u32 = u32::MIN;
    pub const KEY_END_MAX: u32 = u32::MAX;

    /// Total order used for `compare_range` (§3): key range first, then
    /// clock range breaks ties.
    pub fn compare(&self, other: &RangeSpec) -> std::cmp::Ordering {
        (self.key_begin, self.key_end)
            .cmp(&(other.key_begin, other.key_end))
            .then((self.r_clock_begin, self.r_clock_end).cmp(&(other.r_clock_begin, other.r_clock_end)))
    }

    /// True if `self`'s key range overlaps `[begin, end]` (inclusive of end,
    /// matching the half-open/closed convention used by `range_span`).
    pub fn key_overlaps(&self, begin: u32, end: u32) -> bool {
        self.key_begin <= end && begin <= self.key_end
    }
}
