//! MemberTopology (§4.2): the ordered set of co-task shards and a stable
//! rendezvous-hash selection over a contiguous sub-range of them.

use proto_gazette::consumer::ShardId;
use proto_gazette::flow::RangeSpec;
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("shard {0:?} declares both split-source and split-target, or neither parses")]
    InvalidLabeling(ShardId, #[source] labels::Error),
    #[error(
        "shard ranges are not strictly ordered: shard {prev_id:?} range {prev_range:?} \
         does not precede shard {id:?} range {range:?}"
    )]
    NotStrictlyOrdered {
        prev_id: ShardId,
        prev_range: RangeSpec,
        id: ShardId,
        range: RangeSpec,
    },
    #[error("our own shard {0:?} is not present in the member topology")]
    SelfNotPresent(ShardId),
}

/// A single co-task shard: its identity, its assigned Range, and its
/// rendezvous-hash value.
#[derive(Debug, Clone)]
pub struct Member {
    pub id: ShardId,
    pub range: RangeSpec,
    hash: u32,
}

/// The live, ordered set of a task's shards, used to answer "which
/// coordinator should serve this journal" queries via rendezvous hashing.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    members: Vec<Member>,
}

/// A stable, non-cryptographic 64-bit hash of a shard or journal identity,
/// truncated to 32 bits. Must remain stable across releases: it controls
/// which coordinator a reader continues talking to across a rolling
/// deploy (§4.2 Rationale).
pub fn stable_hash(identity: &str) -> u32 {
    (xxh3_64(identity.as_bytes()) & 0xffff_ffff) as u32
}

impl Topology {
    /// Build a Topology from a snapshot of ShardSpecs for one task.
    /// Shards carrying a `split-source` label (a child shard still
    /// forming) are filtered out. The remaining shards must be strictly
    /// ordered by Range.
    pub fn from_shards<'s>(
        specs: impl IntoIterator<Item = &'s proto_gazette::consumer::ShardSpec>,
        region: &str,
    ) -> Result<Topology, Error> {
        let mut members = Vec::new();

        for spec in specs {
            let labeling = labels::shard::decode_labeling(&spec.labels, region)
                .map_err(|e| Error::InvalidLabeling(spec.id.clone(), e))?;

            if !labeling.split_source.is_empty() {
                continue; // Child shard still forming; not yet a coordinator.
            }
            let Some(range) = labeling.range else {
                continue;
            };

            members.push(Member {
                id: spec.id.clone(),
                range,
                hash: stable_hash(&spec.id.0),
            });
        }

        for w in members.windows(2) {
            if w[0].range.compare(&w[1].range) != std::cmp::Ordering::Less {
                return Err(Error::NotStrictlyOrdered {
                    prev_id: w[0].id.clone(),
                    prev_range: w[0].range,
                    id: w[1].id.clone(),
                    range: w[1].range,
                });
            }
        }

        Ok(Topology { members })
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, id: &ShardId) -> bool {
        self.members.iter().any(|m| &m.id == id)
    }

    /// Half-open `[start, stop)` indices into `members()` covering every
    /// member whose key range overlaps `[begin, end]`.
    pub fn range_span(&self, begin: u32, end: u32) -> (usize, usize) {
        let start = self
            .members
            .partition_point(|m| m.range.key_end < begin);
        let stop = start
            + self.members[start..]
                .iter()
                .take_while(|m| m.range.key_begin <= end)
                .count();
        (start, stop)
    }

    /// Rendezvous-hash selection (HRW): the index within `[start, stop)`
    /// maximizing `member_hash[i] XOR h`. Ties (impossible for distinct
    /// 32-bit hashes unless the hashes are literally equal) are broken by
    /// picking the smaller index.
    pub fn pick_hrw(&self, h: u32, start: usize, stop: usize) -> Option<usize> {
        if start >= stop || stop > self.members.len() {
            return None;
        }
        let mut best_index = start;
        let mut best_score = self.members[start].hash ^ h;

        for i in (start + 1)..stop {
            let score = self.members[i].hash ^ h;
            if score > best_score {
                best_score = score;
                best_index = i;
            }
        }
        Some(best_index)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use labels::shard::encode_labeling;
    use proto_gazette::broker::LabelSet;
    use proto_gazette::consumer::ShardSpec;
    use proto_gazette::ops::ShardLabeling;

    fn shard(id: &str, key_begin: u32, key_end: u32) -> ShardSpec {
        let labeling = ShardLabeling {
            build: "build".to_string(),
            log_level: proto_gazette::ops::log::Level::Info as i32,
            range: Some(RangeSpec {
                key_begin,
                key_end,
                r_clock_begin: 0,
                r_clock_end: u32::MAX,
            }),
            task_name: "task/name".to_string(),
            task_type: proto_gazette::ops::TaskType::Derivation as i32,
            ..Default::default()
        };
        ShardSpec {
            id: ShardId(id.to_string()),
            labels: encode_labeling(LabelSet::default(), &labeling),
            ..Default::default()
        }
    }

    fn split_source_shard(id: &str, key_begin: u32, key_end: u32, source: &str) -> ShardSpec {
        let mut spec = shard(id, key_begin, key_end);
        let labeling = labels::shard::decode_labeling(&spec.labels, "region").unwrap();
        let mut labeling = labeling;
        labeling.split_source = source.to_string();
        spec.labels = encode_labeling(LabelSet::default(), &labeling);
        spec
    }

    #[test]
    fn test_builds_strictly_ordered_topology() {
        let specs = vec![
            shard("a", 0x00000000, 0x7fffffff),
            shard("b", 0x80000000, 0xffffffff),
        ];
        let topology = Topology::from_shards(&specs, "region").unwrap();
        assert_eq!(topology.len(), 2);
    }

    #[test]
    fn test_filters_split_source_children() {
        let specs = vec![
            shard("a", 0x00000000, 0xffffffff),
            split_source_shard("a-child", 0x00000000, 0x7fffffff, "a"),
        ];
        let topology = Topology::from_shards(&specs, "region").unwrap();
        assert_eq!(topology.len(), 1);
        assert_eq!(topology.members()[0].id, ShardId("a".to_string()));
    }

    #[test]
    fn test_rejects_overlapping_ranges() {
        let specs = vec![
            shard("a", 0x00000000, 0x90000000),
            shard("b", 0x80000000, 0xffffffff),
        ];
        assert!(matches!(
            Topology::from_shards(&specs, "region"),
            Err(Error::NotStrictlyOrdered { .. })
        ));
    }

    #[test]
    fn test_range_span_half_open() {
        let specs = vec![
            shard("a", 0x00000000, 0x3fffffff),
            shard("b", 0x40000000, 0x7fffffff),
            shard("c", 0x80000000, 0xbfffffff),
            shard("d", 0xc0000000, 0xffffffff),
        ];
        let topology = Topology::from_shards(&specs, "region").unwrap();

        assert_eq!(topology.range_span(0x50000000, 0x50000000), (1, 2));
        assert_eq!(topology.range_span(0x00000000, 0xffffffff), (0, 4));
        assert_eq!(topology.range_span(0x7ffffff0, 0x80000010), (1, 3));
    }

    #[test]
    fn test_pick_hrw_is_stable_within_span() {
        let specs = vec![
            shard("a", 0x00000000, 0x3fffffff),
            shard("b", 0x40000000, 0x7fffffff),
            shard("c", 0x80000000, 0xbfffffff),
        ];
        let topology = Topology::from_shards(&specs, "region").unwrap();
        let h = stable_hash("some/journal;name");

        let picked = topology.pick_hrw(h, 0, 3).unwrap();
        // Re-running picks the same member: determinism.
        assert_eq!(topology.pick_hrw(h, 0, 3), Some(picked));
    }

    #[test]
    fn test_pick_hrw_empty_span_is_none() {
        let specs = vec![shard("a", 0, u32::MAX)];
        let topology = Topology::from_shards(&specs, "region").unwrap();
        assert_eq!(topology.pick_hrw(123, 1, 1), None);
    }

    #[quickcheck_macros::quickcheck]
    fn prop_hrw_continuity(seed: u64) -> bool {
        // Removing one of three members changes the HRW pick for at most
        // one third of journals, matching §8 property 4's expectation in
        // expectation; here we just assert the pick is always a surviving
        // member and deterministic given the same inputs.
        let specs = vec![
            shard("a", 0x00000000, 0x3fffffff),
            shard("b", 0x40000000, 0x7fffffff),
            shard("c", 0x80000000, 0xffffffff),
        ];
        let topology = Topology::from_shards(&specs, "region").unwrap();
        let h = stable_hash(&format!("journal-{seed}"));
        let a = topology.pick_hrw(h, 0, 3);
        let b = topology.pick_hrw(h, 0, 3);
        a == b && a.is_some()
    }
}
