//! ReadBuilder (§4.4): given a shard identity and live membership/journal
//! snapshots, computes the deterministic set of reads this shard should be
//! running — one per (shuffle, matching source journal) pair, each pointing
//! at a coordinator chosen by rendezvous hashing.

use member_topology::Topology;
use models::Shuffle;
use proto_gazette::broker::JournalSpec;
use proto_gazette::consumer::ShardId;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Labels(#[from] labels::Error),
    #[error(transparent)]
    Topology(#[from] member_topology::Error),
    #[error("our shard {0:?} is not present in the member topology")]
    SelfNotPresent(ShardId),
    #[error("HRW span for journal {0:?} is empty; no member covers its key range")]
    EmptySpan(String),
    #[error("no shuffle matches journal {0:?}")]
    NoMatchingShuffle(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// A signal checked once at the top of `build_reads` (§4.4: "poll the drain
/// channel once; if it has signaled, treat the call as if no shuffles
/// matched"). Once fired, every existing read is stale and no new reads are
/// planned, regardless of the membership/journal snapshot passed in.
pub struct DrainSignal(mpsc::Receiver<()>);

impl DrainSignal {
    /// Build a fresh signal and the sender that fires it.
    pub fn new() -> (mpsc::Sender<()>, DrainSignal) {
        let (tx, rx) = mpsc::channel(1);
        (tx, DrainSignal(rx))
    }

    fn fired(&mut self) -> bool {
        use mpsc::error::TryRecvError;
        match self.0.try_recv() {
            Ok(()) => true,
            Err(TryRecvError::Disconnected) => true,
            Err(TryRecvError::Empty) => false,
        }
    }
}

/// The config a running read is pinned to: everything that, if changed,
/// requires draining the old read and starting a fresh one (§4.4 step iii).
#[derive(Debug, Clone, PartialEq)]
pub struct ReadSpec {
    pub source_journal: String,
    /// `journal;group-name`, the target a coordinator publishes under.
    pub target_journal: String,
    pub shuffle: Shuffle,
    pub coordinator: ShardId,
    pub build: String,
    pub replay: bool,
    pub end_offset: i64,
    pub read_delay: clock::ReadDelay,
}

pub struct ReadBuilder {
    build: String,
    self_id: ShardId,
}

impl ReadBuilder {
    pub fn new(build: impl Into<String>, self_id: ShardId) -> Self {
        Self {
            build: build.into(),
            self_id,
        }
    }

    /// Enumerate the reads this shard should run against `shuffles` and the
    /// current `journals` snapshot, diffing against `existing` (§4.4
    /// `build_reads`). Returns `(added, drain)`: `added` holds every
    /// `ReadSpec` that should now be running but wasn't already (new reads
    /// or reads whose configuration changed); `drain` holds the
    /// `target_journal` keys of reads that must stop.
    ///
    /// `drain_signal` is polled once before planning anything; if it has
    /// fired, every read in `existing` is drained and no reads are added,
    /// regardless of `shuffles`/`journals`.
    pub fn build_reads(
        &self,
        topology: &Topology,
        shuffles: &[Shuffle],
        journals: &[JournalSpec],
        existing: &HashMap<String, ReadSpec>,
        drain_signal: &mut DrainSignal,
    ) -> Result<(Vec<ReadSpec>, Vec<String>)> {
        self.walk_members(topology)?;

        if drain_signal.fired() {
            return Ok((Vec::new(), existing.keys().cloned().collect()));
        }

        let mut wanted: HashMap<String, ReadSpec> = HashMap::new();

        for shuffle in shuffles {
            for journal in journals {
                if !matches_shuffle(shuffle, journal)? {
                    continue;
                }

                let spec = self.plan_read(topology, shuffle, journal)?;
                wanted.insert(spec.target_journal.clone(), spec);
            }
        }

        let mut added = Vec::new();
        for (target, spec) in &wanted {
            match existing.get(target) {
                Some(running) if running == spec => {}
                _ => added.push(spec.clone()),
            }
        }

        let drain = existing
            .keys()
            .filter(|k| !wanted.contains_key(*k))
            .cloned()
            .chain(
                existing
                    .iter()
                    .filter(|(k, running)| wanted.get(*k).is_some_and(|w| w != *running))
                    .map(|(k, _)| k.clone()),
            )
            .collect();

        Ok((added, drain))
    }

    /// Build a one-shot replay read for `[begin, end)` of `journal` (§4.4
    /// `build_replay_read`): the first shuffle matching `journal` wins.
    pub fn build_replay_read(
        &self,
        shuffles: &[Shuffle],
        journal: &JournalSpec,
        begin: i64,
        end: i64,
    ) -> Result<ReadSpec> {
        for shuffle in shuffles {
            if matches_shuffle(shuffle, journal)? {
                return Ok(ReadSpec {
                    source_journal: journal.name.clone(),
                    target_journal: format!("{};{}", journal.name, shuffle.group_name),
                    shuffle: shuffle.clone(),
                    coordinator: self.self_id.clone(),
                    build: self.build.clone(),
                    replay: true,
                    end_offset: end,
                    read_delay: clock::ReadDelay::default(),
                });
            }
        }
        Err(Error::NoMatchingShuffle(journal.name.clone()))
    }

    /// Recompute a single read's spec from the latest snapshot (§4.5: a read
    /// that closes with an error "re-creates it from the latest ReadBuilder
    /// snapshot... with attempt incremented"). The coordinator and read delay
    /// may have changed since the read was first planned; the caller keeps
    /// whatever `attempt`/offset bookkeeping it tracks separately.
    pub fn rebuild_read(
        &self,
        topology: &Topology,
        shuffle: &Shuffle,
        journal: &JournalSpec,
    ) -> Result<ReadSpec> {
        self.walk_members(topology)?;
        self.plan_read(topology, shuffle, journal)
    }

    /// Map plain journal-name offsets to the `;group-name`-suffixed names
    /// this shard actually reads under, dropping anything no shuffle claims
    /// (§4.4 `read_through`).
    pub fn read_through(
        &self,
        shuffles: &[Shuffle],
        journals: &[JournalSpec],
        offsets: &HashMap<String, i64>,
    ) -> Result<HashMap<String, i64>> {
        let by_name: HashMap<&str, &JournalSpec> =
            journals.iter().map(|j| (j.name.as_str(), j)).collect();

        let mut out = HashMap::new();
        for (name, offset) in offsets {
            let Some(journal) = by_name.get(name.as_str()) else {
                continue;
            };
            for shuffle in shuffles {
                if matches_shuffle(shuffle, journal)? {
                    out.insert(format!("{name};{}", shuffle.group_name), *offset);
                }
            }
        }
        Ok(out)
    }

    fn walk_members(&self, topology: &Topology) -> Result<()> {
        if !topology.contains(&self.self_id) {
            return Err(Error::SelfNotPresent(self.self_id.clone()));
        }
        Ok(())
    }

    fn plan_read(
        &self,
        topology: &Topology,
        shuffle: &Shuffle,
        journal: &JournalSpec,
    ) -> Result<ReadSpec> {
        let (start, stop) = if shuffle.uses_source_key {
            let (key_begin, key_end) = labels::partition::decode_key_range(&journal.labels)?;
            topology.range_span(key_begin, key_end)
        } else {
            (0, topology.len())
        };

        if start >= stop {
            return Err(Error::EmptySpan(journal.name.clone()));
        }

        let h = member_topology::stable_hash(&journal.name);
        let idx = topology
            .pick_hrw(h, start, stop)
            .ok_or_else(|| Error::EmptySpan(journal.name.clone()))?;
        let coordinator = topology.members()[idx].id.clone();

        Ok(ReadSpec {
            source_journal: journal.name.clone(),
            target_journal: format!("{};{}", journal.name, shuffle.group_name),
            shuffle: shuffle.clone(),
            coordinator,
            build: self.build.clone(),
            replay: false,
            end_offset: 0,
            read_delay: clock::ReadDelay::from_secs(shuffle.read_delay_seconds),
        })
    }
}

fn matches_shuffle(shuffle: &Shuffle, journal: &JournalSpec) -> Result<bool> {
    let collection = journal
        .labels
        .labels
        .iter()
        .find(|l| l.name == labels::COLLECTION)
        .map(|l| l.value.as_str());

    if collection != Some(shuffle.source_collection.as_str()) {
        return Ok(false);
    }

    if let Some(selector) = &shuffle.source_partitions {
        let partitions = journal_partitions(journal)?;
        let refs: Vec<(&str, &Value)> = partitions.iter().map(|(k, v)| (k.as_str(), v)).collect();
        if !selector.matches(&refs) {
            return Ok(false);
        }
    }
    Ok(true)
}

fn journal_partitions(journal: &JournalSpec) -> Result<Vec<(String, Value)>> {
    let mut out = Vec::new();
    for label in &journal.labels.labels {
        if let Some(field) = label.name.strip_prefix(labels::FIELD_PREFIX) {
            out.push((field.to_string(), labels::partition::decode_value(&label.value)?));
        }
    }
    Ok(out)
}
