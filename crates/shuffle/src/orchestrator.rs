//! ReadOrchestrator (§4.5): drives each active read's state machine, applies
//! the back-pressure discipline on its result channel, and merges every
//! read's documents into one priority-ordered stream.

use crate::read_builder::ReadSpec;
use clock::Clock;
use proto_gazette::shuffle::ShuffleResponse;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{StreamExt, StreamMap};

/// Reads advance through this sequence; `CLOSED` is terminal and carries the
/// error, if any, that ended the stream (§4.5).
#[derive(Debug, Clone, PartialEq)]
pub enum ReadState {
    Pending,
    Backoff { attempt: u32 },
    Resolving,
    Streaming,
    Draining,
    Closed { error: Option<String> },
}

/// The fixed channel depth recommended by the back-pressure rationale: large
/// enough that the escalating timer (`1ms << (n-1)`) accumulates several
/// seconds of total grace before a stuck read self-cancels.
pub const READ_CHAN_CAP: usize = 22;

/// One item flowing from a read's channel pump to the orchestrator's merge
/// heap: either a batch of documents or a terminal error (EOF is `None`).
#[derive(Debug, Clone)]
pub enum ReadResult {
    Batch(ShuffleResponse),
    Error(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("read channel is at capacity; canceling the read")]
    Backpressure,
    #[error("the read's context was canceled")]
    Canceled,
}

/// A read's channel pump side: owns the bounded sender and the `drained_ch`
/// one-shot used to shorten the back-pressure wait once the consumer empties
/// the channel (§4.5 "Back-pressure discipline").
pub struct ReadChannel {
    tx: mpsc::Sender<ReadResult>,
    drained: mpsc::Receiver<()>,
}

pub struct ReadChannelConsumer {
    pub rx: mpsc::Receiver<ReadResult>,
    drained_tx: mpsc::Sender<()>,
}

impl ReadChannel {
    pub fn new() -> (ReadChannel, ReadChannelConsumer) {
        let (tx, rx) = mpsc::channel(READ_CHAN_CAP);
        let (drained_tx, drained) = mpsc::channel(1);
        (ReadChannel { tx, drained }, ReadChannelConsumer { rx, drained_tx })
    }

    /// `send_read_result` (§4.5): never blocks indefinitely. At capacity,
    /// cancels immediately. Otherwise waits `min(1ms << (n-1), ctx_done,
    /// drained_ch)` — approximated here as the queued-length-derived timer
    /// raced against a `drained_ch` wakeup — before a non-blocking attempt.
    pub async fn send_read_result(&mut self, mut item: ReadResult) -> Result<(), SendError> {
        loop {
            let queued = READ_CHAN_CAP - self.tx.capacity();
            if queued >= READ_CHAN_CAP {
                tracing::debug!(capacity = READ_CHAN_CAP, "read channel full, self-canceling");
                return Err(SendError::Backpressure);
            }
            if queued > 0 {
                let wait = Duration::from_millis(1u64 << queued.saturating_sub(1).min(20));
                match timeout(wait, self.drained.recv()).await {
                    Ok(None) => return Err(SendError::Canceled),
                    Ok(Some(())) | Err(_elapsed) => {}
                }
            }

            match self.tx.try_send(item) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::TrySendError::Closed(_)) => return Err(SendError::Canceled),
                Err(mpsc::error::TrySendError::Full(back)) => {
                    item = back;
                }
            }
        }
    }
}

impl ReadChannelConsumer {
    /// Signal `drained_ch` after the consumer empties the channel, waking
    /// any sender currently backing off.
    pub async fn notify_drained(&self) {
        let _ = self.drained_tx.try_send(());
    }
}

/// One active read tracked by the orchestrator: its current spec, state,
/// and last-recorded offset (used to resume after a CLOSED-with-error
/// rebuild, §4.5 "Merged read stream").
pub struct ActiveRead {
    pub spec: ReadSpec,
    pub state: ReadState,
    pub attempt: u32,
    pub offset: i64,
}

impl ActiveRead {
    pub fn new(spec: ReadSpec) -> Self {
        Self {
            spec,
            state: ReadState::Pending,
            attempt: 0,
            offset: 0,
        }
    }
}

/// Backoff sequence (§4.5 step 1): `0ms, 50ms, 100ms, 100ms, 1s, 1s, 5s, 5s, …`.
pub fn backoff(attempt: u32) -> Duration {
    const STEPS_MS: [u64; 7] = [0, 50, 100, 100, 1000, 1000, 5000];
    let idx = (attempt as usize).min(STEPS_MS.len() - 1);
    Duration::from_millis(if attempt as usize >= STEPS_MS.len() - 1 && attempt % 2 == 0 {
        5000
    } else {
        STEPS_MS[idx]
    })
}

/// A pending document ready to be merged, keyed by `(-priority,
/// effective_clock)` so the heap pops the highest-priority, earliest-clock
/// document first (§4.5 "Merged read stream").
#[derive(Debug, Clone)]
struct HeapEntry {
    priority: u32,
    effective_clock: Clock,
    target_journal: String,
}

impl HeapEntry {
    fn key(&self) -> (u32, std::cmp::Reverse<Clock>) {
        (self.priority, std::cmp::Reverse(self.effective_clock))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the highest priority and the
        // earliest (smallest) effective clock to sort greatest.
        self.key().cmp(&other.key())
    }
}

/// Merges the next-document pointer of every active read into priority
/// order. The orchestrator pushes one `HeapEntry` per read whenever that
/// read's channel yields a fresh head document, and pops the winner each
/// time the consumer wants the next document.
#[derive(Default)]
pub struct MergeHeap {
    heap: BinaryHeap<HeapEntry>,
}

impl MergeHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, priority: u32, effective_clock: Clock, target_journal: String) {
        self.heap.push(HeapEntry {
            priority,
            effective_clock,
            target_journal,
        });
    }

    /// Pop the read whose next document should be emitted next, if any.
    pub fn pop(&mut self) -> Option<String> {
        self.heap.pop().map(|e| e.target_journal)
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }
}

/// A document handed to the consumer by [`MergeReader`], tagged with the
/// read it came from.
#[derive(Debug, Clone)]
pub struct MergedDoc {
    pub target_journal: String,
    pub document_json: String,
    pub uuid: String,
    pub offset: (i64, i64),
}

/// A read that stopped, surfaced by [`MergeReader::next`] so the caller can
/// rebuild it (§4.5: a `CLOSED { error: Some(_) }` read "re-creates it from
/// the latest ReadBuilder snapshot... with attempt incremented").
#[derive(Debug, Clone)]
pub struct ReadFault {
    pub target_journal: String,
    pub error: Option<String>,
}

struct PendingDoc {
    document_json: String,
    uuid: String,
    offset: (i64, i64),
    effective_clock: Clock,
}

struct ReadMeta {
    priority: u32,
    read_delay: clock::ReadDelay,
    drained_tx: mpsc::Sender<()>,
    pending: VecDeque<PendingDoc>,
    /// Set when a batch arrived carrying `terminal_error`; the read is
    /// faulted once its buffered documents are drained.
    closing: Option<String>,
}

/// The single consumer task that drives the merge heap (§4.5 "Merged read
/// stream"): polls every active read's channel, converts each document's
/// UUID to an effective clock (`clock_from_uuid(uuid) + read_delay`), and
/// pops documents out in `(-priority, effective_clock)` order. One
/// `HeapEntry` is carried per read at a time, representing the head of that
/// read's buffered documents; within a read, document order is preserved by
/// its own FIFO queue rather than by the heap.
pub struct MergeReader {
    streams: StreamMap<String, ReceiverStream<ReadResult>>,
    reads: HashMap<String, ReadMeta>,
    heap: MergeHeap,
    faults: VecDeque<ReadFault>,
}

impl MergeReader {
    pub fn new() -> Self {
        Self {
            streams: StreamMap::new(),
            reads: HashMap::new(),
            heap: MergeHeap::new(),
            faults: VecDeque::new(),
        }
    }

    /// Register a newly-started read. Its channel consumer joins the poll
    /// set keyed by `target_journal`; its first document seeds the heap once
    /// a batch arrives.
    pub fn add_read(
        &mut self,
        target_journal: String,
        priority: u32,
        read_delay: clock::ReadDelay,
        consumer: ReadChannelConsumer,
    ) {
        let ReadChannelConsumer { rx, drained_tx } = consumer;
        self.streams.insert(target_journal.clone(), ReceiverStream::new(rx));
        self.reads.insert(
            target_journal,
            ReadMeta {
                priority,
                read_delay,
                drained_tx,
                pending: VecDeque::new(),
                closing: None,
            },
        );
    }

    /// Drop a read from the poll set, e.g. after the caller rebuilds it with
    /// a fresh channel following a fault.
    pub fn remove_read(&mut self, target_journal: &str) {
        self.streams.remove(target_journal);
        self.reads.remove(target_journal);
    }

    /// Pop the next document in priority order, pulling fresh batches off
    /// the underlying channels as needed. `None` once every read has been
    /// removed and its stream drained; `Some(Err(_))` when a read faults,
    /// after which that read is no longer polled.
    pub async fn next(&mut self) -> Option<Result<MergedDoc, ReadFault>> {
        loop {
            if let Some(fault) = self.faults.pop_front() {
                return Some(Err(fault));
            }

            if let Some(target_journal) = self.heap.pop() {
                let Some(meta) = self.reads.get_mut(&target_journal) else {
                    continue;
                };
                let Some(doc) = meta.pending.pop_front() else {
                    continue;
                };

                if let Some(next_doc) = meta.pending.front() {
                    self.heap.push(meta.priority, next_doc.effective_clock, target_journal.clone());
                } else if let Some(error) = meta.closing.take() {
                    self.faults.push_back(ReadFault {
                        target_journal: target_journal.clone(),
                        error: Some(error),
                    });
                    self.remove_read(&target_journal);
                }

                return Some(Ok(MergedDoc {
                    target_journal,
                    document_json: doc.document_json,
                    uuid: doc.uuid,
                    offset: doc.offset,
                }));
            }

            if self.reads.is_empty() {
                return None;
            }

            let (target_journal, result) = self.streams.next().await?;
            let Some(meta) = self.reads.get_mut(&target_journal) else {
                continue;
            };
            // Receiving this item freed one slot of the sender's channel
            // capacity; wake anyone currently backing off on it.
            let _ = meta.drained_tx.try_send(());

            match result {
                ReadResult::Error(error) => {
                    self.remove_read(&target_journal);
                    self.faults.push_back(ReadFault {
                        target_journal,
                        error: Some(error),
                    });
                }
                ReadResult::Batch(batch) => {
                    let was_empty = meta.pending.is_empty();

                    for ((document_json, uuid), offset) in batch
                        .documents_json
                        .into_iter()
                        .zip(batch.uuids)
                        .zip(batch.offsets)
                    {
                        let clock = match clock::clock_from_uuid_str(&uuid) {
                            Ok(c) => c,
                            Err(err) => {
                                tracing::warn!(%err, %uuid, "document uuid failed to parse; dropping");
                                continue;
                            }
                        };
                        meta.pending.push_back(PendingDoc {
                            document_json,
                            uuid,
                            offset,
                            effective_clock: clock.plus_delay(meta.read_delay),
                        });
                    }

                    if batch.terminal_error.is_some() {
                        meta.closing = batch.terminal_error;
                    }

                    if was_empty {
                        if let Some(front) = meta.pending.front() {
                            self.heap.push(meta.priority, front.effective_clock, target_journal.clone());
                        } else if let Some(error) = meta.closing.take() {
                            self.faults.push_back(ReadFault {
                                target_journal: target_journal.clone(),
                                error: Some(error),
                            });
                            self.remove_read(&target_journal);
                        }
                    }
                }
            }
        }
    }
}

impl Default for MergeReader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_backoff_sequence() {
        assert_eq!(backoff(0), Duration::from_millis(0));
        assert_eq!(backoff(1), Duration::from_millis(50));
        assert_eq!(backoff(2), Duration::from_millis(100));
        assert_eq!(backoff(3), Duration::from_millis(100));
        assert_eq!(backoff(4), Duration::from_millis(1000));
        assert_eq!(backoff(6), Duration::from_millis(5000));
        assert_eq!(backoff(50), Duration::from_millis(5000));
    }

    #[test]
    fn test_merge_heap_orders_by_priority_then_clock() {
        let mut heap = MergeHeap::new();
        heap.push(0, Clock::from_u64(100), "low-priority-early".to_string());
        heap.push(1, Clock::from_u64(200), "high-priority-late".to_string());
        heap.push(1, Clock::from_u64(50), "high-priority-early".to_string());

        assert_eq!(heap.pop(), Some("high-priority-early".to_string()));
        assert_eq!(heap.pop(), Some("high-priority-late".to_string()));
        assert_eq!(heap.pop(), Some("low-priority-early".to_string()));
        assert!(heap.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_read_result_fills_then_backpressures() {
        let (mut tx, mut rx) = ReadChannel::new();

        for _ in 0..READ_CHAN_CAP {
            tx.send_read_result(ReadResult::Error("x".to_string()))
                .await
                .unwrap();
        }

        // The channel is now full and nobody is draining it: the very next
        // send must eventually self-cancel rather than block forever. With
        // paused time, tokio auto-advances the clock past each escalating
        // wait instead of actually sleeping through it.
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            tx.send_read_result(ReadResult::Error("overflow".to_string())),
        )
        .await
        .expect("send_read_result must not hang past its own escalating timers");
        assert!(result.is_err());

        // Draining and notifying unblocks a subsequent send.
        while rx.rx.try_recv().is_ok() {}
        rx.notify_drained().await;
    }

    #[test]
    fn test_active_read_starts_pending() {
        let spec = ReadSpec {
            source_journal: "a/journal".to_string(),
            target_journal: "a/journal;group".to_string(),
            shuffle: models::Shuffle {
                source_collection: models::Collection::new("acmeCo/orders"),
                group_name: "group".to_string(),
                shuffle_key_ptrs: vec!["/id".to_string()],
                uses_source_key: true,
                read_delay_seconds: 0,
                priority: 0,
                source_partitions: None,
                source_schema: None,
            },
            coordinator: proto_gazette::consumer::ShardId("a".to_string()),
            build: "build-1".to_string(),
            replay: false,
            end_offset: 0,
            read_delay: clock::ReadDelay::default(),
        };
        let read = ActiveRead::new(spec);
        assert_eq!(read.state, ReadState::Pending);
        assert_eq!(read.attempt, 0);
    }

    fn batch(uuid: &str) -> ShuffleResponse {
        ShuffleResponse {
            documents_json: vec!["{}".to_string()],
            uuids: vec![uuid.to_string()],
            offsets: vec![(0, 1)],
            terminal_error: None,
        }
    }

    #[tokio::test]
    async fn test_merge_reader_preserves_fifo_order_within_one_read() {
        let (mut tx, consumer) = ReadChannel::new();
        let mut reader = MergeReader::new();
        reader.add_read("a;group".to_string(), 0, clock::ReadDelay::default(), consumer);

        tx.send_read_result(ReadResult::Batch(batch(
            "c232ab00-9414-11ec-b3c8-9f6bdeced846",
        )))
        .await
        .unwrap();
        tx.send_read_result(ReadResult::Batch(batch(
            "c232ab00-9414-11ec-b3c8-9f6bdeced846",
        )))
        .await
        .unwrap();

        let first = reader.next().await.unwrap().unwrap();
        let second = reader.next().await.unwrap().unwrap();
        assert_eq!(first.target_journal, "a;group");
        assert_eq!(second.target_journal, "a;group");
        assert_eq!(first.offset, (0, 1));
        assert_eq!(second.offset, (0, 1));
    }

    #[tokio::test]
    async fn test_merge_reader_surfaces_fault_and_stops_polling() {
        let (mut tx, consumer) = ReadChannel::new();
        let mut reader = MergeReader::new();
        reader.add_read("a;group".to_string(), 0, clock::ReadDelay::default(), consumer);

        tx.send_read_result(ReadResult::Error("broker unavailable".to_string()))
            .await
            .unwrap();

        let fault = reader.next().await.unwrap().unwrap_err();
        assert_eq!(fault.target_journal, "a;group");
        assert_eq!(fault.error.as_deref(), Some("broker unavailable"));

        // The read was removed; with no reads left, the stream ends.
        assert!(reader.next().await.is_none());
    }

    #[tokio::test]
    async fn test_merge_reader_faults_on_terminal_error_after_draining_pending() {
        let (mut tx, consumer) = ReadChannel::new();
        let mut reader = MergeReader::new();
        reader.add_read("a;group".to_string(), 0, clock::ReadDelay::default(), consumer);

        let mut closing = batch("c232ab00-9414-11ec-b3c8-9f6bdeced846");
        closing.terminal_error = Some("journal deleted".to_string());
        tx.send_read_result(ReadResult::Batch(closing)).await.unwrap();

        let doc = reader.next().await.unwrap().unwrap();
        assert_eq!(doc.target_journal, "a;group");

        let fault = reader.next().await.unwrap().unwrap_err();
        assert_eq!(fault.error.as_deref(), Some("journal deleted"));
    }
}
