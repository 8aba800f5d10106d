//! ReadBuilder and ReadOrchestrator (§4.4, §4.5): the read side of the
//! shuffle protocol. Shards compute, from a live membership and journal
//! snapshot, which partitions they must read and which peer coordinates
//! each one, then drive those reads through a back-pressured, priority
//! merged stream.

pub mod orchestrator;
pub mod read_builder;
pub mod resolver;
pub mod retry;

pub use orchestrator::{
    backoff, ActiveRead, MergeHeap, MergeReader, MergedDoc, ReadChannel, ReadChannelConsumer,
    ReadFault, ReadResult, ReadState, SendError, READ_CHAN_CAP,
};
pub use read_builder::{DrainSignal, ReadBuilder, ReadSpec};
pub use resolver::{Resolution, Resolver, StaticResolver};
pub use retry::{ExponentialBackoff, NoRetry, Retry};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Build(#[from] read_builder::Error),
    #[error(transparent)]
    Broker(#[from] gazette::Error),
    #[error(transparent)]
    Send(#[from] SendError),
    #[error("coordinator {0:?} is local; caller must subscribe in-process instead of calling run_read")]
    Local(proto_gazette::consumer::ShardId),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Drive one networked read: open the Shuffle RPC against `route`/`default`
/// and forward every response through `send_read_result` (§4.5 steps 3-4).
/// The local-coordinator subscription path (step 3, "if the coordinator is
/// local") is a deployment-topology concern of the consumer runtime this
/// crate doesn't host; callers running a shard's own coordinator in-process
/// feed it documents through the same `ReadChannel` directly instead of
/// calling this function.
pub async fn pump_networked_read(
    router: &gazette::Router,
    route: Option<&proto_gazette::broker::Route>,
    default: &proto_gazette::broker::ProcessSpecId,
    request: proto_gazette::shuffle::ShuffleRequest,
    channel: &mut ReadChannel,
) -> Result<()> {
    use futures::StreamExt;

    let mut stream = gazette::shuffle::open(router, route, default, request).await?;
    while let Some(item) = stream.next().await {
        let result = match item {
            Ok(resp) => ReadResult::Batch(resp),
            Err(err) => {
                tracing::warn!(%err, "shuffle read returned a transient error");
                ReadResult::Error(err.to_string())
            }
        };
        channel.send_read_result(result).await?;
    }
    Ok(())
}

/// Drive one `ActiveRead` through a single pass of the state machine (§4.5):
/// wait out the current attempt's backoff, resolve the coordinator, then
/// either stream a networked read to completion or hand back to the caller
/// for a local subscription. Mutates `active.state` and `active.attempt` in
/// place and returns the terminal state.
///
/// On `Closed` with a non-`None` error the caller is expected to rebuild
/// `active.spec` from the latest `ReadBuilder` snapshot (coordinators and
/// shuffles can change between attempts) and call `drive_read` again;
/// `active.attempt` has already been incremented for that retry's backoff.
/// `Closed` with `None` is a clean EOF and ends the read for good.
pub async fn drive_read<R: Resolver>(
    active: &mut ActiveRead,
    resolver: &R,
    router: &gazette::Router,
    default: &proto_gazette::broker::ProcessSpecId,
    request: proto_gazette::shuffle::ShuffleRequest,
    channel: &mut ReadChannel,
) -> ReadState {
    active.state = ReadState::Backoff {
        attempt: active.attempt,
    };
    let wait = orchestrator::backoff(active.attempt);
    if !wait.is_zero() {
        tokio::time::sleep(wait).await;
    }

    active.state = ReadState::Resolving;
    let route = match resolver.resolve(&active.spec.coordinator) {
        Ok(Resolution::Remote(route)) => route,
        Ok(Resolution::Local) => {
            active.state = ReadState::Closed {
                error: Some("coordinator is local; caller must subscribe in-process".to_string()),
            };
            return active.state.clone();
        }
        Err(err) => {
            active.attempt += 1;
            active.state = ReadState::Closed {
                error: Some(err.to_string()),
            };
            return active.state.clone();
        }
    };

    active.state = ReadState::Streaming;
    match pump_networked_read(router, Some(&route), default, request, channel).await {
        Ok(()) => {
            active.state = ReadState::Draining;
            active.attempt = 0;
            active.state = ReadState::Closed { error: None };
        }
        Err(err) => {
            active.attempt += 1;
            active.state = ReadState::Closed {
                error: Some(err.to_string()),
            };
        }
    }
    active.state.clone()
}

/// Drive one read to completion, rebuilding it from the latest `ReadBuilder`
/// snapshot each time it closes with a transient error (§4.5: a
/// `Closed { error: Some(_) }` read "re-creates it from the latest
/// ReadBuilder snapshot... with attempt incremented") until it closes clean.
/// `request_for` builds the wire request for the (possibly rebuilt) spec on
/// each attempt; `shuffle`/`journal` are the inputs `rebuild_read` recomputes
/// the coordinator and read delay from.
///
/// Coordinators that resolve to `Resolution::Local` aren't retried here: the
/// caller owns the in-process subscription path (see `drive_read`'s doc), so
/// `run_read` checks the resolver itself before each attempt and returns
/// `Error::Local` rather than looping forever on a read `drive_read` will
/// never advance past RESOLVING.
pub async fn run_read<R: Resolver>(
    active: &mut ActiveRead,
    builder: &ReadBuilder,
    topology: &member_topology::Topology,
    shuffle: &models::Shuffle,
    journal: &proto_gazette::broker::JournalSpec,
    resolver: &R,
    router: &gazette::Router,
    default: &proto_gazette::broker::ProcessSpecId,
    request_for: impl Fn(&ReadSpec) -> proto_gazette::shuffle::ShuffleRequest,
    channel: &mut ReadChannel,
) -> Result<()> {
    loop {
        if matches!(resolver.resolve(&active.spec.coordinator), Ok(Resolution::Local)) {
            return Err(Error::Local(active.spec.coordinator.clone()));
        }

        let request = request_for(&active.spec);
        match drive_read(active, resolver, router, default, request, channel).await {
            ReadState::Closed { error: None } => return Ok(()),
            ReadState::Closed { error: Some(err) } => {
                tracing::info!(
                    journal = %active.spec.target_journal,
                    attempt = active.attempt,
                    %err,
                    "read closed; rebuilding from latest snapshot",
                );
                active.spec = builder.rebuild_read(topology, shuffle, journal)?;
            }
            other => unreachable!("drive_read always returns a terminal Closed state, got {other:?}"),
        }
    }
}

/// Replay iterator (§4.5 "Replay"): retries `journal` reads from `begin` up
/// to `end` with `retry`'s backoff on transient broker errors, resuming at
/// the last advanced offset. Replay applies no read delay.
pub struct ReplayRead<R: Retry> {
    router: gazette::Router,
    default: proto_gazette::broker::ProcessSpecId,
    journal: String,
    offset: i64,
    end_offset: i64,
    attempt: u32,
    retry: R,
}

impl<R: Retry> ReplayRead<R> {
    pub fn new(
        router: gazette::Router,
        default: proto_gazette::broker::ProcessSpecId,
        journal: String,
        begin: i64,
        end: i64,
        retry: R,
    ) -> Self {
        Self {
            router,
            default,
            journal,
            offset: begin,
            end_offset: end,
            attempt: 0,
            retry,
        }
    }

    /// Fetch the next chunk, retrying transient broker errors per `retry`'s
    /// policy, and advancing `self.offset` on success.
    pub async fn next_chunk(&mut self) -> Result<Option<proto_gazette::broker::ReadResponse>> {
        use futures::StreamExt;

        if self.offset >= self.end_offset && self.end_offset != 0 {
            return Ok(None);
        }

        loop {
            let stream = gazette::journal::read(
                &self.router,
                &self.default,
                self.journal.clone(),
                self.offset,
                self.end_offset,
            )
            .await;

            let mut stream = match stream {
                Ok(s) => s,
                Err(err) => {
                    if self.wait_for_retry(&err).await {
                        continue;
                    }
                    return Err(Error::Broker(err));
                }
            };

            match stream.next().await {
                Some(Ok(resp)) => {
                    self.offset = resp.offset + resp.content.len() as i64;
                    self.attempt = 0;
                    self.retry.reset();
                    return Ok(Some(resp));
                }
                Some(Err(err)) => {
                    if self.wait_for_retry(&err).await {
                        continue;
                    }
                    return Err(Error::Broker(err));
                }
                None => return Ok(None),
            }
        }
    }

    /// Advance `attempt`, consult `retry`'s policy, and sleep if it grants
    /// another attempt. Returns whether the caller should retry.
    async fn wait_for_retry(&mut self, err: &gazette::Error) -> bool {
        self.attempt += 1;
        match self.retry.next_backoff(self.attempt) {
            Some(wait) => {
                tracing::debug!(attempt = self.attempt, %err, ?wait, "replay read retrying after transient error");
                tokio::time::sleep(wait).await;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use proto_gazette::broker::{ProcessSpecId, Route};
    use proto_gazette::consumer::ShardId;
    use proto_gazette::flow::RangeSpec;
    use proto_gazette::shuffle::ShuffleRequest;

    fn spec(coordinator: &str) -> read_builder::ReadSpec {
        read_builder::ReadSpec {
            source_journal: "acmeCo/orders/part=0".to_string(),
            target_journal: "acmeCo/orders/part=0;fromOrders".to_string(),
            shuffle: models::Shuffle {
                source_collection: models::Collection::new("acmeCo/orders"),
                group_name: "fromOrders".to_string(),
                shuffle_key_ptrs: vec!["/id".to_string()],
                uses_source_key: true,
                read_delay_seconds: 0,
                priority: 0,
                source_partitions: None,
                source_schema: None,
            },
            coordinator: ShardId(coordinator.to_string()),
            build: "build-1".to_string(),
            replay: false,
            end_offset: 0,
            read_delay: clock::ReadDelay::default(),
        }
    }

    fn request(spec: &read_builder::ReadSpec) -> ShuffleRequest {
        ShuffleRequest {
            journal: spec.target_journal.clone(),
            coordinator: spec.coordinator.clone(),
            build: spec.build.clone(),
            range: RangeSpec {
                key_begin: 0,
                key_end: u32::MAX,
                r_clock_begin: 0,
                r_clock_end: u32::MAX,
            },
            offset: 0,
            end_offset: 0,
            source_schema: None,
            partition_include: Default::default(),
            partition_exclude: Default::default(),
            resolution_header: None,
        }
    }

    #[tokio::test]
    async fn test_drive_read_local_coordinator_closes_without_dialing() {
        let s = spec("local/shard");
        let mut active = ActiveRead::new(s.clone());
        let resolver = StaticResolver::new([ShardId("local/shard".to_string())], Route::default());
        let router = gazette::Router::new("local-zone");
        let default = ProcessSpecId {
            zone: "local-zone".to_string(),
            suffix: "127.0.0.1:1".to_string(),
        };
        let (mut channel, _consumer) = ReadChannel::new();

        let req = request(&s);
        let state = drive_read(&mut active, &resolver, &router, &default, req, &mut channel).await;
        assert!(matches!(state, ReadState::Closed { error: Some(_) }));
        assert_eq!(active.attempt, 0);
    }

    #[tokio::test]
    async fn test_drive_read_unresolvable_coordinator_increments_attempt() {
        let s = spec("remote/shard");
        let mut active = ActiveRead::new(s.clone());

        struct AlwaysFails;
        impl Resolver for AlwaysFails {
            fn resolve(&self, coordinator: &ShardId) -> std::result::Result<Resolution, resolver::Error> {
                Err(resolver::Error::Unavailable(
                    coordinator.clone(),
                    "no route known".to_string(),
                ))
            }
        }

        let router = gazette::Router::new("local-zone");
        let default = ProcessSpecId {
            zone: "local-zone".to_string(),
            suffix: "127.0.0.1:1".to_string(),
        };
        let (mut channel, _consumer) = ReadChannel::new();

        let req = request(&s);
        let state = drive_read(
            &mut active,
            &AlwaysFails,
            &router,
            &default,
            req,
            &mut channel,
        )
        .await;
        assert!(matches!(state, ReadState::Closed { error: Some(_) }));
        assert_eq!(active.attempt, 1);
    }

    #[tokio::test]
    async fn test_drive_read_remote_dial_failure_closes_with_error() {
        let s = spec("remote/shard");
        let mut active = ActiveRead::new(s.clone());
        let resolver = StaticResolver::new(std::iter::empty(), Route::default());
        let router = gazette::Router::new("local-zone");
        // Port 1 is reserved and never accepts connections; the dial fails
        // quickly instead of hanging for the full connect timeout.
        let default = ProcessSpecId {
            zone: "local-zone".to_string(),
            suffix: "127.0.0.1:1".to_string(),
        };
        let (mut channel, _consumer) = ReadChannel::new();

        let req = request(&s);
        let state = tokio::time::timeout(
            std::time::Duration::from_secs(10),
            drive_read(&mut active, &resolver, &router, &default, req, &mut channel),
        )
        .await
        .expect("drive_read must not hang past the Router's own connect timeout");

        assert!(matches!(state, ReadState::Closed { error: Some(_) }));
        assert_eq!(active.attempt, 1);
    }
}
