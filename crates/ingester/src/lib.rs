//! The Ingester (§4.3): accepts concurrent ingest sessions, combines
//! documents in memory by collection key, maps each combined document to a
//! journal, publishes it through a shared sequenced publisher, and
//! serializes acknowledgements into one shared commit per batch.

pub mod commit;
pub mod config;
pub mod mapper;
mod publisher;

pub use config::{AckIntentSink, IngesterConfig, NoopAckIntentSink};
pub use mapper::{InMemoryMapper, Mapper};
pub use publisher::{IngestPublisher, Published};

use commit::IngestCommit;
use models::{Collection, CollectionSpec};
use proto_gazette::broker::ProcessSpecId;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, Notify};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("collection {0:?} is not ingestable (unknown to the catalog)")]
    NotIngestable(Collection),
    #[error(transparent)]
    Combine(#[from] combine::Error),
    #[error(transparent)]
    Map(#[from] mapper::Error),
    #[error(transparent)]
    Broker(#[from] gazette::Error),
    #[error("the ingester is exiting and cannot accept new ingestions")]
    IngesterExiting,
}

pub type Result<T> = std::result::Result<T, Error>;

/// Resolves collection names to their catalog specification. A full
/// catalog build/load pipeline is out of scope here (models crate doc
/// comment); callers supply whatever static or dynamically-refreshed
/// lookup their deployment needs.
pub trait Catalog: Send + Sync {
    fn collection(&self, name: &Collection) -> Option<CollectionSpec>;
}

/// A `Catalog` backed by a fixed, in-memory map — the common case for
/// tests and single-build deployments.
#[derive(Default)]
pub struct StaticCatalog(HashMap<Collection, CollectionSpec>);

impl StaticCatalog {
    pub fn new(specs: impl IntoIterator<Item = CollectionSpec>) -> Self {
        Self(specs.into_iter().map(|s| (s.name.clone(), s)).collect())
    }
}

impl Catalog for StaticCatalog {
    fn collection(&self, name: &Collection) -> Option<CollectionSpec> {
        self.0.get(name).cloned()
    }
}

struct Shared {
    publisher: AsyncMutex<IngestPublisher>,
    current: std::sync::Mutex<Arc<IngestCommit>>,
    wake: Notify,
    exited: AtomicBool,
    config: IngesterConfig,
    ack_sink: Arc<dyn AckIntentSink>,
}

/// The Ingester itself: a handle to the shared publisher hand-off and the
/// perpetual background commit loop (§4.3 Concurrency structure).
#[derive(Clone)]
pub struct Ingester {
    shared: Arc<Shared>,
    catalog: Arc<dyn Catalog>,
}

impl Ingester {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        mapper: Arc<dyn Mapper>,
        router: gazette::Router,
        default: ProcessSpecId,
        test_delta_millis: i64,
    ) -> Self {
        Self::with_config(
            catalog,
            mapper,
            router,
            default,
            test_delta_millis,
            IngesterConfig::default(),
            Arc::new(NoopAckIntentSink),
        )
    }

    pub fn with_config(
        catalog: Arc<dyn Catalog>,
        mapper: Arc<dyn Mapper>,
        router: gazette::Router,
        default: ProcessSpecId,
        test_delta_millis: i64,
        config: IngesterConfig,
        ack_sink: Arc<dyn AckIntentSink>,
    ) -> Self {
        let shared = Arc::new(Shared {
            publisher: AsyncMutex::new(IngestPublisher::new(
                mapper,
                router.clone(),
                default.clone(),
                test_delta_millis,
            )),
            current: std::sync::Mutex::new(Arc::new(IngestCommit::new())),
            wake: Notify::new(),
            exited: AtomicBool::new(false),
            config,
            ack_sink,
        });

        tokio::spawn(commit_loop(shared.clone(), router, default));

        Self { shared, catalog }
    }

    /// Begin a new Ingestion. Never blocks (§4.3 `start()`).
    pub fn start(&self) -> Ingestion {
        Ingestion {
            combiners: HashMap::new(),
            offsets: HashMap::new(),
            commit: None,
        }
    }

    fn current_commit(&self) -> Arc<IngestCommit> {
        self.shared.current.lock().unwrap().clone()
    }
}

async fn commit_loop(shared: Arc<Shared>, router: gazette::Router, default: ProcessSpecId) {
    loop {
        let publisher = shared.publisher.lock().await;

        if publisher.is_failed() {
            shared.exited.store(true, Ordering::Release);
            shared.current.lock().unwrap().resolve(Err(
                "ingester is exiting: the publisher is poisoned".to_string(),
            ));
            return;
        }

        let commit = { shared.current.lock().unwrap().clone() };
        let journals = commit.touched_journals();

        if journals.is_empty() {
            drop(publisher);
            shared.wake.notified().await;
            continue;
        }

        for journal in journals {
            let ack_journal = format!("{journal};ack");
            let result =
                gazette::journal::append_once(&router, &default, ack_journal, Vec::new()).await;
            match result {
                Ok(resp) => {
                    commit.record_offset(&journal, resp.commit_end_offset);
                    if !shared.config.eager_ack_commit {
                        // Best-effort durability hook (§9 Open Questions); this
                        // crate's broker model has no store beyond the journal
                        // append itself, so a failure here doesn't block the commit.
                        if let Err(err) = shared.ack_sink.fsync(&journal).await {
                            tracing::warn!(%journal, %err, "ack intent sink fsync failed");
                        }
                    }
                }
                Err(err) => {
                    commit.resolve(Err(err.to_string()));
                    drop(publisher);
                    shared.exited.store(true, Ordering::Release);
                    return;
                }
            }
        }
        commit.resolve(Ok(()));

        *shared.current.lock().unwrap() = Arc::new(IngestCommit::new());
        drop(publisher);
    }
}

/// One in-flight ingest session: `collection.add` zero or more documents,
/// then `prepare_and_await` to combine, publish, and durably commit them.
pub struct Ingestion {
    combiners: HashMap<Collection, (CollectionSpec, combine::Accumulator)>,
    offsets: HashMap<String, i64>,
    commit: Option<Arc<IngestCommit>>,
}

impl Ingestion {
    /// Add one document's bytes to `collection`'s open combiner, looking up
    /// and opening the combiner on first use (§4.3 `ingestion.add`).
    pub fn add(
        &mut self,
        ingester: &Ingester,
        collection: Collection,
        document: serde_json::Value,
    ) -> Result<()> {
        if let Some((_, acc)) = self.combiners.get_mut(&collection) {
            acc.add(document)?;
            return Ok(());
        }

        let spec = ingester
            .catalog
            .collection(&collection)
            .ok_or_else(|| Error::NotIngestable(collection.clone()))?;

        let key_ptrs = spec.key.iter().map(|p| p.as_str().to_string()).collect();
        let partition_ptrs = spec
            .partition_fields
            .iter()
            .map(|f| f.location.as_str().to_string())
            .collect();

        let mut acc = combine::Accumulator::new(combine::Spec::new(key_ptrs, partition_ptrs));
        acc.add(document)?;
        self.combiners.insert(collection, (spec, acc));
        Ok(())
    }

    /// Close every open combiner, publish their reduced documents, and join
    /// the currently-pending commit (§4.3 `ingestion.prepare`).
    pub async fn prepare(&mut self, ingester: &Ingester) -> Result<()> {
        if ingester.shared.exited.load(Ordering::Acquire) {
            return Err(Error::IngesterExiting);
        }

        let mut drained = Vec::with_capacity(self.combiners.len());
        for (_, (spec, acc)) in self.combiners.drain() {
            drained.push((spec, acc.drain()?));
        }

        let publisher = ingester.shared.publisher.lock().await;
        if publisher.is_failed() {
            return Err(Error::IngesterExiting);
        }

        let commit = ingester.current_commit();

        for (spec, docs) in drained {
            for doc in docs {
                match publisher.publish_uncommitted(&spec, doc).await {
                    Ok(published) => {
                        commit.touch(&published.journal);
                        self.offsets.insert(published.journal, 0);
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        self.commit = Some(commit);
        drop(publisher);
        ingester.shared.wake.notify_one();
        Ok(())
    }

    /// Wait for this ingestion's commit to resolve and return each written
    /// journal's resulting end offset (§4.3 `ingestion.await`).
    pub async fn wait(&self) -> Result<HashMap<String, i64>> {
        let commit = self
            .commit
            .as_ref()
            .expect("prepare must be called before wait");

        commit
            .ack_commit()
            .await
            .map_err(|_| Error::IngesterExiting)?;

        let mut offsets = HashMap::with_capacity(self.offsets.len());
        for journal in self.offsets.keys() {
            let offset = commit.offset(journal).unwrap_or_default();
            offsets.insert(journal.clone(), offset);
        }
        Ok(offsets)
    }

    pub async fn prepare_and_await(&mut self, ingester: &Ingester) -> Result<HashMap<String, i64>> {
        self.prepare(ingester).await?;
        self.wait().await
    }
}
