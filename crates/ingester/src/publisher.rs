//! IngestPublisher: the shared, sequenced publisher ingestions acquire
//! transiently to append their combined documents (§4.3, §5).

use crate::mapper::Mapper;
use crate::Error;
use models::CollectionSpec;
use proto_gazette::broker::ProcessSpecId;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct IngestPublisher {
    clock: clock::Generator,
    mapper: Arc<dyn Mapper>,
    router: gazette::Router,
    default: ProcessSpecId,
    failed: AtomicBool,
}

/// A document published but not yet acknowledged: its target journal and
/// the clock value sequenced into it.
pub struct Published {
    pub journal: String,
    pub clock: clock::Clock,
}

impl IngestPublisher {
    pub fn new(
        mapper: Arc<dyn Mapper>,
        router: gazette::Router,
        default: ProcessSpecId,
        test_delta_millis: i64,
    ) -> Self {
        Self {
            clock: clock::Generator::with_test_delta(test_delta_millis),
            mapper,
            router,
            default,
            failed: AtomicBool::new(false),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    /// Poison the publisher: every ingestion touching it from now on fails
    /// with `IngesterExiting` (§4.3 Failure semantics).
    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::Release);
    }

    /// Map `drained` to a journal and append it uncommitted, returning the
    /// journal and the clock this document was sequenced with. The append
    /// itself resolves immediately in this crate's simplified broker model;
    /// production Gazette instead leaves it pending until a later ack
    /// intent with a `wait_for` clause commits it, making the write
    /// invisible to readers until then.
    pub async fn publish_uncommitted(
        &self,
        collection: &CollectionSpec,
        drained: combine::Drained,
    ) -> Result<Published, Error> {
        if self.is_failed() {
            return Err(Error::IngesterExiting);
        }

        let partitions: Vec<(&str, &Value)> = collection
            .partition_fields
            .iter()
            .zip(drained.partitions.iter())
            .map(|(f, v)| (f.field.as_str(), v))
            .collect();

        let content_address = (xxhash_rust::xxh3::xxh3_64(&drained.packed_key) & 0xffff_ffff) as u32;

        let journal = self
            .mapper
            .map(collection, &partitions, content_address)
            .await
            .map_err(Error::Map)?;

        let clock = self.clock.next();
        let mut document = drained.document;
        if let Some(uuid_ptr) = &collection.uuid_ptr {
            if let Some(slot) = document.pointer_mut(uuid_ptr) {
                *slot = Value::String(format!("{:016x}-0000-1000-8000-000000000000", clock.as_u64()));
            }
        }

        let content = serde_json::to_vec(&document).expect("Value always serializes");

        match gazette::journal::append_once(&self.router, &self.default, journal.clone(), content)
            .await
        {
            Ok(_resp) => Ok(Published { journal, clock }),
            Err(err) => {
                self.mark_failed();
                Err(Error::Broker(err))
            }
        }
    }
}
