//! Runtime-tunable ingester policy (§9 Open Questions: ack-commit
//! resolution timing). Plain struct fields with a `Default` impl rather
//! than global statics, so tests can override them per-case.

use async_trait::async_trait;

/// Hook point a production hardening pass would wire to a durable store
/// before an ack intent is considered committed. This crate's broker model
/// has no separate durable store from the journal append itself, so the
/// default `NoopAckIntentSink` always resolves immediately regardless of
/// [`IngesterConfig::eager_ack_commit`].
#[async_trait]
pub trait AckIntentSink: Send + Sync {
    async fn fsync(&self, journal: &str) -> std::io::Result<()>;
}

#[derive(Default)]
pub struct NoopAckIntentSink;

#[async_trait]
impl AckIntentSink for NoopAckIntentSink {
    async fn fsync(&self, _journal: &str) -> std::io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct IngesterConfig {
    /// When true (the spec's documented default), the commit loop resolves
    /// each round's `ack_commit` as soon as every touched journal's ack
    /// intent has been appended. When false, the commit loop additionally
    /// calls the configured `AckIntentSink::fsync` per journal first — a
    /// hook a production deployment backed by a real durable store would use
    /// to delay resolution until the intent is durably flushed.
    pub eager_ack_commit: bool,
}

impl Default for IngesterConfig {
    fn default() -> Self {
        Self {
            eager_ack_commit: true,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_default_is_eager() {
        assert!(IngesterConfig::default().eager_ack_commit);
    }

    #[tokio::test]
    async fn test_noop_sink_always_succeeds() {
        let sink = NoopAckIntentSink;
        assert!(sink.fsync("any/journal").await.is_ok());
    }
}
