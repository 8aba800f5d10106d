//! IngestCommit: the batch of journals a single commit round touches, and
//! the shared result every ingestion in that round awaits (§4.3).

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::watch;

type AckResult = Result<(), String>;

pub struct IngestCommit {
    touched: Mutex<HashSet<String>>,
    offsets: Mutex<HashMap<String, i64>>,
    tx: watch::Sender<Option<AckResult>>,
    rx: watch::Receiver<Option<AckResult>>,
}

impl IngestCommit {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            touched: Mutex::new(HashSet::new()),
            offsets: Mutex::new(HashMap::new()),
            tx,
            rx,
        }
    }

    /// Record that this round's batch must append an ack intent to `journal`.
    pub fn touch(&self, journal: &str) {
        self.touched.lock().unwrap().insert(journal.to_string());
    }

    pub fn touched_journals(&self) -> Vec<String> {
        self.touched.lock().unwrap().iter().cloned().collect()
    }

    pub fn record_offset(&self, journal: &str, offset: i64) {
        self.offsets.lock().unwrap().insert(journal.to_string(), offset);
    }

    pub fn offset(&self, journal: &str) -> Option<i64> {
        self.offsets.lock().unwrap().get(journal).copied()
    }

    /// Resolve this commit's ack for every waiter. Idempotent: only the
    /// first call has an effect.
    pub fn resolve(&self, result: AckResult) {
        let _ = self.tx.send_if_modified(|v| {
            if v.is_none() {
                *v = Some(result);
                true
            } else {
                false
            }
        });
    }

    /// Wait for this round's commit to resolve.
    pub async fn ack_commit(&self) -> AckResult {
        let mut rx = self.rx.clone();
        loop {
            if let Some(result) = rx.borrow().clone() {
                return result;
            }
            if rx.changed().await.is_err() {
                return Err("commit was dropped before resolving".to_string());
            }
        }
    }
}

impl Default for IngestCommit {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn test_multiple_waiters_observe_the_same_result() {
        let commit = std::sync::Arc::new(IngestCommit::new());
        commit.touch("a/journal");
        commit.record_offset("a/journal", 128);

        let waiters: Vec<_> = (0..4)
            .map(|_| {
                let commit = commit.clone();
                tokio::spawn(async move { commit.ack_commit().await })
            })
            .collect();

        commit.resolve(Ok(()));

        for w in waiters {
            assert_eq!(w.await.unwrap(), Ok(()));
        }
        assert_eq!(commit.offset("a/journal"), Some(128));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let commit = IngestCommit::new();
        commit.resolve(Ok(()));
        commit.resolve(Err("should not win".to_string()));
        assert_eq!(*commit.rx.borrow(), Some(Ok(())));
    }
}
