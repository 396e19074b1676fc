use std::sync::{Arc, Mutex, MutexGuard, TryLockError};

use chainlog_crypto::ChainHasher;
use chainlog_store::LedgerStore;
use chainlog_types::{Digest, EntryId, LedgerEntry, Metadata, GENESIS_SENTINEL};
use chrono::Utc;
use tracing::{debug, warn};

use crate::error::LedgerError;

/// Event data for a new ledger entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppendRequest {
    pub document_id: String,
    pub actor_id: String,
    pub payload_hash: Digest,
    pub metadata: Metadata,
    /// Chain hash the caller expects. Never trusted; the appender always
    /// derives the hash itself.
    pub chain_hash_hint: Option<Digest>,
}

impl AppendRequest {
    pub fn new(
        document_id: impl Into<String>,
        actor_id: impl Into<String>,
        payload_hash: Digest,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            actor_id: actor_id.into(),
            payload_hash,
            metadata: Metadata::new(),
            chain_hash_hint: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add a single metadata pair.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn with_chain_hash_hint(mut self, hint: Digest) -> Self {
        self.chain_hash_hint = Some(hint);
        self
    }
}

/// The ledger's only write path.
///
/// A single mutex scoped to the whole ledger is held from the tail read until
/// the store acknowledges the new entry, so no two appends can derive their
/// link from the same tail. The lock is held across store I/O.
pub struct ChainAppender<S> {
    store: Arc<S>,
    lock: Mutex<()>,
}

impl<S: LedgerStore> ChainAppender<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            lock: Mutex::new(()),
        }
    }

    /// Append an entry, waiting for any in-flight append to finish.
    pub fn append(
        &self,
        document_id: &str,
        actor_id: &str,
        payload_hash: Digest,
        metadata: Metadata,
    ) -> Result<LedgerEntry, LedgerError> {
        let request =
            AppendRequest::new(document_id, actor_id, payload_hash).with_metadata(metadata);
        self.append_request(&request)
    }

    pub fn append_request(&self, request: &AppendRequest) -> Result<LedgerEntry, LedgerError> {
        check_request(request)?;
        let _held = self.lock.lock().unwrap_or_else(|poisoned| {
            warn!("ledger append lock poisoned; recovering");
            poisoned.into_inner()
        });
        self.commit(request)
    }

    /// Like [`append_request`](Self::append_request), but fails with
    /// [`LedgerError::Busy`] instead of waiting for the ledger lock.
    pub fn try_append(&self, request: &AppendRequest) -> Result<LedgerEntry, LedgerError> {
        check_request(request)?;
        let _held: MutexGuard<'_, ()> = match self.lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(LedgerError::Busy),
            Err(TryLockError::Poisoned(poisoned)) => {
                warn!("ledger append lock poisoned; recovering");
                poisoned.into_inner()
            }
        };
        self.commit(request)
    }

    /// Derive and persist the next entry. Caller holds the ledger lock.
    fn commit(&self, request: &AppendRequest) -> Result<LedgerEntry, LedgerError> {
        let tail = self.store.tail()?;
        let (sequence_id, previous_hash) = match &tail {
            None => (1, GENESIS_SENTINEL),
            Some(tail) => (tail.sequence_id + 1, tail.chain_hash),
        };

        let chain_hash = ChainHasher::chain_hash(
            &previous_hash,
            &request.payload_hash,
            &request.metadata,
            &request.actor_id,
        );
        if let Some(hint) = request.chain_hash_hint.filter(|hint| *hint != chain_hash) {
            debug!(
                hint = %hint.short_hex(),
                derived = %chain_hash.short_hex(),
                "ignoring caller-supplied chain hash"
            );
        }

        // Clamp so timestamps never run backwards along the chain.
        let now = Utc::now();
        let created_at = tail.map_or(now, |tail| now.max(tail.created_at));

        let entry = LedgerEntry {
            entry_id: EntryId::new(),
            sequence_id,
            document_id: request.document_id.clone(),
            actor_id: request.actor_id.clone(),
            payload_hash: request.payload_hash,
            metadata: request.metadata.clone(),
            previous_hash,
            chain_hash,
            created_at,
        };
        self.store.append_only(&entry)?;

        debug!(
            seq = entry.sequence_id,
            document = %entry.document_id,
            actor = %entry.actor_id,
            hash = %entry.chain_hash.short_hex(),
            "ledger entry appended"
        );
        Ok(entry)
    }
}

fn check_request(request: &AppendRequest) -> Result<(), LedgerError> {
    if request.payload_hash.is_zero() {
        return Err(LedgerError::EmptyPayloadHash);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::thread;

    use chainlog_crypto::ChainWalker;
    use chainlog_store::{EntryIter, InMemoryLedgerStore, StoreError, StoreResult};

    use super::*;

    fn request(document_id: &str) -> AppendRequest {
        AppendRequest::new(document_id, "USR-1", ChainHasher::sha256(document_id.as_bytes()))
    }

    fn entries(store: &InMemoryLedgerStore) -> Vec<LedgerEntry> {
        store
            .scan_ordered()
            .unwrap()
            .collect::<StoreResult<_>>()
            .unwrap()
    }

    /// Store whose first `failures` inserts fail with an I/O error.
    struct FlakyStore {
        inner: InMemoryLedgerStore,
        failures: AtomicUsize,
    }

    /// Store whose inserts block until the test releases them.
    struct GatedStore {
        inner: InMemoryLedgerStore,
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl LedgerStore for FlakyStore {
        fn append_only(&self, entry: &LedgerEntry) -> StoreResult<EntryId> {
            let remaining = self.failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.failures.store(remaining - 1, Ordering::SeqCst);
                return Err(StoreError::Io(std::io::Error::other("disk full")));
            }
            self.inner.append_only(entry)
        }
        fn scan_ordered(&self) -> StoreResult<EntryIter<'_>> {
            self.inner.scan_ordered()
        }
        fn tail(&self) -> StoreResult<Option<LedgerEntry>> {
            self.inner.tail()
        }
        fn get(&self, entry_id: &EntryId) -> StoreResult<Option<LedgerEntry>> {
            self.inner.get(entry_id)
        }
        fn len(&self) -> StoreResult<u64> {
            self.inner.len()
        }
    }

    impl LedgerStore for GatedStore {
        fn append_only(&self, entry: &LedgerEntry) -> StoreResult<EntryId> {
            self.entered.lock().unwrap().send(()).unwrap();
            self.release.lock().unwrap().recv().unwrap();
            self.inner.append_only(entry)
        }
        fn scan_ordered(&self) -> StoreResult<EntryIter<'_>> {
            self.inner.scan_ordered()
        }
        fn tail(&self) -> StoreResult<Option<LedgerEntry>> {
            self.inner.tail()
        }
        fn get(&self, entry_id: &EntryId) -> StoreResult<Option<LedgerEntry>> {
            self.inner.get(entry_id)
        }
        fn len(&self) -> StoreResult<u64> {
            self.inner.len()
        }
    }

    #[test]
    fn genesis_then_linked_entries() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let appender = ChainAppender::new(Arc::clone(&store));

        let first = appender.append_request(&request("DOC-1")).unwrap();
        assert_eq!(first.sequence_id, 1);
        assert_eq!(first.previous_hash, GENESIS_SENTINEL);

        let second = appender.append_request(&request("DOC-2")).unwrap();
        assert_eq!(second.sequence_id, 2);
        assert_eq!(second.previous_hash, first.chain_hash);
        assert_eq!(ChainHasher::recompute(&second), second.chain_hash);

        assert_eq!(ChainWalker::verify_chain(&entries(&store)), Ok(2));
    }

    #[test]
    fn chain_hash_hint_is_never_used() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let appender = ChainAppender::new(Arc::clone(&store));

        let forged = Digest::from_hash([0x42; 32]);
        let entry = appender
            .append_request(&request("DOC-1").with_chain_hash_hint(forged))
            .unwrap();
        assert_ne!(entry.chain_hash, forged);
        assert_eq!(entry.chain_hash, ChainHasher::recompute(&entry));
    }

    #[test]
    fn rejects_empty_payload_hash() {
        let appender = ChainAppender::new(Arc::new(InMemoryLedgerStore::new()));
        let err = appender
            .append("DOC-1", "USR-1", Digest::zero(), Metadata::new())
            .unwrap_err();
        assert!(matches!(err, LedgerError::EmptyPayloadHash));
    }

    #[test]
    fn timestamps_never_decrease() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let appender = ChainAppender::new(Arc::clone(&store));
        for i in 0..20 {
            appender.append_request(&request(&format!("DOC-{i}"))).unwrap();
        }
        let chain = entries(&store);
        assert!(chain.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[test]
    fn persistence_failure_releases_lock_and_is_retryable() {
        let store = Arc::new(FlakyStore {
            inner: InMemoryLedgerStore::new(),
            failures: AtomicUsize::new(1),
        });
        let appender = ChainAppender::new(Arc::clone(&store));

        let err = appender.append_request(&request("DOC-1")).unwrap_err();
        assert!(matches!(err, LedgerError::Persistence(StoreError::Io(_))));
        assert!(err.is_retryable());
        assert!(store.inner.is_empty().unwrap());

        let entry = appender.try_append(&request("DOC-1")).unwrap();
        assert_eq!(entry.sequence_id, 1);
        assert_eq!(entry.previous_hash, GENESIS_SENTINEL);
    }

    #[test]
    fn try_append_reports_busy_while_an_append_is_in_flight() {
        let (entered_tx, entered_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel();
        let store = Arc::new(GatedStore {
            inner: InMemoryLedgerStore::new(),
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let appender = ChainAppender::new(Arc::clone(&store));

        thread::scope(|s| {
            let in_flight = s.spawn(|| appender.append_request(&request("DOC-1")));
            entered_rx.recv().unwrap();

            let err = appender.try_append(&request("DOC-2")).unwrap_err();
            assert!(matches!(err, LedgerError::Busy));

            release_tx.send(()).unwrap();
            assert_eq!(in_flight.join().unwrap().unwrap().sequence_id, 1);
        });
        assert_eq!(store.inner.len().unwrap(), 1);
    }

    #[test]
    fn concurrent_appends_form_one_chain() {
        let store = Arc::new(InMemoryLedgerStore::new());
        let appender = ChainAppender::new(Arc::clone(&store));

        thread::scope(|s| {
            for t in 0..8 {
                let appender = &appender;
                s.spawn(move || {
                    for i in 0..25 {
                        appender
                            .append_request(&request(&format!("DOC-{t}-{i}")))
                            .unwrap();
                    }
                });
            }
        });

        let chain = entries(&store);
        assert_eq!(ChainWalker::verify_chain(&chain), Ok(200));
    }
}
