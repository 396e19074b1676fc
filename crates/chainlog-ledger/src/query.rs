use std::sync::Arc;

use chainlog_store::LedgerStore;
use chainlog_types::{EntryId, LedgerEntry};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Lazy, ordered sequence of entries produced by a query.
///
/// Each query call starts a fresh scan, so a stream can be restarted by
/// issuing the query again.
pub type EntryStream<'a> = Box<dyn Iterator<Item = Result<LedgerEntry, LedgerError>> + Send + 'a>;

/// Aggregate view of the ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStatistics {
    pub total_entries: u64,
    pub first_entry_timestamp: Option<DateTime<Utc>>,
    pub last_entry_timestamp: Option<DateTime<Utc>>,
    /// Sequence id of the tail entry.
    pub chain_length: u64,
}

/// Read-only projections over a ledger store. Never writes, never locks.
pub struct LedgerQueryService<S> {
    store: Arc<S>,
}

impl<S: LedgerStore> LedgerQueryService<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn get_entry(&self, entry_id: &EntryId) -> Result<LedgerEntry, LedgerError> {
        self.store
            .get(entry_id)?
            .ok_or(LedgerError::NotFound(*entry_id))
    }

    /// Every entry concerning `document_id`, in sequence order.
    pub fn query_by_document(&self, document_id: &str) -> Result<EntryStream<'_>, LedgerError> {
        let document_id = document_id.to_owned();
        self.filtered(move |entry| entry.document_id == document_id)
    }

    /// Every entry recorded by `actor_id`, in sequence order.
    pub fn query_by_actor(&self, actor_id: &str) -> Result<EntryStream<'_>, LedgerError> {
        let actor_id = actor_id.to_owned();
        self.filtered(move |entry| entry.actor_id == actor_id)
    }

    /// Entries with `from <= sequence_id <= to`.
    pub fn query_range(&self, from: u64, to: u64) -> Result<EntryStream<'_>, LedgerError> {
        if from == 0 || from > to {
            return Err(LedgerError::InvalidRange { from, to });
        }
        let scan = self.store.scan_ordered()?;
        Ok(Box::new(
            scan.take_while(move |item| !matches!(item, Ok(entry) if entry.sequence_id > to))
                .filter_map(move |item| match item {
                    Ok(entry) if entry.sequence_id < from => None,
                    Ok(entry) => Some(Ok(entry)),
                    Err(err) => Some(Err(err.into())),
                }),
        ))
    }

    /// Entries created within `[start, end]`. An inverted window matches nothing.
    pub fn query_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<EntryStream<'_>, LedgerError> {
        self.filtered(move |entry| start <= entry.created_at && entry.created_at <= end)
    }

    /// The most recent entry, if any.
    pub fn head(&self) -> Result<Option<LedgerEntry>, LedgerError> {
        Ok(self.store.tail()?)
    }

    /// Aggregates computed from one scan snapshot, so concurrent appends
    /// never leave the counts disagreeing with each other.
    pub fn statistics(&self) -> Result<LedgerStatistics, LedgerError> {
        let mut stats = LedgerStatistics::default();
        for entry in self.store.scan_ordered()? {
            let entry = entry?;
            stats.total_entries += 1;
            stats.first_entry_timestamp.get_or_insert(entry.created_at);
            stats.last_entry_timestamp = Some(entry.created_at);
            stats.chain_length = entry.sequence_id;
        }
        Ok(stats)
    }

    fn filtered<F>(&self, keep: F) -> Result<EntryStream<'_>, LedgerError>
    where
        F: Fn(&LedgerEntry) -> bool + Send + 'static,
    {
        let scan = self.store.scan_ordered()?;
        Ok(Box::new(scan.filter_map(move |item| match item {
            Ok(entry) if keep(&entry) => Some(Ok(entry)),
            Ok(_) => None,
            Err(err) => Some(Err(err.into())),
        })))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chainlog_crypto::ChainHasher;
    use chainlog_store::{EntryIter, InMemoryLedgerStore, StoreResult};
    use chainlog_types::Metadata;

    use super::*;
    use crate::appender::ChainAppender;

    fn collect(stream: EntryStream<'_>) -> Vec<LedgerEntry> {
        stream.collect::<Result<_, _>>().unwrap()
    }

    fn service_with(
        rows: &[(&str, &str)],
    ) -> (LedgerQueryService<InMemoryLedgerStore>, Vec<LedgerEntry>) {
        let store = Arc::new(InMemoryLedgerStore::new());
        let appender = ChainAppender::new(Arc::clone(&store));
        let entries = rows
            .iter()
            .map(|(document_id, actor_id)| {
                appender
                    .append(
                        document_id,
                        actor_id,
                        ChainHasher::sha256(document_id.as_bytes()),
                        Metadata::new(),
                    )
                    .unwrap()
            })
            .collect();
        (LedgerQueryService::new(store), entries)
    }

    #[test]
    fn lookups_by_id() {
        let (service, entries) = service_with(&[("DOC-1", "USR-1")]);
        assert_eq!(service.get_entry(&entries[0].entry_id).unwrap(), entries[0]);

        let missing = EntryId::new();
        assert!(matches!(
            service.get_entry(&missing),
            Err(LedgerError::NotFound(id)) if id == missing
        ));
    }

    #[test]
    fn by_document_and_actor_keep_sequence_order() {
        let (service, entries) = service_with(&[
            ("DOC-1", "USR-1"),
            ("DOC-2", "USR-1"),
            ("DOC-1", "USR-2"),
            ("DOC-1", "USR-1"),
        ]);

        let doc = collect(service.query_by_document("DOC-1").unwrap());
        assert_eq!(
            doc.iter().map(|e| e.sequence_id).collect::<Vec<_>>(),
            vec![1, 3, 4]
        );

        let actor = collect(service.query_by_actor("USR-1").unwrap());
        assert_eq!(actor, vec![entries[0].clone(), entries[1].clone(), entries[3].clone()]);

        assert!(collect(service.query_by_document("DOC-404").unwrap()).is_empty());
    }

    #[test]
    fn queries_restart_from_the_beginning() {
        let (service, _) = service_with(&[("DOC-1", "USR-1"), ("DOC-1", "USR-2")]);
        let mut first = service.query_by_document("DOC-1").unwrap();
        first.next();
        assert_eq!(collect(service.query_by_document("DOC-1").unwrap()).len(), 2);
    }

    #[test]
    fn range_is_inclusive() {
        let rows = [("DOC-1", "USR-1"); 6];
        let (service, _) = service_with(&rows);
        let ids: Vec<_> = collect(service.query_range(2, 4).unwrap())
            .iter()
            .map(|e| e.sequence_id)
            .collect();
        assert_eq!(ids, vec![2, 3, 4]);
        assert_eq!(collect(service.query_range(5, 100).unwrap()).len(), 2);
    }

    #[test]
    fn invalid_ranges_are_rejected() {
        let (service, _) = service_with(&[]);
        assert!(matches!(
            service.query_range(0, 3),
            Err(LedgerError::InvalidRange { from: 0, to: 3 })
        ));
        assert!(matches!(
            service.query_range(4, 2),
            Err(LedgerError::InvalidRange { from: 4, to: 2 })
        ));
    }

    #[test]
    fn time_window() {
        let (service, entries) = service_with(&[("DOC-1", "USR-1"), ("DOC-2", "USR-1")]);
        let start = entries[0].created_at;
        let end = entries[1].created_at;

        assert_eq!(collect(service.query_between(start, end).unwrap()).len(), 2);
        assert!(collect(service.query_between(end, start - chrono::Duration::seconds(1)).unwrap())
            .is_empty());
    }

    #[test]
    fn statistics_of_empty_ledger() {
        let (service, _) = service_with(&[]);
        assert_eq!(service.statistics().unwrap(), LedgerStatistics::default());
        assert!(service.head().unwrap().is_none());
    }

    #[test]
    fn statistics_span_the_chain() {
        let (service, entries) =
            service_with(&[("DOC-1", "USR-1"), ("DOC-2", "USR-2"), ("DOC-3", "USR-3")]);
        let stats = service.statistics().unwrap();
        assert_eq!(stats.total_entries, 3);
        assert_eq!(stats.chain_length, 3);
        assert_eq!(stats.first_entry_timestamp, Some(entries[0].created_at));
        assert_eq!(stats.last_entry_timestamp, Some(entries[2].created_at));
        assert_eq!(service.head().unwrap().as_ref(), entries.last());
    }

    /// Store that lands one extra append right after every scan snapshot.
    struct AppendsBehindScans {
        inner: InMemoryLedgerStore,
        pending: Mutex<Vec<LedgerEntry>>,
    }

    impl LedgerStore for AppendsBehindScans {
        fn append_only(&self, entry: &LedgerEntry) -> StoreResult<EntryId> {
            self.inner.append_only(entry)
        }

        fn scan_ordered(&self) -> StoreResult<EntryIter<'_>> {
            let scan = self.inner.scan_ordered()?;
            if let Some(entry) = self.pending.lock().unwrap().pop() {
                self.inner.append_only(&entry)?;
            }
            Ok(scan)
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
    fn statistics_stay_consistent_under_concurrent_append() {
        let store = Arc::new(AppendsBehindScans {
            inner: InMemoryLedgerStore::new(),
            pending: Mutex::new(Vec::new()),
        });
        let appender = ChainAppender::new(Arc::clone(&store));
        let first = appender
            .append("DOC-1", "USR-1", ChainHasher::sha256(b"one"), Metadata::new())
            .unwrap();

        let payload_hash = ChainHasher::sha256(b"two");
        let metadata = Metadata::new();
        let late = LedgerEntry {
            entry_id: EntryId::new(),
            sequence_id: 2,
            document_id: "DOC-1".into(),
            actor_id: "USR-2".into(),
            payload_hash,
            chain_hash: ChainHasher::chain_hash(
                &first.chain_hash,
                &payload_hash,
                &metadata,
                "USR-2",
            ),
            metadata,
            previous_hash: first.chain_hash,
            created_at: Utc::now(),
        };
        store.pending.lock().unwrap().push(late);

        let service = LedgerQueryService::new(Arc::clone(&store));
        let stats = service.statistics().unwrap();
        assert_eq!(stats.total_entries, 1);
        assert_eq!(stats.chain_length, 1);
        assert_eq!(stats.last_entry_timestamp, Some(first.created_at));

        assert_eq!(service.statistics().unwrap().total_entries, 2);
    }
}
