use std::sync::Arc;

use chainlog_crypto::ChainBreak;
use chainlog_store::{
    FileLedgerStore, ImmutabilityGuard, InMemoryLedgerStore, LedgerStore, TamperObserver,
};
use chainlog_types::{Digest, EntryId, LedgerEntry, Metadata};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::appender::{AppendRequest, ChainAppender};
use crate::config::{LedgerConfig, StorageBackend};
use crate::error::LedgerError;
use crate::query::{EntryStream, LedgerQueryService, LedgerStatistics};
use crate::verifier::{ChainVerifier, VerificationResult};

/// The audit ledger as collaborators see it.
///
/// Wraps the backing store in an [`ImmutabilityGuard`] and wires the
/// appender, verifier and query service to that one guarded store.
pub struct AuditLedger<S> {
    store: Arc<ImmutabilityGuard<S>>,
    appender: ChainAppender<ImmutabilityGuard<S>>,
    verifier: ChainVerifier<ImmutabilityGuard<S>>,
    query: LedgerQueryService<ImmutabilityGuard<S>>,
}

impl<S: LedgerStore> AuditLedger<S> {
    pub fn new(store: S) -> Self {
        Self::from_guard(ImmutabilityGuard::new(store))
    }

    /// Build a ledger whose vetoed tamper attempts are also reported to `observer`.
    pub fn with_observer(store: S, observer: Arc<dyn TamperObserver>) -> Self {
        Self::from_guard(ImmutabilityGuard::new(store).with_observer(observer))
    }

    fn from_guard(guard: ImmutabilityGuard<S>) -> Self {
        let store = Arc::new(guard);
        Self {
            appender: ChainAppender::new(Arc::clone(&store)),
            verifier: ChainVerifier::new(Arc::clone(&store)),
            query: LedgerQueryService::new(Arc::clone(&store)),
            store,
        }
    }

    pub fn append(
        &self,
        document_id: &str,
        actor_id: &str,
        payload_hash: Digest,
        metadata: Metadata,
    ) -> Result<LedgerEntry, LedgerError> {
        self.appender.append(document_id, actor_id, payload_hash, metadata)
    }

    pub fn append_request(&self, request: &AppendRequest) -> Result<LedgerEntry, LedgerError> {
        self.appender.append_request(request)
    }

    pub fn try_append(&self, request: &AppendRequest) -> Result<LedgerEntry, LedgerError> {
        self.appender.try_append(request)
    }

    pub fn verify(&self) -> Result<VerificationResult, LedgerError> {
        self.verifier.verify()
    }

    pub fn get_entry(&self, entry_id: &EntryId) -> Result<LedgerEntry, LedgerError> {
        self.query.get_entry(entry_id)
    }

    pub fn query_by_document(&self, document_id: &str) -> Result<EntryStream<'_>, LedgerError> {
        self.query.query_by_document(document_id)
    }

    pub fn query_by_actor(&self, actor_id: &str) -> Result<EntryStream<'_>, LedgerError> {
        self.query.query_by_actor(actor_id)
    }

    pub fn query_range(&self, from: u64, to: u64) -> Result<EntryStream<'_>, LedgerError> {
        self.query.query_range(from, to)
    }

    pub fn query_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<EntryStream<'_>, LedgerError> {
        self.query.query_between(start, end)
    }

    pub fn head(&self) -> Result<Option<LedgerEntry>, LedgerError> {
        self.query.head()
    }

    pub fn statistics(&self) -> Result<LedgerStatistics, LedgerError> {
        self.query.statistics()
    }

    /// The guarded store. Its [`AdministrativeAccess`] side refuses every call.
    ///
    /// [`AdministrativeAccess`]: chainlog_store::AdministrativeAccess
    pub fn store(&self) -> &ImmutabilityGuard<S> {
        &self.store
    }
}

impl AuditLedger<Box<dyn LedgerStore>> {
    /// Open the backend named by `config`, verifying the chain first if asked to.
    pub fn open(config: &LedgerConfig) -> Result<Self, LedgerError> {
        let store: Box<dyn LedgerStore> = match config.storage.backend {
            StorageBackend::Memory => Box::new(InMemoryLedgerStore::new()),
            StorageBackend::File => Box::new(FileLedgerStore::open(
                &config.storage.path,
                config.storage.file_store_config(),
            )?),
        };
        let ledger = Self::new(store);

        if config.verification.verify_on_open {
            match ledger.verify()? {
                VerificationResult::Valid { entries_checked } => {
                    info!(entries = entries_checked, "ledger verified on open");
                }
                VerificationResult::Broken {
                    sequence_id,
                    entry_id,
                    reason,
                } => {
                    return Err(LedgerError::IntegrityCheckFailed(ChainBreak {
                        sequence_id,
                        entry_id,
                        reason,
                    }));
                }
            }
        }
        Ok(ledger)
    }
}

impl<S> std::fmt::Debug for AuditLedger<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLedger").finish_non_exhaustive()
    }
}
