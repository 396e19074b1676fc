use std::fmt;
use std::sync::Arc;

use chainlog_types::{EntryId, LedgerEntry};
use tracing::error;

use crate::error::{StoreError, StoreResult};
use crate::traits::{AdministrativeAccess, EntryIter, LedgerStore};

/// The kind of write the guard refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TamperOperation {
    /// In-place modification of a persisted entry.
    Update,
    /// Removal of a persisted entry.
    Remove,
    /// Insert that reuses an occupied sequence position or entry id.
    Overwrite,
    /// Insert that skips past the next free sequence position.
    OutOfOrder,
}

impl fmt::Display for TamperOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Update => "update",
            Self::Remove => "remove",
            Self::Overwrite => "overwrite",
            Self::OutOfOrder => "out-of-order insert",
        })
    }
}

/// A vetoed attempt to modify or remove a persisted entry.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("tamper attempt: {operation} of entry seq {sequence_id} by {actor_id}")]
pub struct TamperAttempt {
    pub operation: TamperOperation,
    /// Party that issued the write.
    pub actor_id: String,
    /// Entry involved, when it could be identified.
    pub entry_id: Option<EntryId>,
    pub sequence_id: u64,
}

/// External security-monitoring hook, notified of every veto.
pub trait TamperObserver: Send + Sync {
    fn on_tamper_attempt(&self, attempt: &TamperAttempt);
}

/// Veto layer over a ledger store.
///
/// Reads and well-formed inserts pass straight through. Every
/// [`AdministrativeAccess`] call fails with [`TamperAttempt`], as does an
/// insert the backend rejects for colliding with or skipping past the tail.
/// The guard never transforms data.
pub struct ImmutabilityGuard<S> {
    inner: S,
    observer: Option<Arc<dyn TamperObserver>>,
}

impl<S> ImmutabilityGuard<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            observer: None,
        }
    }

    /// Report vetoes to `observer` in addition to the security log target.
    pub fn with_observer(mut self, observer: Arc<dyn TamperObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    fn veto(&self, attempt: TamperAttempt) -> StoreError {
        error!(
            target: "chainlog::security",
            operation = %attempt.operation,
            actor = %attempt.actor_id,
            seq = attempt.sequence_id,
            entry = ?attempt.entry_id,
            "ledger tamper attempt vetoed"
        );
        if let Some(observer) = &self.observer {
            observer.on_tamper_attempt(&attempt);
        }
        StoreError::TamperAttempt(attempt)
    }
}

impl<S: LedgerStore> ImmutabilityGuard<S> {
    fn entry_id_at(&self, sequence_id: u64) -> Option<EntryId> {
        self.inner
            .scan_ordered()
            .ok()?
            .filter_map(Result::ok)
            .find(|entry| entry.sequence_id == sequence_id)
            .map(|entry| entry.entry_id)
    }
}

impl<S: LedgerStore> LedgerStore for ImmutabilityGuard<S> {
    fn append_only(&self, entry: &LedgerEntry) -> StoreResult<EntryId> {
        match self.inner.append_only(entry) {
            Err(StoreError::SequenceConflict { expected, found }) => {
                let operation = if found < expected {
                    TamperOperation::Overwrite
                } else {
                    TamperOperation::OutOfOrder
                };
                Err(self.veto(TamperAttempt {
                    operation,
                    actor_id: entry.actor_id.clone(),
                    entry_id: self.entry_id_at(found),
                    sequence_id: found,
                }))
            }
            Err(StoreError::DuplicateEntry(entry_id)) => Err(self.veto(TamperAttempt {
                operation: TamperOperation::Overwrite,
                actor_id: entry.actor_id.clone(),
                entry_id: Some(entry_id),
                sequence_id: entry.sequence_id,
            })),
            other => other,
        }
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

impl<S: LedgerStore> AdministrativeAccess for ImmutabilityGuard<S> {
    fn update_entry(&self, actor_id: &str, entry: &LedgerEntry) -> StoreResult<()> {
        Err(self.veto(TamperAttempt {
            operation: TamperOperation::Update,
            actor_id: actor_id.to_string(),
            entry_id: Some(entry.entry_id),
            sequence_id: entry.sequence_id,
        }))
    }

    fn remove_entry(&self, actor_id: &str, sequence_id: u64) -> StoreResult<()> {
        Err(self.veto(TamperAttempt {
            operation: TamperOperation::Remove,
            actor_id: actor_id.to_string(),
            entry_id: self.entry_id_at(sequence_id),
            sequence_id,
        }))
    }
}
