use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chainlog_types::{EntryId, LedgerEntry};

use crate::error::{StoreError, StoreResult};
use crate::traits::{AdministrativeAccess, EntryIter, LedgerStore};

/// In-memory, `Vec`-backed ledger store.
///
/// Intended for tests and embedding. Entries live behind a `RwLock`; scans
/// iterate over a snapshot cloned under the read lock, so a concurrent
/// append is either fully visible to a scan or not at all.
pub struct InMemoryLedgerStore {
    inner: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    entries: Vec<LedgerEntry>,
    by_id: HashMap<EntryId, usize>,
}

impl MemoryState {
    fn reindex(&mut self) {
        self.by_id = self
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| (entry.entry_id, index))
            .collect();
    }

    fn position_of(&self, sequence_id: u64) -> StoreResult<usize> {
        self.entries
            .iter()
            .position(|entry| entry.sequence_id == sequence_id)
            .ok_or(StoreError::MissingSequence(sequence_id))
    }
}

impl InMemoryLedgerStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryState::default()),
        }
    }

    fn read(&self) -> StoreResult<RwLockReadGuard<'_, MemoryState>> {
        self.inner.read().map_err(|_| StoreError::LockPoisoned)
    }

    fn write(&self) -> StoreResult<RwLockWriteGuard<'_, MemoryState>> {
        self.inner.write().map_err(|_| StoreError::LockPoisoned)
    }
}

impl Default for InMemoryLedgerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn append_only(&self, entry: &LedgerEntry) -> StoreResult<EntryId> {
        let mut state = self.write()?;

        let expected = state.entries.last().map_or(1, |tail| tail.sequence_id + 1);
        if entry.sequence_id != expected {
            return Err(StoreError::SequenceConflict {
                expected,
                found: entry.sequence_id,
            });
        }
        if state.by_id.contains_key(&entry.entry_id) {
            return Err(StoreError::DuplicateEntry(entry.entry_id));
        }

        state.entries.push(entry.clone());
        let index = state.entries.len() - 1;
        state.by_id.insert(entry.entry_id, index);
        Ok(entry.entry_id)
    }

    fn scan_ordered(&self) -> StoreResult<EntryIter<'_>> {
        let snapshot = self.read()?.entries.clone();
        Ok(Box::new(snapshot.into_iter().map(Ok)))
    }

    fn tail(&self) -> StoreResult<Option<LedgerEntry>> {
        Ok(self.read()?.entries.last().cloned())
    }

    fn get(&self, entry_id: &EntryId) -> StoreResult<Option<LedgerEntry>> {
        let state = self.read()?;
        Ok(state
            .by_id
            .get(entry_id)
            .and_then(|index| state.entries.get(*index))
            .cloned())
    }

    fn len(&self) -> StoreResult<u64> {
        Ok(self.read()?.entries.len() as u64)
    }
}

impl AdministrativeAccess for InMemoryLedgerStore {
    fn update_entry(&self, _actor_id: &str, entry: &LedgerEntry) -> StoreResult<()> {
        let mut state = self.write()?;
        let index = state.position_of(entry.sequence_id)?;
        state.entries[index] = entry.clone();
        state.reindex();
        Ok(())
    }

    fn remove_entry(&self, _actor_id: &str, sequence_id: u64) -> StoreResult<()> {
        let mut state = self.write()?;
        let index = state.position_of(sequence_id)?;
        state.entries.remove(index);
        state.reindex();
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryLedgerStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.len().unwrap_or_default();
        f.debug_struct("InMemoryLedgerStore")
            .field("entry_count", &count)
            .finish()
    }
}
