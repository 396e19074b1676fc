use std::sync::Arc;

use chainlog_types::{EntryId, LedgerEntry};

use crate::error::StoreResult;

/// Lazy, ordered iterator over persisted entries.
pub type EntryIter<'a> = Box<dyn Iterator<Item = StoreResult<LedgerEntry>> + Send + 'a>;

/// Durable, ordered, insert-only ledger storage.
///
/// All implementations must satisfy these invariants:
/// - There is no way to change or remove an entry through this trait.
/// - `append_only` is atomic: once it returns `Ok`, every later read sees the
///   whole entry; before that, no read sees any of it.
/// - `append_only` rejects an entry whose `sequence_id` is not exactly one
///   past the tail ([`StoreError::SequenceConflict`]) or whose `entry_id` is
///   already stored ([`StoreError::DuplicateEntry`]). The check and the write
///   happen under the same internal lock.
/// - `scan_ordered` yields entries in storage order, which for a ledger
///   populated through `append_only` is ascending `sequence_id`. It walks a
///   snapshot taken when it is called; entries appended afterwards are not
///   observed. Each call starts a fresh scan.
///
/// [`StoreError::SequenceConflict`]: crate::StoreError::SequenceConflict
/// [`StoreError::DuplicateEntry`]: crate::StoreError::DuplicateEntry
pub trait LedgerStore: Send + Sync {
    /// Persist a new entry and return its id.
    fn append_only(&self, entry: &LedgerEntry) -> StoreResult<EntryId>;

    /// Scan every entry in ascending sequence order.
    fn scan_ordered(&self) -> StoreResult<EntryIter<'_>>;

    /// The entry with the highest sequence id, or `None` if the store is empty.
    fn tail(&self) -> StoreResult<Option<LedgerEntry>>;

    /// Look up a single entry by id.
    fn get(&self, entry_id: &EntryId) -> StoreResult<Option<LedgerEntry>>;

    /// Number of persisted entries.
    fn len(&self) -> StoreResult<u64>;

    /// Returns `true` if nothing has been persisted yet.
    fn is_empty(&self) -> StoreResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Direct mutation of persisted entries.
///
/// Models the other code paths a shared backing table is reachable through
/// (administrative tooling, migrations). Backends implement it; the ledger
/// only ever exposes it through an [`ImmutabilityGuard`], which refuses
/// every call.
///
/// [`ImmutabilityGuard`]: crate::ImmutabilityGuard
pub trait AdministrativeAccess: Send + Sync {
    /// Replace the stored entry that has `entry.sequence_id`.
    fn update_entry(&self, actor_id: &str, entry: &LedgerEntry) -> StoreResult<()>;

    /// Remove the stored entry with the given sequence id.
    fn remove_entry(&self, actor_id: &str, sequence_id: u64) -> StoreResult<()>;
}

impl<S: LedgerStore + ?Sized> LedgerStore for Arc<S> {
    fn append_only(&self, entry: &LedgerEntry) -> StoreResult<EntryId> {
        (**self).append_only(entry)
    }

    fn scan_ordered(&self) -> StoreResult<EntryIter<'_>> {
        (**self).scan_ordered()
    }

    fn tail(&self) -> StoreResult<Option<LedgerEntry>> {
        (**self).tail()
    }

    fn get(&self, entry_id: &EntryId) -> StoreResult<Option<LedgerEntry>> {
        (**self).get(entry_id)
    }

    fn len(&self) -> StoreResult<u64> {
        (**self).len()
    }
}

impl<S: LedgerStore + ?Sized> LedgerStore for Box<S> {
    fn append_only(&self, entry: &LedgerEntry) -> StoreResult<EntryId> {
        (**self).append_only(entry)
    }

    fn scan_ordered(&self) -> StoreResult<EntryIter<'_>> {
        (**self).scan_ordered()
    }

    fn tail(&self) -> StoreResult<Option<LedgerEntry>> {
        (**self).tail()
    }

    fn get(&self, entry_id: &EntryId) -> StoreResult<Option<LedgerEntry>> {
        (**self).get(entry_id)
    }

    fn len(&self) -> StoreResult<u64> {
        (**self).len()
    }
}

impl<S: AdministrativeAccess + ?Sized> AdministrativeAccess for Arc<S> {
    fn update_entry(&self, actor_id: &str, entry: &LedgerEntry) -> StoreResult<()> {
        (**self).update_entry(actor_id, entry)
    }

    fn remove_entry(&self, actor_id: &str, sequence_id: u64) -> StoreResult<()> {
        (**self).remove_entry(actor_id, sequence_id)
    }
}
