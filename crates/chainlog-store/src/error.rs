use std::path::PathBuf;

use chainlog_types::EntryId;

use crate::guard::TamperAttempt;

/// Errors from ledger store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A persisted record failed its integrity frame check.
    #[error("corrupt record at offset {offset}: {reason}")]
    Corrupt { offset: u64, reason: String },

    /// Another store instance holds the segment's writer lock.
    #[error("ledger segment {} is locked by another writer", .0.display())]
    Locked(PathBuf),

    /// Insert does not sit exactly one past the current tail.
    #[error("sequence conflict: expected {expected}, got {found}")]
    SequenceConflict { expected: u64, found: u64 },

    /// Insert reuses an entry id that is already persisted.
    #[error("duplicate entry id {0}")]
    DuplicateEntry(EntryId),

    /// Administrative access addressed a sequence that is not stored.
    #[error("no entry with sequence {0}")]
    MissingSequence(u64),

    /// The immutability guard vetoed the operation.
    #[error(transparent)]
    TamperAttempt(#[from] TamperAttempt),

    /// A store lock was poisoned by a panicking holder.
    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
