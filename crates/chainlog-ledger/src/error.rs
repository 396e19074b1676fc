use chainlog_crypto::ChainBreak;
use chainlog_store::{StoreError, TamperAttempt};
use chainlog_types::EntryId;

/// Errors produced by ledger operations.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    /// A write tried to modify, remove, or overwrite a persisted entry.
    #[error(transparent)]
    TamperAttempt(TamperAttempt),

    /// The store could not commit or read. The whole operation may be retried.
    #[error("persistence error: {0}")]
    Persistence(#[source] StoreError),

    #[error("entry {0} not found")]
    NotFound(EntryId),

    #[error("payload hash must not be empty")]
    EmptyPayloadHash,

    /// `try_append` found another append in progress.
    #[error("ledger is busy with another append")]
    Busy,

    #[error("invalid sequence range: from={from}, to={to}")]
    InvalidRange { from: u64, to: u64 },

    #[error("configuration error: {0}")]
    Config(String),

    /// The ledger failed verification while being opened.
    #[error("refusing to open ledger: {0}")]
    IntegrityCheckFailed(ChainBreak),
}

impl LedgerError {
    /// Whether the caller may retry the whole operation from the start.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::TamperAttempt(attempt) => Self::TamperAttempt(attempt),
            other => Self::Persistence(other),
        }
    }
}
