use std::sync::Arc;

use chainlog_crypto::{BreakReason, ChainBreak, ChainWalker};
use chainlog_store::LedgerStore;
use chainlog_types::EntryId;
use tracing::{debug, error};

use crate::error::LedgerError;

/// Outcome of a full chain walk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerificationResult {
    Valid {
        entries_checked: u64,
    },
    /// First corrupted position found.
    Broken {
        sequence_id: u64,
        entry_id: EntryId,
        reason: BreakReason,
    },
}

impl VerificationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }
}

impl From<ChainBreak> for VerificationResult {
    fn from(br: ChainBreak) -> Self {
        Self::Broken {
            sequence_id: br.sequence_id,
            entry_id: br.entry_id,
            reason: br.reason,
        }
    }
}

/// Read-only chain verification over a store snapshot.
///
/// Takes no lock. A walk concurrent with an append either sees the new entry
/// in full or not at all.
pub struct ChainVerifier<S> {
    store: Arc<S>,
}

impl<S: LedgerStore> ChainVerifier<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Walk every entry from genesis and report the first break, if any.
    ///
    /// A store that cannot be read is an error, not a `Broken` result.
    pub fn verify(&self) -> Result<VerificationResult, LedgerError> {
        let mut walker = ChainWalker::new();
        for entry in self.store.scan_ordered()? {
            let entry = entry?;
            if let Err(br) = walker.step(&entry) {
                error!(
                    target: "chainlog::security",
                    seq = br.sequence_id,
                    entry = %br.entry_id,
                    reason = %br.reason,
                    "ledger chain broken"
                );
                return Ok(br.into());
            }
        }

        debug!(entries = walker.checked(), "ledger chain verified");
        Ok(VerificationResult::Valid {
            entries_checked: walker.checked(),
        })
    }
}
