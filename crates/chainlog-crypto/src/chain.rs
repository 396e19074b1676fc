use std::fmt;

use chainlog_types::{Digest, EntryId, LedgerEntry, GENESIS_SENTINEL};

use crate::hasher::ChainHasher;

/// Why a chain walk stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakReason {
    /// `sequence_id` is not the next dense position.
    SequenceGap,
    /// `previous_hash` does not equal the predecessor's `chain_hash`.
    LinkDiscontinuity,
    /// The stored `chain_hash` does not match the recomputed one.
    ContentTampering,
}

impl BreakReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SequenceGap => "sequence gap",
            Self::LinkDiscontinuity => "link discontinuity",
            Self::ContentTampering => "content tampering",
        }
    }
}

impl fmt::Display for BreakReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// First point of corruption found by a [`ChainWalker`].
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("chain broken at seq {sequence_id} (entry {entry_id}): {reason}")]
pub struct ChainBreak {
    /// Position the offending entry occupies in the walk (1-based).
    pub sequence_id: u64,
    pub entry_id: EntryId,
    pub reason: BreakReason,
}

/// Incremental chain checker.
///
/// Feed entries in ascending sequence order. Each step checks, in order:
/// 1. `sequence_id` is exactly one past the previous entry (1 for the first)
/// 2. `previous_hash` equals the previous entry's `chain_hash`
///    ([`GENESIS_SENTINEL`] for the first)
/// 3. `chain_hash` equals the hash recomputed from the entry's own fields
///
/// The walker never looks ahead, so the reported break is always the
/// earliest corrupted entry.
#[derive(Clone, Debug)]
pub struct ChainWalker {
    expected_previous: Digest,
    expected_sequence: u64,
    checked: u64,
}

impl ChainWalker {
    /// A walker positioned before the genesis entry.
    pub fn new() -> Self {
        Self {
            expected_previous: GENESIS_SENTINEL,
            expected_sequence: 1,
            checked: 0,
        }
    }

    /// Check one entry and advance past it.
    pub fn step(&mut self, entry: &LedgerEntry) -> Result<(), ChainBreak> {
        let broken = |reason| ChainBreak {
            sequence_id: self.expected_sequence,
            entry_id: entry.entry_id,
            reason,
        };

        if entry.sequence_id != self.expected_sequence {
            return Err(broken(BreakReason::SequenceGap));
        }
        if entry.previous_hash != self.expected_previous {
            return Err(broken(BreakReason::LinkDiscontinuity));
        }
        if ChainHasher::recompute(entry) != entry.chain_hash {
            return Err(broken(BreakReason::ContentTampering));
        }

        self.expected_previous = entry.chain_hash;
        self.expected_sequence += 1;
        self.checked += 1;
        Ok(())
    }

    /// Number of entries accepted so far.
    pub fn checked(&self) -> u64 {
        self.checked
    }

    /// Walk a complete in-memory chain. Returns the number of entries checked.
    pub fn verify_chain<'a>(
        entries: impl IntoIterator<Item = &'a LedgerEntry>,
    ) -> Result<u64, ChainBreak> {
        let mut walker = Self::new();
        for entry in entries {
            walker.step(entry)?;
        }
        Ok(walker.checked())
    }
}

impl Default for ChainWalker {
    fn default() -> Self {
        Self::new()
    }
}
