use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::digest::{Digest, GENESIS_SENTINEL};
use crate::error::TypeError;

/// Caller-supplied context for an entry (action type, origin, timestamps).
///
/// A `BTreeMap` keeps keys in byte-wise order, which is the order the
/// canonical form hashes them in.
pub type Metadata = BTreeMap<String, String>;

/// Unique identifier for a ledger entry (UUID v7 for time-ordering).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId(uuid::Uuid);

impl EntryId {
    /// Generate a new time-ordered entry ID (UUID v7).
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// Short representation (first 8 characters of the UUID).
    pub fn short_id(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntryId({})", self.short_id())
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntryId {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        uuid::Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| TypeError::InvalidEntryId(e.to_string()))
    }
}

/// One link in the audit chain.
///
/// Every field is assigned exactly once, when the appender creates the entry.
/// `chain_hash` seals `previous_hash`, `payload_hash`, the canonical metadata
/// and `actor_id`; see `chainlog_crypto::ChainHasher`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: EntryId,
    /// Dense position in the chain, starting at 1.
    pub sequence_id: u64,
    /// Opaque reference to the external document or case.
    pub document_id: String,
    /// Opaque identifier of the responsible party.
    pub actor_id: String,
    /// Caller-computed hash of the attested content. Never recomputed here.
    pub payload_hash: Digest,
    pub metadata: Metadata,
    /// `chain_hash` of entry `sequence_id - 1`, or [`GENESIS_SENTINEL`].
    pub previous_hash: Digest,
    pub chain_hash: Digest,
    /// Assigned by the ledger, never by the caller.
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Returns `true` if this entry claims to be the first in the chain.
    pub fn is_genesis(&self) -> bool {
        self.sequence_id == 1 && self.previous_hash == GENESIS_SENTINEL
    }

    /// One-line human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "#{} {} doc={} actor={} payload={}",
            self.sequence_id,
            self.chain_hash.short_hex(),
            self.document_id,
            self.actor_id,
            self.payload_hash.short_hex()
        )
    }
}
