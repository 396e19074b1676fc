//! Foundation types for chainlog, the hash-chained audit ledger.
//!
//! Every other chainlog crate depends on `chainlog-types`.
//!
//! # Key Types
//!
//! - [`Digest`] -- 256-bit digest rendered as 64 lowercase hex characters
//! - [`GENESIS_SENTINEL`] -- the `previous_hash` of the very first entry
//! - [`EntryId`] -- UUID v7 identifier assigned to every entry at creation
//! - [`LedgerEntry`] -- the single persisted record type
//! - [`Metadata`] -- caller-supplied key/value context, sorted by key

pub mod digest;
pub mod entry;
pub mod error;

pub use digest::{Digest, GENESIS_SENTINEL};
pub use entry::{EntryId, LedgerEntry, Metadata};
pub use error::TypeError;
