//! Insert-only storage for the chainlog audit ledger.
//!
//! # Storage Backends
//!
//! All backends implement the [`LedgerStore`] trait:
//!
//! - [`InMemoryLedgerStore`] -- `Vec`-backed store for tests and embedding
//! - [`FileLedgerStore`] -- durable single-segment file with CRC framing
//!
//! # Design Rules
//!
//! 1. [`LedgerStore`] has no update or delete operation.
//! 2. An entry becomes visible to readers only after its write is acknowledged.
//! 3. Inserts are checked atomically: the new entry must sit exactly one past
//!    the tail and carry an unused entry id.
//! 4. Mutation paths that exist for administrative tooling
//!    ([`AdministrativeAccess`]) are only handed out behind an
//!    [`ImmutabilityGuard`], which vetoes them.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod file;
pub mod guard;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use file::{FileLedgerStore, FileStoreConfig, SyncPolicy, MAX_RECORD_LEN};
pub use guard::{ImmutabilityGuard, TamperAttempt, TamperObserver, TamperOperation};
pub use memory::InMemoryLedgerStore;
pub use traits::{AdministrativeAccess, EntryIter, LedgerStore};
