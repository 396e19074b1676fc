//! Hash-chained audit ledger.
//!
//! Records a strictly ordered, cryptographically linked history of document
//! actions. Any retroactive change to a past entry is detectable by walking
//! the chain.
//!
//! - [`ChainAppender`] -- the single write path; one lock orders all appends
//! - [`ChainVerifier`] -- recomputes every link and reports the first break
//! - [`LedgerQueryService`] -- read-only lookups and statistics
//! - [`AuditLedger`] -- facade wiring the three over one guarded store
//!
//! ```
//! use chainlog_crypto::ChainHasher;
//! use chainlog_ledger::{AuditLedger, LedgerConfig};
//! use chainlog_types::{Metadata, GENESIS_SENTINEL};
//!
//! let ledger = AuditLedger::open(&LedgerConfig::in_memory()).unwrap();
//! let entry = ledger
//!     .append("DOC-1", "USR-1", ChainHasher::sha256(b"hello"), Metadata::new())
//!     .unwrap();
//! assert_eq!(entry.sequence_id, 1);
//! assert_eq!(entry.previous_hash, GENESIS_SENTINEL);
//! assert!(ledger.verify().unwrap().is_valid());
//! ```

pub mod appender;
pub mod config;
pub mod error;
pub mod ledger;
pub mod query;
pub mod verifier;

pub use appender::{AppendRequest, ChainAppender};
pub use config::{LedgerConfig, StorageBackend, StorageConfig, VerificationConfig};
pub use error::LedgerError;
pub use ledger::AuditLedger;
pub use query::{EntryStream, LedgerQueryService, LedgerStatistics};
pub use verifier::{ChainVerifier, VerificationResult};
