//! Cryptographic primitives for chainlog.
//!
//! Provides the canonical metadata form, the SHA-256 chain hash that seals
//! each entry to its predecessor, and a pure walker that checks a sequence
//! of entries for gaps, broken links and content tampering.
//!
//! All crypto operations wrap established libraries; there is no custom cryptography.

pub mod canonical;
pub mod chain;
pub mod hasher;

pub use canonical::canonical_metadata;
pub use chain::{BreakReason, ChainBreak, ChainWalker};
pub use hasher::ChainHasher;
