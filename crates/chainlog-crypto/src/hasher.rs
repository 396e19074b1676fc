use chainlog_types::{Digest, LedgerEntry, Metadata};
use sha2::{Digest as _, Sha256};

use crate::canonical::canonical_metadata;

/// SHA-256 hasher for chain links.
///
/// Preimage layout, concatenated without separators:
///
/// ```text
/// previous_hash (64 hex chars)
/// payload_hash  (64 hex chars)
/// canonical(metadata)
/// actor_id      (UTF-8)
/// ```
pub struct ChainHasher;

impl ChainHasher {
    /// Compute the chain hash sealing one entry to its predecessor.
    pub fn chain_hash(
        previous_hash: &Digest,
        payload_hash: &Digest,
        metadata: &Metadata,
        actor_id: &str,
    ) -> Digest {
        let mut hasher = Sha256::new();
        hasher.update(previous_hash.to_hex().as_bytes());
        hasher.update(payload_hash.to_hex().as_bytes());
        hasher.update(canonical_metadata(metadata).as_bytes());
        hasher.update(actor_id.as_bytes());
        Digest::from_hash(hasher.finalize().into())
    }

    /// Recompute the chain hash from a persisted entry's own fields.
    pub fn recompute(entry: &LedgerEntry) -> Digest {
        Self::chain_hash(
            &entry.previous_hash,
            &entry.payload_hash,
            &entry.metadata,
            &entry.actor_id,
        )
    }

    /// Plain SHA-256 of raw content, for callers deriving a payload hash.
    pub fn sha256(data: &[u8]) -> Digest {
        Digest::from_hash(Sha256::digest(data).into())
    }
}

#[cfg(test)]
mod tests {
    use chainlog_types::GENESIS_SENTINEL;

    use super::*;

    #[test]
    fn sha256_matches_known_vector() {
        assert_eq!(
            ChainHasher::sha256(b"hello").to_hex(),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn chain_hash_matches_hand_built_preimage() {
        let payload = ChainHasher::sha256(b"hello");
        let mut metadata = Metadata::new();
        metadata.insert("note".into(), "reviewed".into());

        let preimage = format!(
            "{}{}{}{}",
            GENESIS_SENTINEL.to_hex(),
            payload.to_hex(),
            r#"{"note":"reviewed"}"#,
            "USR-1"
        );
        let expected = ChainHasher::sha256(preimage.as_bytes());

        let actual = ChainHasher::chain_hash(&GENESIS_SENTINEL, &payload, &metadata, "USR-1");
        assert_eq!(actual, expected);
    }

    #[test]
    fn chain_hash_is_deterministic() {
        let payload = ChainHasher::sha256(b"world");
        let a = ChainHasher::chain_hash(&GENESIS_SENTINEL, &payload, &Metadata::new(), "USR-2");
        let b = ChainHasher::chain_hash(&GENESIS_SENTINEL, &payload, &Metadata::new(), "USR-2");
        assert_eq!(a, b);
    }

    #[test]
    fn every_component_affects_the_hash() {
        let payload = ChainHasher::sha256(b"x");
        let mut metadata = Metadata::new();
        metadata.insert("k".into(), "v".into());
        let base = ChainHasher::chain_hash(&GENESIS_SENTINEL, &payload, &metadata, "actor");

        let other_prev = Digest::from_hash([1; 32]);
        assert_ne!(
            base,
            ChainHasher::chain_hash(&other_prev, &payload, &metadata, "actor")
        );
        assert_ne!(
            base,
            ChainHasher::chain_hash(
                &GENESIS_SENTINEL,
                &ChainHasher::sha256(b"y"),
                &metadata,
                "actor"
            )
        );
        assert_ne!(
            base,
            ChainHasher::chain_hash(&GENESIS_SENTINEL, &payload, &Metadata::new(), "actor")
        );
        assert_ne!(
            base,
            ChainHasher::chain_hash(&GENESIS_SENTINEL, &payload, &metadata, "actor2")
        );
    }
}
