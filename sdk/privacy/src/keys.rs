//! Deterministic Key Derivation
//!
//! Every per-transaction secret is derived from a single 32-byte root:
//!
//! ```text
//! identifier(n)   = Ed25519PK(blake3::derive_key("shade-identifier-v1", root || n))
//! decryption(n)   = blake3::derive_key("shade-decryption-v1", root || n)
//! metadata(c)     = blake3::derive_key("shade-metadata-v1",   root || c)
//! nullifier(n)    = Poseidon PRF over the root (see `nullifier`)
//! ```
//!
//! There is no state and no randomness: the same root and nonce always yield
//! the same identifier, which is what lets a wallet find its transactions on
//! the ledger without any directory service.

use ed25519_dalek::SigningKey;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::commitment::CommitmentHash;
use crate::nullifier::NullifierKey;

const ROOT_CONTEXT: &str = "shade-root-v1";
const IDENTIFIER_CONTEXT: &str = "shade-identifier-v1";
const DECRYPTION_CONTEXT: &str = "shade-decryption-v1";
const METADATA_CONTEXT: &str = "shade-metadata-v1";

/// Public per-nonce identifier that tags a transaction on the ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Identifier(pub [u8; 32]);

impl Identifier {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

/// Root secret of a wallet session.
/// NEVER expose this struct's internals.
#[derive(Clone)]
pub struct ViewingKey {
    root: [u8; 32],
    nullifier_key: NullifierKey,
}

impl ViewingKey {
    pub fn from_bytes(root: [u8; 32]) -> Self {
        Self {
            root,
            nullifier_key: NullifierKey::from_bytes(root),
        }
    }

    /// Derive the root from arbitrary seed material (e.g. a signed message)
    pub fn from_seed(seed: &[u8]) -> Self {
        let mut hasher = blake3::Hasher::new_derive_key(ROOT_CONTEXT);
        hasher.update(seed);
        Self::from_bytes(*hasher.finalize().as_bytes())
    }

    /// Ledger identifier for the transaction at `nonce`
    pub fn identifier_for(&self, nonce: u64) -> Identifier {
        let seed = self.derive(IDENTIFIER_CONTEXT, &nonce.to_le_bytes());
        let signing_key = SigningKey::from_bytes(&seed);
        Identifier(signing_key.verifying_key().to_bytes())
    }

    /// Symmetric key protecting the private body of the transaction at `nonce`
    pub fn decryption_key_for(&self, nonce: u64) -> [u8; 32] {
        self.derive(DECRYPTION_CONTEXT, &nonce.to_le_bytes())
    }

    /// Symmetric key protecting the metadata sidecar of `commitment`
    pub fn metadata_key_for(&self, commitment: &CommitmentHash) -> [u8; 32] {
        self.derive(METADATA_CONTEXT, commitment.as_bytes())
    }

    /// Secret folded into the output commitment of the transaction at `nonce`
    pub fn nullifier_secret_for(&self, nonce: u64) -> [u8; 32] {
        self.nullifier_key.derive_secret(nonce)
    }

    fn derive(&self, context: &str, input: &[u8]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new_derive_key(context);
        hasher.update(&self.root);
        hasher.update(input);
        *hasher.finalize().as_bytes()
    }
}

impl fmt::Debug for ViewingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ViewingKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn identifier_is_deterministic() {
        let a = ViewingKey::from_bytes([9u8; 32]);
        let b = ViewingKey::from_bytes([9u8; 32]);
        for nonce in [0u64, 1, 42, u64::MAX] {
            assert_eq!(a.identifier_for(nonce), b.identifier_for(nonce));
        }
    }

    #[test]
    fn identifiers_distinct_across_nonces_and_roots() {
        let a = ViewingKey::from_bytes([1u8; 32]);
        let b = ViewingKey::from_bytes([2u8; 32]);

        let mut seen = HashSet::new();
        for nonce in 0..64u64 {
            assert!(seen.insert(a.identifier_for(nonce)));
            assert!(seen.insert(b.identifier_for(nonce)));
        }
    }

    #[test]
    fn derived_keys_are_domain_separated() {
        let key = ViewingKey::from_bytes([3u8; 32]);
        let decryption = key.decryption_key_for(0);
        let identifier = key.identifier_for(0);
        let metadata = key.metadata_key_for(&CommitmentHash([0u8; 32]));

        assert_ne!(decryption, identifier.0);
        assert_ne!(decryption, metadata);
        assert_ne!(key.nullifier_secret_for(0), decryption);
    }

    #[test]
    fn seed_derivation_is_stable() {
        let a = ViewingKey::from_seed(b"shade test seed");
        let b = ViewingKey::from_seed(b"shade test seed");
        assert_eq!(a.decryption_key_for(7), b.decryption_key_for(7));
        assert_eq!(a.identifier_for(7).to_base58(), b.identifier_for(7).to_string());
    }

    #[test]
    fn debug_does_not_leak_root() {
        let key = ViewingKey::from_bytes([0xAB; 32]);
        assert_eq!(format!("{:?}", key), "ViewingKey(..)");
    }
}
