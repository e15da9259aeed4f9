//! Nullifier Key
//!
//! Poseidon PRF keyed by the owner's root secret.
//!
//! ```text
//! nullifier_secret(n) = PRF_nk("SECR" || n)   // per-nonce output secret
//! ```

use ark_bls12_381::Fr;
use ark_crypto_primitives::sponge::{
    CryptographicSponge,
    poseidon::{PoseidonConfig, PoseidonSponge},
};
use ark_ff::PrimeField;

use crate::commitment::{field_to_bytes, poseidon_config};

const SECRET_DOMAIN: u64 = 0x5345_4352; // "SECR"

/// Nullifier derivation key
#[derive(Clone)]
pub struct NullifierKey {
    key: [u8; 32],
    config: PoseidonConfig<Fr>,
}

impl NullifierKey {
    /// Create from raw bytes
    pub fn from_bytes(key: [u8; 32]) -> Self {
        Self {
            key,
            config: poseidon_config(),
        }
    }

    /// Secret folded into the output commitment of the transaction at `nonce`
    pub fn derive_secret(&self, nonce: u64) -> [u8; 32] {
        let mut sponge = PoseidonSponge::new(&self.config);
        sponge.absorb(&Fr::from(SECRET_DOMAIN));
        sponge.absorb(&Fr::from_le_bytes_mod_order(&self.key));
        sponge.absorb(&Fr::from(nonce));

        let result: Fr = sponge.squeeze_field_elements(1)[0];
        field_to_bytes(result)
    }
}

impl std::fmt::Debug for NullifierKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("NullifierKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_deterministic() {
        let key = NullifierKey::from_bytes([1u8; 32]);
        assert_eq!(key.derive_secret(5), key.derive_secret(5));
        assert_ne!(key.derive_secret(5), key.derive_secret(6));
    }

    #[test]
    fn test_secret_requires_key() {
        let key1 = NullifierKey::from_bytes([1u8; 32]);
        let key2 = NullifierKey::from_bytes([2u8; 32]);
        assert_ne!(key1.derive_secret(0), key2.derive_secret(0));
    }
}
