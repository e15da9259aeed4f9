//! Output Commitments
//!
//! Implements Poseidon-based commitments for transaction outputs.
//!
//! ```text
//! Commitment = Poseidon(DOMAIN, nullifier_secret, token, value, amount, fee, linked_input)
//! ```
//!
//! The nullifier secret is derived from the owner's root key and the nonce of
//! the producing transaction, so the owner can recompute every commitment it
//! ever produced from its history alone.

use ark_bls12_381::Fr;
use ark_crypto_primitives::sponge::{
    CryptographicSponge,
    poseidon::{PoseidonConfig, PoseidonSponge},
};
use ark_ff::{BigInteger, PrimeField};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::token::TokenType;

/// Domain tag absorbed first ("SHAD")
const OUTPUT_DOMAIN: u64 = 0x5348_4144;

/// A commitment hash (32 bytes), the leaf value stored in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CommitmentHash(pub [u8; 32]);

impl CommitmentHash {
    /// Create commitment from field element
    pub fn from_field(f: Fr) -> Self {
        Self(field_to_bytes(f))
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl AsRef<[u8]> for CommitmentHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for CommitmentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", bs58::encode(self.0).into_string())
    }
}

/// Semantic fields of a transaction output, before hashing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPreimage {
    /// Per-nonce secret derived from the root key
    pub nullifier_secret: [u8; 32],
    pub token_type: TokenType,
    /// Value held by the output commitment
    pub value: u64,
    /// Amount moved by the producing transaction
    pub amount: u64,
    pub fee: u64,
    /// Nonce of the first input consumed (none for top-ups)
    pub linked_input: Option<u64>,
}

/// Commitment scheme using Poseidon hash
pub struct CommitmentScheme {
    config: PoseidonConfig<Fr>,
}

impl CommitmentScheme {
    /// Create a new commitment scheme with Shade Poseidon parameters
    pub fn new() -> Self {
        Self {
            config: poseidon_config(),
        }
    }

    /// Commit to a transaction output
    pub fn commit_output(&self, preimage: &OutputPreimage) -> CommitmentHash {
        let mut sponge = PoseidonSponge::new(&self.config);

        sponge.absorb(&Fr::from(OUTPUT_DOMAIN));
        sponge.absorb(&Fr::from_le_bytes_mod_order(&preimage.nullifier_secret));
        sponge.absorb(&Fr::from(u64::from(preimage.token_type.0)));
        sponge.absorb(&Fr::from(preimage.value));
        sponge.absorb(&Fr::from(preimage.amount));
        sponge.absorb(&Fr::from(preimage.fee));

        // Shifted by one so that "no input" and "input 0" differ
        let linked = preimage.linked_input.map(|n| u128::from(n) + 1).unwrap_or(0);
        sponge.absorb(&Fr::from(linked));

        let result: Fr = sponge.squeeze_field_elements(1)[0];
        CommitmentHash::from_field(result)
    }
}

impl Default for CommitmentScheme {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn field_to_bytes(f: Fr) -> [u8; 32] {
    let bytes = f.into_bigint().to_bytes_le();
    let mut arr = [0u8; 32];
    arr[..bytes.len()].copy_from_slice(&bytes);
    arr
}

/// Poseidon configuration for Shade
///
/// Field: BLS12-381 Fr (255 bits)
/// Rate: 2, Capacity: 1
/// Security: 128 bits
pub(crate) fn poseidon_config() -> PoseidonConfig<Fr> {
    use ark_crypto_primitives::sponge::poseidon::find_poseidon_ark_and_mds;

    let prime_bits: u64 = 255;
    let rate: usize = 2;
    let capacity: usize = 1;
    let full_rounds: u64 = 8;
    let partial_rounds: u64 = 57;
    let alpha: u64 = 5;
    let skip_matrices: u64 = 0;

    let (ark, mds) = find_poseidon_ark_and_mds::<Fr>(
        prime_bits,
        rate,
        full_rounds,
        partial_rounds,
        skip_matrices,
    );

    PoseidonConfig::new(
        full_rounds as usize,
        partial_rounds as usize,
        alpha,
        mds,
        ark,
        rate,
        capacity,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn preimage() -> OutputPreimage {
        OutputPreimage {
            nullifier_secret: [7u8; 32],
            token_type: TokenType::LAMPORTS,
            value: 1000,
            amount: 1000,
            fee: 0,
            linked_input: None,
        }
    }

    #[test]
    fn test_commitment_deterministic() {
        let scheme = CommitmentScheme::new();
        let c1 = scheme.commit_output(&preimage());
        let c2 = scheme.commit_output(&preimage());

        assert_eq!(c1, c2, "same inputs should produce same commitment");
    }

    #[test]
    fn test_commitment_binds_secret() {
        let scheme = CommitmentScheme::new();
        let mut other = preimage();
        other.nullifier_secret = [8u8; 32];

        assert_ne!(
            scheme.commit_output(&preimage()),
            scheme.commit_output(&other),
            "different secrets should produce different commitments"
        );
    }

    #[test]
    fn test_commitment_binds_value_and_token() {
        let scheme = CommitmentScheme::new();
        let base = scheme.commit_output(&preimage());

        let mut value = preimage();
        value.value = 999;
        assert_ne!(base, scheme.commit_output(&value));

        let mut token = preimage();
        token.token_type = TokenType::USDC;
        assert_ne!(base, scheme.commit_output(&token));
    }

    #[test]
    fn test_linked_input_zero_differs_from_none() {
        let scheme = CommitmentScheme::new();
        let mut linked = preimage();
        linked.linked_input = Some(0);

        assert_ne!(
            scheme.commit_output(&preimage()),
            scheme.commit_output(&linked)
        );
    }
}
