//! Authenticated Storage
//!
//! Symmetric ChaCha20-Poly1305 envelopes keyed by root-derived keys.
//!
//! ```text
//! Flow:
//! 1. key = decryption_key_for(nonce)            | metadata_key_for(commitment)
//! 2. iv  = 12 random bytes (fresh per envelope)
//! 3. aad = "shade-tx-v1" || nonce               | "shade-meta-v1" || commitment
//! 4. Output = (iv, ciphertext || tag)
//! ```
//!
//! Binding the commitment hash both into the key and into the associated data
//! means a sidecar written for one commitment never decrypts under another.

use chacha20poly1305::aead::rand_core::RngCore;
use chacha20poly1305::{
    ChaCha20Poly1305, Nonce,
    aead::{Aead, KeyInit, OsRng, Payload},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::commitment::CommitmentHash;
use crate::keys::ViewingKey;
use crate::metadata::CommitmentMetadata;

const TX_AAD_PREFIX: &[u8] = b"shade-tx-v1";
const METADATA_AAD_PREFIX: &[u8] = b"shade-meta-v1";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("encryption failed")]
    EncryptionFailed,

    #[error("decryption failed")]
    DecryptionFailed,

    #[error("envelope too short: {0} bytes")]
    TruncatedEnvelope(usize),

    #[error("invalid metadata encoding")]
    InvalidMetadata,
}

/// An encrypted payload with its IV
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedEnvelope {
    /// Nonce for ChaCha20-Poly1305
    pub iv: [u8; 12],
    /// Ciphertext with the 16-byte authentication tag appended
    pub cipher_text: Vec<u8>,
}

impl EncryptedEnvelope {
    /// Fixed overhead (iv + tag)
    pub const OVERHEAD: usize = 12 + 16;

    /// `iv || cipher_text`
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(12 + self.cipher_text.len());
        bytes.extend_from_slice(&self.iv);
        bytes.extend_from_slice(&self.cipher_text);
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < Self::OVERHEAD {
            return Err(CryptoError::TruncatedEnvelope(bytes.len()));
        }
        let mut iv = [0u8; 12];
        iv.copy_from_slice(&bytes[..12]);

        Ok(Self {
            iv,
            cipher_text: bytes[12..].to_vec(),
        })
    }
}

fn seal(key: &[u8; 32], aad: &[u8], plaintext: &[u8]) -> Result<EncryptedEnvelope, CryptoError> {
    let mut iv = [0u8; 12];
    OsRng.fill_bytes(&mut iv);

    let cipher = ChaCha20Poly1305::new(key.into());
    let cipher_text = cipher
        .encrypt(
            Nonce::from_slice(&iv),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::EncryptionFailed)?;

    Ok(EncryptedEnvelope { iv, cipher_text })
}

fn open(key: &[u8; 32], aad: &[u8], envelope: &EncryptedEnvelope) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(key.into());
    cipher
        .decrypt(
            Nonce::from_slice(&envelope.iv),
            Payload {
                msg: &envelope.cipher_text,
                aad,
            },
        )
        .map_err(|_| CryptoError::DecryptionFailed)
}

fn tx_aad(nonce: u64) -> Vec<u8> {
    let mut aad = TX_AAD_PREFIX.to_vec();
    aad.extend_from_slice(&nonce.to_le_bytes());
    aad
}

fn metadata_aad(commitment: &CommitmentHash) -> Vec<u8> {
    let mut aad = METADATA_AAD_PREFIX.to_vec();
    aad.extend_from_slice(commitment.as_bytes());
    aad
}

impl ViewingKey {
    /// Encrypt a private payload for the transaction at `nonce`
    pub fn encrypt(&self, payload: &[u8], nonce: u64) -> Result<EncryptedEnvelope, CryptoError> {
        seal(&self.decryption_key_for(nonce), &tx_aad(nonce), payload)
    }

    pub fn decrypt(&self, envelope: &EncryptedEnvelope, nonce: u64) -> Result<Vec<u8>, CryptoError> {
        open(&self.decryption_key_for(nonce), &tx_aad(nonce), envelope)
    }

    /// Encrypt metadata bound to `commitment`
    pub fn encrypt_metadata(
        &self,
        metadata: &CommitmentMetadata,
        commitment: &CommitmentHash,
    ) -> Result<EncryptedEnvelope, CryptoError> {
        seal(
            &self.metadata_key_for(commitment),
            &metadata_aad(commitment),
            &metadata.to_bytes(),
        )
    }

    pub fn decrypt_metadata(
        &self,
        envelope: &EncryptedEnvelope,
        commitment: &CommitmentHash,
    ) -> Result<CommitmentMetadata, CryptoError> {
        let plaintext = open(
            &self.metadata_key_for(commitment),
            &metadata_aad(commitment),
            envelope,
        )?;
        CommitmentMetadata::from_bytes(&plaintext)
    }
}
