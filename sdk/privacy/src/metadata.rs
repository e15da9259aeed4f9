//! Commitment Metadata
//!
//! Sidecar published next to a commitment so a wallet can read its balance
//! without replaying its whole history.
//!
//! ```text
//! nonce (u64 LE) | token (u16 LE) | assoc_comm_index (u64 LE) | balance (u64 LE)
//! ```

use serde::{Deserialize, Serialize};

use crate::encryption::CryptoError;
use crate::token::TokenType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitmentMetadata {
    /// Nonce of the transaction that produced the commitment
    pub nonce: u64,
    pub token_type: TokenType,
    /// Tree index of the commitment this metadata is bound to
    pub assoc_comm_index: u64,
    /// Total private balance of `token_type` after the transaction
    pub balance: u64,
}

impl CommitmentMetadata {
    pub const SERIALIZED_LEN: usize = 8 + 2 + 8 + 8;

    pub fn to_bytes(&self) -> [u8; Self::SERIALIZED_LEN] {
        let mut bytes = [0u8; Self::SERIALIZED_LEN];
        bytes[0..8].copy_from_slice(&self.nonce.to_le_bytes());
        bytes[8..10].copy_from_slice(&self.token_type.0.to_le_bytes());
        bytes[10..18].copy_from_slice(&self.assoc_comm_index.to_le_bytes());
        bytes[18..26].copy_from_slice(&self.balance.to_le_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != Self::SERIALIZED_LEN {
            return Err(CryptoError::InvalidMetadata);
        }

        let u64_at = |start: usize| -> Result<u64, CryptoError> {
            bytes[start..start + 8]
                .try_into()
                .map(u64::from_le_bytes)
                .map_err(|_| CryptoError::InvalidMetadata)
        };
        let token = bytes[8..10]
            .try_into()
            .map(u16::from_le_bytes)
            .map_err(|_| CryptoError::InvalidMetadata)?;

        Ok(Self {
            nonce: u64_at(0)?,
            token_type: TokenType(token),
            assoc_comm_index: u64_at(10)?,
            balance: u64_at(18)?,
        })
    }
}
