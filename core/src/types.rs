//! Transaction records as reconstructed from the ledger.

use std::fmt;

use serde::{Deserialize, Serialize};
use shade_privacy::{CommitmentHash, EncryptedEnvelope, Identifier, TokenType};

use crate::ledger::Signature;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxType {
    /// Public funds moved into the private pool
    Topup,
    /// Private spend, producing a change commitment
    Send,
}

impl TxType {
    pub fn to_u8(self) -> u8 {
        match self {
            TxType::Topup => 0,
            TxType::Send => 1,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(TxType::Topup),
            1 => Some(TxType::Send),
            _ => None,
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxType::Topup => f.write_str("TOPUP"),
            TxType::Send => f.write_str("SEND"),
        }
    }
}

/// Finality of a record. Ordered: a record only ever moves up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TxStatus {
    Pending,
    Processed,
    Confirmed,
}

/// One transaction of the owner, keyed by nonce
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxRecord {
    pub nonce: u64,
    pub tx_type: TxType,
    pub token_type: TokenType,
    pub identifier: Identifier,
    pub amount: u64,
    pub fee: u64,
    /// Output commitment produced by this transaction
    pub commitment_hash: CommitmentHash,
    /// Leaf count of the tree when the transaction was built
    pub merkle_start_index: u64,
    pub warden: [u8; 32],
    pub status: TxStatus,
    pub signature: Option<Signature>,
    /// Nonces whose output commitments this transaction spends
    pub inputs: Vec<u64>,
    pub metadata: Option<EncryptedEnvelope>,
}

impl TxRecord {
    pub fn is_confirmed(&self) -> bool {
        self.status == TxStatus::Confirmed
    }

    /// Amount leaving the private balance (zero for top-ups)
    pub fn debit(&self) -> u64 {
        match self.tx_type {
            TxType::Topup => 0,
            TxType::Send => self.amount.saturating_add(self.fee),
        }
    }

    /// Amount entering the private balance
    pub fn credit(&self) -> u64 {
        match self.tx_type {
            TxType::Topup => self.amount,
            TxType::Send => 0,
        }
    }
}
