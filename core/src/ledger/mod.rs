//! Ledger Query Interface
//!
//! Shade never enumerates accounts. Every lookup goes through a per-nonce
//! identifier: list the signatures that touched it, then fetch and parse them.

pub mod codec;
pub mod memory;

use async_trait::async_trait;
use shade_privacy::Identifier;
use std::fmt;

use crate::error::LedgerError;
use crate::types::TxStatus;

pub use memory::MemoryLedger;

/// Ledger transaction signature
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signature(pub [u8; 64]);

impl Signature {
    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", self.to_base58())
    }
}

/// Ledger-side commitment level of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfirmationStatus {
    Processed,
    Confirmed,
    Finalized,
}

impl From<ConfirmationStatus> for TxStatus {
    fn from(status: ConfirmationStatus) -> Self {
        match status {
            ConfirmationStatus::Processed => TxStatus::Pending,
            ConfirmationStatus::Confirmed => TxStatus::Processed,
            ConfirmationStatus::Finalized => TxStatus::Confirmed,
        }
    }
}

/// A fetched ledger transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTransaction {
    pub signature: Signature,
    pub slot: u64,
    pub confirmation: ConfirmationStatus,
    /// Execution error, if the transaction failed on-chain
    pub err: Option<String>,
    pub accounts: Vec<Identifier>,
    /// Shade instruction data
    pub data: Vec<u8>,
}

/// Read side of the ledger
///
/// Empty results are `Ok`; only transport failures are errors.
#[async_trait]
pub trait LedgerQuery: Send + Sync {
    /// Signatures that referenced `address`, newest first
    async fn get_signatures_for_address(
        &self,
        address: &Identifier,
    ) -> Result<Vec<Signature>, LedgerError>;

    async fn get_parsed_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<ParsedTransaction>, LedgerError>;
}
