use shade_privacy::{CryptoError, TokenType};
use thiserror::Error;

/// Failures talking to the ledger or to tree storage
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Ledger transport error: {0}")]
    Transport(String),

    #[error("Ledger unavailable")]
    Unavailable,

    #[error("Read out of range: offset {offset}, len {len}")]
    InvalidRange { offset: u64, len: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Malformed tree storage: {0}")]
    Layout(String),

    /// The tree kept moving while an opening was being read
    #[error("Tree root changed during resolution ({attempts} attempts)")]
    SnapshotMismatch { attempts: u32 },
}

/// Ledger payload decoding failures. Fatal for one transaction only.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Payload truncated: needed {needed} bytes, {remaining} left")]
    Truncated { needed: usize, remaining: usize },

    #[error("Unsupported payload version {0}")]
    UnsupportedVersion(u8),

    #[error("Unknown transaction type {0}")]
    UnknownTxType(u8),

    #[error("Trailing bytes after payload: {0}")]
    TrailingBytes(usize),

    #[error("Too many inputs: {0}")]
    TooManyInputs(usize),

    #[error("Field too large: {0} bytes")]
    TooLarge(usize),

    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Replayed history and the latest metadata sidecar disagree
    #[error("Balance mismatch for {token}: replay {replay}, metadata {metadata}")]
    BalanceMismatch {
        token: TokenType,
        replay: u64,
        metadata: u64,
    },

    #[error("Inconsistent history at nonce {nonce}: {reason}")]
    InconsistentHistory { nonce: u64, reason: String },
}

pub type Result<T, E = CoreError> = std::result::Result<T, E>;
