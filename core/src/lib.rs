//! Shade Core
//!
//! Client-side engine that rebuilds a private history and spendable balance
//! from the public ledger.
//!
//! ```text
//!                 ┌────────────────────────┐
//!                 │   CommitmentManager    │  build ─► position ─► activate ─► consume
//!                 └─────┬─────────────┬────┘
//!                       │             │
//!            ┌──────────▼───┐   ┌─────▼────────┐
//!            │  TxHistory   │   │ TreeResolver │
//!            │ nonce cache  │   │ hash ─► path │
//!            └──────┬───────┘   └─────┬────────┘
//!                   │ TxSource        │ TreeStorage
//!            ┌──────▼───────┐   ┌─────▼────────┐
//!            │ LedgerQuery  │   │ byte ranges  │
//!            └──────────────┘   └──────────────┘
//! ```

pub mod commitments;
pub mod error;
pub mod history;
pub mod ledger;
pub mod tree;
pub mod types;

pub use commitments::{
    ActiveCommitment, CommitmentManager, CommitmentPhase, CommitmentState, IncompleteCommitment,
};
pub use error::{CodecError, CoreError, LedgerError, TreeError};
pub use history::{LedgerTxSource, TxHistory, TxSource};
pub use ledger::{ConfirmationStatus, LedgerQuery, MemoryLedger, ParsedTransaction, Signature};
pub use tree::{CommitmentInfo, MemoryTreeStorage, TreeResolver, TreeStorage};
pub use types::{TxRecord, TxStatus, TxType};
