//! Shade Privacy SDK
//!
//! Deterministic key derivation, authenticated storage and the Poseidon
//! commitment primitives that the history engine is built on.
//!
//! # Architecture
//!
//! ```text
//!                    ┌──────────────────────┐
//!                    │   ViewingKey (root)  │
//!                    └──────────┬───────────┘
//!          ┌────────────────────┼─────────────────────┐
//!          ▼                    ▼                     ▼
//!  ┌───────────────┐   ┌─────────────────┐   ┌──────────────────┐
//!  │ identifier(n) │   │ decryption(n)   │   │ nullifier(n)     │
//!  │ ed25519 pk    │   │ ChaCha20-Poly   │   │ Poseidon PRF     │
//!  └───────────────┘   └─────────────────┘   └────────┬─────────┘
//!                                                     ▼
//!                                    ┌────────────────────────────────┐
//!                                    │ CommitmentScheme::commit_output │
//!                                    │ → leaf in the Poseidon tree     │
//!                                    └────────────────────────────────┘
//! ```

pub mod commitment;
pub mod encryption;
pub mod keys;
pub mod merkle;
pub mod metadata;
pub mod nullifier;
pub mod token;

pub use commitment::{CommitmentHash, CommitmentScheme, OutputPreimage};
pub use encryption::{CryptoError, EncryptedEnvelope};
pub use keys::{Identifier, ViewingKey};
pub use merkle::{MerkleHasher, MerklePath, MerkleTree, TREE_DEPTH};
pub use metadata::CommitmentMetadata;
pub use nullifier::NullifierKey;
pub use token::TokenType;
