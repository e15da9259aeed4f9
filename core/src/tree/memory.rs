use async_trait::async_trait;
use shade_privacy::{CommitmentHash, MerkleTree};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::TreeStorage;
use super::layout::{HEADER_LEN, Location, NODE_LEN, TreeHeader, locate, storage_len};
use crate::error::LedgerError;

/// Tree storage served from a sparse in-memory tree
///
/// Every read sees one consistent version: inserts and reads share a lock.
#[derive(Default)]
pub struct MemoryTreeStorage {
    tree: RwLock<MerkleTree>,
    unavailable: AtomicBool,
    reads: AtomicUsize,
}

impl MemoryTreeStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a leaf and return its index, `None` when the tree is full
    pub async fn insert(&self, commitment: &CommitmentHash) -> Option<u64> {
        self.tree.write().await.insert(commitment)
    }

    pub async fn root(&self) -> [u8; 32] {
        self.tree.read().await.root()
    }

    pub async fn len(&self) -> u64 {
        self.tree.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Make every read fail with a transport error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TreeStorage for MemoryTreeStorage {
    async fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>, LedgerError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable);
        }

        let end = offset
            .checked_add(len)
            .filter(|end| *end <= storage_len())
            .ok_or(LedgerError::InvalidRange { offset, len })?;

        let tree = self.tree.read().await;
        let header = TreeHeader {
            leaf_count: tree.len(),
            root: tree.root(),
        }
        .encode();

        let mut out = Vec::with_capacity(len as usize);
        let mut cursor = offset;
        while cursor < end {
            let (chunk, byte, chunk_len) = match locate(cursor) {
                Some(Location::Header { byte }) => (header.to_vec(), byte, HEADER_LEN),
                Some(Location::Node { level, index, byte }) => (
                    tree.node(level, index).unwrap_or([0u8; 32]).to_vec(),
                    byte,
                    NODE_LEN,
                ),
                None => return Err(LedgerError::InvalidRange { offset, len }),
            };

            let take = (chunk_len - byte).min(end - cursor);
            out.extend_from_slice(&chunk[byte as usize..(byte + take) as usize]);
            cursor += take;
        }

        Ok(out)
    }
}
