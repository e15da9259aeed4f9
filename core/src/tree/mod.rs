//! Tree Resolver
//!
//! Turns a commitment hash into a verified position in the ledger-held
//! Poseidon tree.
//!
//! ```text
//! hint ──► [ window ] ──miss──► [ window x2 ] ──miss──► ... (up to leaf_count, then below hint)
//!              │
//!             hit ──► read sibling (index >> level) ^ 1 at every level, concurrently
//!                          │
//!                          └──► verify against the header root, re-read on a moving root
//! ```
//!
//! Hints are lower bounds that only make the search cheaper. A zero, stale or
//! overshooting hint still finds the leaf.

pub mod layout;
pub mod memory;

use async_trait::async_trait;
use futures::future::try_join_all;
use log::debug;
use shade_config::TreeConfig;
use shade_privacy::{CommitmentHash, MerkleHasher, MerklePath, TREE_DEPTH};
use std::sync::Arc;

use crate::error::{LedgerError, TreeError};
use layout::{HEADER_LEN, NODE_LEN, TreeHeader, node_offset, slots};

pub use memory::MemoryTreeStorage;

/// Raw byte-range access to tree storage
#[async_trait]
pub trait TreeStorage: Send + Sync {
    async fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>, LedgerError>;
}

/// A located commitment with its opening
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitmentInfo {
    pub index: u64,
    pub opening: MerklePath,
    /// Root the opening verifies against
    pub root: [u8; 32],
}

pub struct TreeResolver {
    storage: Arc<dyn TreeStorage>,
    config: TreeConfig,
}

impl TreeResolver {
    pub fn new(storage: Arc<dyn TreeStorage>, config: TreeConfig) -> Self {
        Self { storage, config }
    }

    pub async fn get_root(&self) -> Result<[u8; 32], TreeError> {
        Ok(self.header().await?.root)
    }

    /// Number of leaves inserted so far
    pub async fn get_latest_leaf_index(&self) -> Result<u64, TreeError> {
        Ok(self.header().await?.leaf_count)
    }

    /// Membership check without building an opening
    pub async fn has_commitment(
        &self,
        hash: &CommitmentHash,
        hint: u64,
    ) -> Result<bool, TreeError> {
        let header = self.header().await?;
        Ok(self.find_leaf(hash, hint, header.leaf_count).await?.is_some())
    }

    /// Resolve every `(hash, hint)` pair concurrently; `None` for absent hashes
    pub async fn get_commitments_info(
        &self,
        requests: &[(CommitmentHash, u64)],
    ) -> Result<Vec<Option<CommitmentInfo>>, TreeError> {
        try_join_all(
            requests
                .iter()
                .map(|(hash, hint)| self.resolve(hash, *hint)),
        )
        .await
    }

    async fn resolve(
        &self,
        hash: &CommitmentHash,
        hint: u64,
    ) -> Result<Option<CommitmentInfo>, TreeError> {
        let mut header = self.header().await?;
        let Some(index) = self.find_leaf(hash, hint, header.leaf_count).await? else {
            return Ok(None);
        };

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let opening = MerklePath::new(index, self.read_siblings(index).await?, header.root);
            if opening.verify(hash) {
                return Ok(Some(CommitmentInfo {
                    index,
                    root: header.root,
                    opening,
                }));
            }

            if attempts > self.config.max_snapshot_retries {
                return Err(TreeError::SnapshotMismatch { attempts });
            }
            debug!("Tree root moved while resolving {} at {}, re-reading", hash, index);
            header = self.header().await?;
        }
    }

    async fn header(&self) -> Result<TreeHeader, TreeError> {
        let bytes = self.storage.read(0, HEADER_LEN).await?;
        TreeHeader::decode(&bytes)
    }

    /// Expanding-window search: forward from the hint until `leaf_count`,
    /// then backward below it.
    async fn find_leaf(
        &self,
        hash: &CommitmentHash,
        hint: u64,
        leaf_count: u64,
    ) -> Result<Option<u64>, TreeError> {
        let start = hint.min(leaf_count);
        let (mut lo, mut hi) = (start, start);
        let window = self.config.search_window.max(1);

        for expansion in 0..=self.config.max_search_expansions {
            if lo == 0 && hi == leaf_count {
                break;
            }
            let width = window.saturating_mul(1u64 << expansion.min(63));

            let (from, to) = if hi < leaf_count {
                let to = hi.saturating_add(width).min(leaf_count);
                let range = (hi, to);
                hi = to;
                range
            } else {
                let from = lo.saturating_sub(width);
                let range = (from, lo);
                lo = from;
                range
            };

            debug!("Searching leaves {}..{} for {}", from, to, hash);
            if let Some(index) = self.scan_leaves(hash, from, to).await? {
                return Ok(Some(index));
            }
        }

        Ok(None)
    }

    async fn scan_leaves(
        &self,
        hash: &CommitmentHash,
        from: u64,
        to: u64,
    ) -> Result<Option<u64>, TreeError> {
        let len = (to - from) * NODE_LEN;
        let bytes = self.storage.read(node_offset(0, from), len).await?;
        if bytes.len() as u64 != len {
            return Err(TreeError::Layout(format!(
                "short leaf read: {} of {} bytes",
                bytes.len(),
                len
            )));
        }

        Ok(slots(&bytes)
            .position(|slot| slot == Some(hash.0))
            .map(|offset| from + offset as u64))
    }

    async fn read_siblings(&self, index: u64) -> Result<Vec<[u8; 32]>, TreeError> {
        let hasher = MerkleHasher::shared();
        try_join_all((0..TREE_DEPTH).map(|level| async move {
            let sibling = (index >> level) ^ 1;
            let node = self.read_node(level, sibling).await?;
            Ok::<_, TreeError>(node.unwrap_or(*hasher.empty_root(level)))
        }))
        .await
    }

    async fn read_node(&self, level: usize, index: u64) -> Result<Option<[u8; 32]>, TreeError> {
        let bytes = self
            .storage
            .read(node_offset(level, index), NODE_LEN)
            .await?;
        if bytes.len() as u64 != NODE_LEN {
            return Err(TreeError::Layout(format!(
                "short node read at level {level}: {} bytes",
                bytes.len()
            )));
        }
        Ok(slots(&bytes).next().flatten())
    }
}
