//! Merkle Tree for Output Commitments
//!
//! Poseidon merkle accumulator that every Shade commitment is appended to.
//! The ledger holds the authoritative copy; this module provides the hashing
//! rules shared by the resolver and a sparse in-memory tree.
//!
//! ```text
//!                    Root
//!                   /    \
//!                 H01    H23
//!                /  \   /   \
//!               H0  H1 H2   H3
//!               |   |   |    |
//!              C0  C1  C2   C3  (Commitment hashes)
//! ```

use ark_bls12_381::Fr;
use ark_crypto_primitives::sponge::{
    CryptographicSponge,
    poseidon::{PoseidonConfig, PoseidonSponge},
};
use ark_ff::PrimeField;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::LazyLock;

use crate::commitment::{CommitmentHash, field_to_bytes, poseidon_config};

/// Tree depth (supports 2^20 commitments)
pub const TREE_DEPTH: usize = 20;

static SHARED_HASHER: LazyLock<MerkleHasher> = LazyLock::new(MerkleHasher::new);

/// A merkle opening proving inclusion of a leaf under `root`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerklePath {
    /// The leaf position
    pub index: u64,
    /// Sibling hashes from leaf to root
    pub siblings: Vec<[u8; 32]>,
    /// Root the siblings were read against
    pub root: [u8; 32],
}

impl MerklePath {
    pub fn new(index: u64, siblings: Vec<[u8; 32]>, root: [u8; 32]) -> Self {
        Self {
            index,
            siblings,
            root,
        }
    }

    /// Position bits (false = left, true = right), leaf level first
    pub fn path_bits(&self) -> Vec<bool> {
        (0..self.siblings.len())
            .map(|level| (self.index >> level) & 1 == 1)
            .collect()
    }

    /// Verify that this path proves inclusion of `leaf` in `self.root`
    pub fn verify(&self, leaf: &CommitmentHash) -> bool {
        self.verify_with(MerkleHasher::shared(), leaf)
    }

    pub fn verify_with(&self, hasher: &MerkleHasher, leaf: &CommitmentHash) -> bool {
        if self.siblings.len() != TREE_DEPTH {
            return false;
        }
        let computed = hasher.compute_root_from_path(&leaf.0, &self.siblings, &self.path_bits());
        computed == self.root
    }
}

/// Poseidon-based Merkle hash function
pub struct MerkleHasher {
    config: PoseidonConfig<Fr>,
    /// Precomputed empty subtree roots at each level
    empty_roots: Vec<[u8; 32]>,
}

impl MerkleHasher {
    pub fn new() -> Self {
        let config = poseidon_config();
        let empty_leaf = Self::compute_empty_leaf(&config);
        let empty_roots = Self::compute_empty_roots(&config, &empty_leaf);

        Self {
            config,
            empty_roots,
        }
    }

    /// Process-wide hasher; building the Poseidon parameters is not free
    pub fn shared() -> &'static MerkleHasher {
        &SHARED_HASHER
    }

    /// Hash two children to get parent
    pub fn hash_pair(&self, left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
        let mut sponge = PoseidonSponge::new(&self.config);

        sponge.absorb(&Fr::from_le_bytes_mod_order(left));
        sponge.absorb(&Fr::from_le_bytes_mod_order(right));

        let result: Fr = sponge.squeeze_field_elements(1)[0];
        field_to_bytes(result)
    }

    /// Get the empty root at a given depth
    pub fn empty_root(&self, depth: usize) -> &[u8; 32] {
        &self.empty_roots[depth]
    }

    /// Compute root from leaf and authentication path
    pub fn compute_root_from_path(
        &self,
        leaf: &[u8; 32],
        siblings: &[[u8; 32]],
        path_bits: &[bool],
    ) -> [u8; 32] {
        let mut current = *leaf;

        for (sibling, is_right) in siblings.iter().zip(path_bits.iter()) {
            if *is_right {
                current = self.hash_pair(sibling, &current);
            } else {
                current = self.hash_pair(&current, sibling);
            }
        }

        current
    }

    fn compute_empty_leaf(config: &PoseidonConfig<Fr>) -> [u8; 32] {
        let mut sponge = PoseidonSponge::new(config);
        sponge.absorb(&Fr::from(0u64));
        let result: Fr = sponge.squeeze_field_elements(1)[0];
        field_to_bytes(result)
    }

    fn compute_empty_roots(config: &PoseidonConfig<Fr>, empty_leaf: &[u8; 32]) -> Vec<[u8; 32]> {
        let mut roots = Vec::with_capacity(TREE_DEPTH + 1);
        let mut prev = *empty_leaf;
        roots.push(prev);

        for _ in 0..TREE_DEPTH {
            let mut sponge = PoseidonSponge::new(config);
            let prev_f = Fr::from_le_bytes_mod_order(&prev);
            sponge.absorb(&prev_f);
            sponge.absorb(&prev_f);
            let result: Fr = sponge.squeeze_field_elements(1)[0];
            prev = field_to_bytes(result);
            roots.push(prev);
        }

        roots
    }
}

impl Default for MerkleHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Sparse Merkle Tree of commitment hashes
///
/// Only stores non-empty nodes.
pub struct MerkleTree {
    /// Non-empty nodes: (level, index) -> hash
    nodes: HashMap<(usize, u64), [u8; 32]>,
    /// Next available leaf position
    next_index: u64,
    /// Current root
    root: [u8; 32],
}

impl MerkleTree {
    /// Create a new empty tree
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            next_index: 0,
            root: *MerkleHasher::shared().empty_root(TREE_DEPTH),
        }
    }

    /// Get current root
    pub fn root(&self) -> [u8; 32] {
        self.root
    }

    /// Number of inserted leaves
    pub fn len(&self) -> u64 {
        self.next_index
    }

    pub fn is_empty(&self) -> bool {
        self.next_index == 0
    }

    /// Maximum number of leaves
    pub const fn capacity() -> u64 {
        1u64 << TREE_DEPTH
    }

    /// Append a commitment and return its position, `None` once the tree is full
    pub fn insert(&mut self, commitment: &CommitmentHash) -> Option<u64> {
        let position = self.next_index;
        if position >= Self::capacity() {
            return None;
        }
        let hasher = MerkleHasher::shared();

        self.nodes.insert((0, position), commitment.0);

        let mut current_index = position;
        let mut current_hash = commitment.0;

        for level in 0..TREE_DEPTH {
            let is_right = current_index & 1 == 1;
            let sibling = self
                .nodes
                .get(&(level, current_index ^ 1))
                .copied()
                .unwrap_or_else(|| *hasher.empty_root(level));

            current_hash = if is_right {
                hasher.hash_pair(&sibling, &current_hash)
            } else {
                hasher.hash_pair(&current_hash, &sibling)
            };
            current_index >>= 1;

            if level + 1 < TREE_DEPTH {
                self.nodes.insert((level + 1, current_index), current_hash);
            }
        }

        self.root = current_hash;
        self.next_index += 1;
        Some(position)
    }

    /// Written node at (level, index), `None` for empty subtrees
    pub fn node(&self, level: usize, index: u64) -> Option<[u8; 32]> {
        self.nodes.get(&(level, index)).copied()
    }

    /// Get Merkle path for a position
    pub fn path(&self, position: u64) -> Option<MerklePath> {
        if position >= self.next_index {
            return None;
        }

        let hasher = MerkleHasher::shared();
        let siblings = (0..TREE_DEPTH)
            .map(|level| {
                let sibling_index = (position >> level) ^ 1;
                self.node(level, sibling_index)
                    .unwrap_or_else(|| *hasher.empty_root(level))
            })
            .collect();

        Some(MerklePath::new(position, siblings, self.root))
    }

    /// Get commitment at position
    pub fn get(&self, position: u64) -> Option<CommitmentHash> {
        self.node(0, position).map(CommitmentHash)
    }
}

impl Default for MerkleTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_tree() {
        let tree = MerkleTree::new();
        assert!(tree.is_empty());
        assert_eq!(tree.root(), *MerkleHasher::shared().empty_root(TREE_DEPTH));
    }

    #[test]
    fn test_insert_and_path() {
        let mut tree = MerkleTree::new();

        let c1 = CommitmentHash([1u8; 32]);
        let c2 = CommitmentHash([2u8; 32]);

        assert_eq!(tree.insert(&c1), Some(0));
        assert_eq!(tree.insert(&c2), Some(1));

        let path1 = tree.path(0).unwrap();
        assert!(path1.verify(&c1));
        assert_eq!(path1.root, tree.root());

        let path2 = tree.path(1).unwrap();
        assert!(path2.verify(&c2));
        assert!(path2.path_bits()[0]);
    }

    #[test]
    fn test_path_invalid_commitment() {
        let mut tree = MerkleTree::new();
        tree.insert(&CommitmentHash([1u8; 32]));

        let path = tree.path(0).unwrap();
        assert!(!path.verify(&CommitmentHash([99u8; 32])));
    }

    #[test]
    fn test_stale_path_fails_against_new_root() {
        let mut tree = MerkleTree::new();
        let c1 = CommitmentHash([1u8; 32]);
        tree.insert(&c1);
        let stale = tree.path(0).unwrap();

        tree.insert(&CommitmentHash([2u8; 32]));
        let mut moved = stale.clone();
        moved.root = tree.root();

        assert!(stale.verify(&c1), "path verifies against its own root");
        assert!(!moved.verify(&c1), "sibling changed after the insert");
    }

    #[test]
    fn test_path_out_of_range() {
        let tree = MerkleTree::new();
        assert!(tree.path(0).is_none());
    }

    #[test]
    fn test_root_changes() {
        let mut tree = MerkleTree::new();
        let root0 = tree.root();

        tree.insert(&CommitmentHash([1u8; 32]));
        let root1 = tree.root();
        assert_ne!(root0, root1, "root should change after insert");

        tree.insert(&CommitmentHash([2u8; 32]));
        assert_ne!(root1, tree.root(), "root should change after each insert");
    }

    #[test]
    fn test_full_tree_rejects_insert() {
        let mut tree = MerkleTree::new();
        tree.next_index = MerkleTree::capacity();
        let root = tree.root();

        assert_eq!(tree.insert(&CommitmentHash([1u8; 32])), None);
        assert_eq!(tree.len(), MerkleTree::capacity());
        assert_eq!(tree.root(), root);
        assert_eq!(tree.node(0, MerkleTree::capacity()), None);
    }
}
