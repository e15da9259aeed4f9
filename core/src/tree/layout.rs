//! Byte layout of ledger-held tree storage
//!
//! ```text
//! [ leaf_count u64 LE ][ root 32 ][ level 0 ][ level 1 ] ... [ level DEPTH-1 ]
//! ```
//!
//! Level `l` holds `2^(DEPTH - l)` slots of 32 bytes. A zeroed slot has never
//! been written and stands for the empty subtree root of its level.

use shade_privacy::TREE_DEPTH;

use crate::error::TreeError;

pub const HEADER_LEN: u64 = 8 + 32;
pub const NODE_LEN: u64 = 32;

/// Slots at `level`
pub fn level_width(level: usize) -> u64 {
    1u64 << (TREE_DEPTH - level)
}

pub fn level_offset(level: usize) -> u64 {
    HEADER_LEN + (0..level).map(|l| level_width(l) * NODE_LEN).sum::<u64>()
}

pub fn node_offset(level: usize, index: u64) -> u64 {
    level_offset(level) + index * NODE_LEN
}

/// Total size of the storage region
pub fn storage_len() -> u64 {
    level_offset(TREE_DEPTH)
}

/// What a byte offset points into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Header { byte: u64 },
    Node { level: usize, index: u64, byte: u64 },
}

pub fn locate(offset: u64) -> Option<Location> {
    if offset < HEADER_LEN {
        return Some(Location::Header { byte: offset });
    }

    let mut start = HEADER_LEN;
    for level in 0..TREE_DEPTH {
        let end = start + level_width(level) * NODE_LEN;
        if offset < end {
            let relative = offset - start;
            return Some(Location::Node {
                level,
                index: relative / NODE_LEN,
                byte: relative % NODE_LEN,
            });
        }
        start = end;
    }
    None
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeHeader {
    pub leaf_count: u64,
    pub root: [u8; 32],
}

impl TreeHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN as usize] {
        let mut bytes = [0u8; HEADER_LEN as usize];
        bytes[..8].copy_from_slice(&self.leaf_count.to_le_bytes());
        bytes[8..].copy_from_slice(&self.root);
        bytes
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TreeError> {
        if bytes.len() != HEADER_LEN as usize {
            return Err(TreeError::Layout(format!(
                "header is {} bytes, expected {}",
                bytes.len(),
                HEADER_LEN
            )));
        }

        let mut count = [0u8; 8];
        count.copy_from_slice(&bytes[..8]);
        let leaf_count = u64::from_le_bytes(count);
        if leaf_count > level_width(0) {
            return Err(TreeError::Layout(format!("leaf count {leaf_count} exceeds capacity")));
        }

        let mut root = [0u8; 32];
        root.copy_from_slice(&bytes[8..]);
        Ok(Self { leaf_count, root })
    }
}

/// Split a contiguous read into 32-byte slots, `None` for unwritten ones
pub fn slots(bytes: &[u8]) -> impl Iterator<Item = Option<[u8; 32]>> + '_ {
    bytes.chunks_exact(NODE_LEN as usize).map(|chunk| {
        let mut slot = [0u8; 32];
        slot.copy_from_slice(chunk);
        (slot != [0u8; 32]).then_some(slot)
    })
}
