use std::collections::BTreeMap;

use crate::types::{TxRecord, TxStatus};

/// Outcome of merging one record into the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheUpdate {
    Inserted,
    /// Replaced by a record with a strictly higher status
    Upgraded,
    Unchanged,
}

/// Nonce-keyed arena of discovered transactions
///
/// Append/upgrade only. Absent nonces are never stored, and merging is
/// order-independent: the highest status seen for a nonce wins.
#[derive(Debug, Default)]
pub struct TxCache {
    records: BTreeMap<u64, TxRecord>,
}

impl TxCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&mut self, record: TxRecord) -> CacheUpdate {
        match self.records.get_mut(&record.nonce) {
            None => {
                self.records.insert(record.nonce, record);
                CacheUpdate::Inserted
            }
            Some(existing) if record.status > existing.status => {
                *existing = record;
                CacheUpdate::Upgraded
            }
            Some(_) => CacheUpdate::Unchanged,
        }
    }

    pub fn get(&self, nonce: u64) -> Option<&TxRecord> {
        self.records.get(&nonce)
    }

    pub fn contains(&self, nonce: u64) -> bool {
        self.records.contains_key(&nonce)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Highest cached nonce
    pub fn latest_nonce(&self) -> Option<u64> {
        self.records.keys().next_back().copied()
    }

    /// Nonces whose status can still move up
    pub fn unconfirmed_nonces(&self) -> Vec<u64> {
        self.records
            .values()
            .filter(|record| record.status < TxStatus::Confirmed)
            .map(|record| record.nonce)
            .collect()
    }
}
