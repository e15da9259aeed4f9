//! Transaction Discovery
//!
//! There is no index from an owner to their transactions. Every transaction
//! is tagged with `identifier_for(nonce)`, so history is rebuilt by probing
//! nonces and caching what exists.
//!
//! ```text
//! latest nonce:  0 ─► 1 ─► 3 ─► 7 ─► 15 (absent)        gallop upward
//!                          7 ◄─ 11 ─► 9 ─► 10 (absent)   bisect
//!                          10+1 ..= 10+lookahead         step over gaps
//!
//! get_txs:       [ cache ] ◄─ batch ◄─ batch ◄─ ...       newest first
//!                stops at `count`, nonce 0, or a run of absent nonces
//! ```

pub mod cache;
pub mod source;

use log::{debug, info, warn};
use shade_config::SyncConfig;
use shade_privacy::{Identifier, TokenType, ViewingKey};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::{CoreError, LedgerError};
use crate::types::TxRecord;
use cache::{CacheUpdate, TxCache};

pub use source::{LedgerTxSource, TxSource};

pub struct TxHistory {
    keys: ViewingKey,
    source: Arc<dyn TxSource>,
    cache: RwLock<TxCache>,
    config: SyncConfig,
}

impl TxHistory {
    pub fn new(keys: ViewingKey, source: Arc<dyn TxSource>, config: SyncConfig) -> Self {
        Self {
            keys,
            source,
            cache: RwLock::new(TxCache::new()),
            config,
        }
    }

    pub fn keys(&self) -> &ViewingKey {
        &self.keys
    }

    pub fn derive_identifier(&self, nonce: u64) -> Identifier {
        self.keys.identifier_for(nonce)
    }

    /// Look up a single nonce on the ledger, merging any hit into the cache
    pub async fn probe(&self, nonce: u64) -> Result<Option<TxRecord>, LedgerError> {
        self.fetch(&[nonce]).await?;
        Ok(self.cached(nonce).await)
    }

    /// Up to `count` records with nonce below `before_nonce`, newest first.
    ///
    /// Without `before_nonce` the latest nonce is discovered first.
    pub async fn get_txs(
        &self,
        count: usize,
        before_nonce: Option<u64>,
        batch_size: Option<usize>,
    ) -> Result<Vec<TxRecord>, LedgerError> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let batch = batch_size.unwrap_or(self.config.batch_size).max(1) as u64;
        let max_absent = self.config.max_consecutive_absent.max(1);

        let mut cursor = match before_nonce {
            Some(nonce) => nonce,
            None => self.discover_latest_nonce().await?,
        };
        // Nonces in [probed_floor, start) have been asked for during this call
        let mut probed_floor = cursor;
        let mut absent_run = 0usize;
        let mut out = Vec::new();

        while cursor > 0 && out.len() < count && absent_run < max_absent {
            let nonce = cursor - 1;
            let record = match self.cached(nonce).await {
                Some(record) => Some(record),
                None if nonce >= probed_floor => None,
                None => {
                    let floor = (nonce + 1).saturating_sub(batch);
                    let missing = self.uncached(floor..nonce + 1).await;
                    self.fetch(&missing).await?;
                    probed_floor = floor;
                    self.cached(nonce).await
                }
            };

            match record {
                Some(record) => {
                    absent_run = 0;
                    out.push(record);
                }
                None => absent_run += 1,
            }
            cursor = nonce;
        }

        if absent_run >= max_absent {
            debug!("Stopped backward scan after {} absent nonces at {}", absent_run, cursor);
        }
        Ok(out)
    }

    /// Exclusive upper bound of the owner's used nonces
    pub async fn discover_latest_nonce(&self) -> Result<u64, LedgerError> {
        let mut floor = self.latest_known_nonce().await;

        loop {
            let bound = match self.gallop(floor).await? {
                (Some(present), absent) => self.bisect(present, absent).await?,
                (None, absent) => absent,
            };

            match self.lookahead(bound).await? {
                Some(hit) => {
                    debug!("Found nonce {} past bound {}, resuming discovery", hit, bound);
                    floor = Some(hit);
                }
                None => {
                    info!("Discovered nonce frontier at {}", bound);
                    return Ok(bound);
                }
            }
        }
    }

    /// Step upward from `floor` with growing strides until a nonce is absent.
    /// Returns (last present, first absent).
    async fn gallop(&self, floor: Option<u64>) -> Result<(Option<u64>, u64), LedgerError> {
        let growth = self.config.discovery_growth_factor.max(2);

        let mut present = match floor {
            Some(nonce) => nonce,
            None if self.is_present(0).await? => 0,
            None => return Ok((None, 0)),
        };
        let mut step = 1u64;
        loop {
            let candidate = present.saturating_add(step);
            if candidate == present || !self.is_present(candidate).await? {
                return Ok((Some(present), candidate));
            }
            present = candidate;
            step = step.saturating_mul(growth);
        }
    }

    async fn bisect(&self, mut present: u64, mut absent: u64) -> Result<u64, LedgerError> {
        while absent - present > 1 {
            let mid = present + (absent - present) / 2;
            if self.is_present(mid).await? {
                present = mid;
            } else {
                absent = mid;
            }
        }
        Ok(absent)
    }

    /// Highest present nonce in `bound+1 ..= bound+lookahead`
    async fn lookahead(&self, bound: u64) -> Result<Option<u64>, LedgerError> {
        let window = self.config.discovery_lookahead;
        if window == 0 {
            return Ok(None);
        }
        let range = bound.saturating_add(1)..bound.saturating_add(window).saturating_add(1);

        let missing = self.uncached(range.clone()).await;
        self.fetch(&missing).await?;

        let cache = self.cache.read().await;
        Ok(range.rev().find(|nonce| cache.contains(*nonce)))
    }

    pub async fn get_all_txs(&self) -> Result<Vec<TxRecord>, LedgerError> {
        self.get_txs(usize::MAX, None, None).await
    }

    /// Zero-based page of the newest-first history
    pub async fn get_txs_page(
        &self,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<TxRecord>, LedgerError> {
        if page_size == 0 {
            return Ok(Vec::new());
        }
        let skip = page.saturating_mul(page_size);
        let txs = self
            .get_txs(skip.saturating_add(page_size), None, None)
            .await?;
        Ok(txs.into_iter().skip(skip).collect())
    }

    /// Newest record, optionally of one token.
    ///
    /// Pages backward from the frontier and stops at the first match, so only
    /// the tail of the history is probed.
    pub async fn get_most_recent_tx(
        &self,
        token: Option<TokenType>,
    ) -> Result<Option<TxRecord>, LedgerError> {
        let page = match token {
            None => 1,
            Some(_) => self.config.batch_size.max(1),
        };
        let mut before = self.discover_latest_nonce().await?;

        loop {
            let txs = self.get_txs(page, Some(before), None).await?;
            if let Some(found) = txs
                .iter()
                .find(|record| token.is_none_or(|token| record.token_type == token))
            {
                return Ok(Some(found.clone()));
            }
            // A short page hit nonce 0 or a run of absent nonces
            match txs.last() {
                Some(oldest) if txs.len() == page => before = oldest.nonce,
                _ => return Ok(None),
            }
        }
    }

    /// Records of `token` whose output has not been spent, newest first
    pub async fn get_active_txs(&self, token: TokenType) -> Result<Vec<TxRecord>, LedgerError> {
        let all = self.get_all_txs().await?;
        let consumed: HashSet<u64> = all
            .iter()
            .flat_map(|record| record.inputs.iter().copied())
            .collect();

        Ok(all
            .into_iter()
            .filter(|record| record.token_type == token && !consumed.contains(&record.nonce))
            .collect())
    }

    /// Balance obtained by replaying the whole history of `token`
    pub async fn replay_balance(&self, token: TokenType) -> Result<u64, CoreError> {
        let mut all = self.get_all_txs().await?;
        all.reverse();

        let mut balance = 0u64;
        for record in all.iter().filter(|record| record.token_type == token) {
            balance = balance
                .checked_add(record.credit())
                .and_then(|b| b.checked_sub(record.debit()))
                .ok_or_else(|| CoreError::InconsistentHistory {
                    nonce: record.nonce,
                    reason: format!("balance {} cannot cover {} {}", balance, record.tx_type, record.debit()),
                })?;
        }
        Ok(balance)
    }

    /// Balance read from the metadata sidecar of the latest `token` transaction.
    ///
    /// `None` when that transaction carries no readable metadata.
    pub async fn metadata_balance(&self, token: TokenType) -> Result<Option<u64>, CoreError> {
        let Some(latest) = self.get_most_recent_tx(Some(token)).await? else {
            return Ok(None);
        };
        let Some(envelope) = &latest.metadata else {
            return Ok(None);
        };

        match self.keys.decrypt_metadata(envelope, &latest.commitment_hash) {
            Ok(metadata) if metadata.nonce == latest.nonce && metadata.token_type == token => {
                Ok(Some(metadata.balance))
            }
            Ok(metadata) => {
                warn!(
                    "Metadata of nonce {} describes nonce {} / {}, ignoring",
                    latest.nonce, metadata.nonce, metadata.token_type
                );
                Ok(None)
            }
            Err(e) => {
                warn!("Cannot read metadata of nonce {}: {}", latest.nonce, e);
                Ok(None)
            }
        }
    }

    /// Replay balance, cross-checked against the metadata shortcut when present
    pub async fn get_private_balance(&self, token: TokenType) -> Result<u64, CoreError> {
        let replay = self.replay_balance(token).await?;
        match self.metadata_balance(token).await? {
            Some(metadata) if metadata != replay => Err(CoreError::BalanceMismatch {
                token,
                replay,
                metadata,
            }),
            _ => Ok(replay),
        }
    }

    /// Re-probe cached records that are not yet confirmed.
    /// Returns how many were upgraded.
    pub async fn refresh_unconfirmed(&self) -> Result<usize, LedgerError> {
        let pending = self.cache.read().await.unconfirmed_nonces();
        let batch = self.config.batch_size.max(1);

        let mut upgraded = 0;
        for chunk in pending.chunks(batch) {
            upgraded += self
                .fetch(chunk)
                .await?
                .into_iter()
                .filter(|(_, update)| *update == CacheUpdate::Upgraded)
                .count();
        }
        if upgraded > 0 {
            info!("Upgraded status of {} cached transactions", upgraded);
        }
        Ok(upgraded)
    }

    pub async fn latest_known_nonce(&self) -> Option<u64> {
        self.cache.read().await.latest_nonce()
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.read().await.len()
    }

    async fn is_present(&self, nonce: u64) -> Result<bool, LedgerError> {
        if self.cache.read().await.contains(nonce) {
            return Ok(true);
        }
        Ok(self.probe(nonce).await?.is_some())
    }

    async fn cached(&self, nonce: u64) -> Option<TxRecord> {
        self.cache.read().await.get(nonce).cloned()
    }

    async fn uncached(&self, range: std::ops::Range<u64>) -> Vec<u64> {
        let cache = self.cache.read().await;
        range.filter(|nonce| !cache.contains(*nonce)).collect()
    }

    /// Ask the source for `nonces` and merge the answers
    async fn fetch(&self, nonces: &[u64]) -> Result<Vec<(u64, CacheUpdate)>, LedgerError> {
        if nonces.is_empty() {
            return Ok(Vec::new());
        }
        let records = self.source.get_txs_from_nonces(nonces, &self.keys).await?;

        let mut cache = self.cache.write().await;
        let mut merged = Vec::with_capacity(records.len());
        for record in records {
            if !nonces.contains(&record.nonce) {
                warn!("Source returned unrequested nonce {}, ignoring", record.nonce);
                continue;
            }
            let nonce = record.nonce;
            merged.push((nonce, cache.upsert(record)));
        }

        debug!("Probed {} nonces, {} present", nonces.len(), merged.len());
        Ok(merged)
    }
}
