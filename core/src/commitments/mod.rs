//! Commitment Lifecycle
//!
//! ```text
//! INCOMPLETE ──metadata──► POSITIONED ──tree──► ACTIVE ──spent──► CONSUMED
//!      └──────────────────────tree─────────────────┘
//! ```
//!
//! History is the source of records, the owner's keys are the authority on
//! what each output commitment must be, and the tree decides whether it is
//! spendable yet.

pub mod build;
pub mod state;

use log::{debug, info, warn};
use shade_config::CommitmentConfig;
use shade_privacy::{
    CommitmentHash, CommitmentMetadata, CommitmentScheme, CryptoError, EncryptedEnvelope, TokenType,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::{self, Instant, MissedTickBehavior};

use crate::error::CoreError;
use crate::history::TxHistory;
use crate::tree::TreeResolver;
use crate::types::TxRecord;
use state::CommitmentStore;

pub use state::{ActiveCommitment, CommitmentPhase, CommitmentState, IncompleteCommitment};

pub struct CommitmentManager {
    history: Arc<TxHistory>,
    resolver: Arc<TreeResolver>,
    scheme: CommitmentScheme,
    store: RwLock<CommitmentStore>,
    config: CommitmentConfig,
}

impl CommitmentManager {
    pub fn new(
        history: Arc<TxHistory>,
        resolver: Arc<TreeResolver>,
        config: CommitmentConfig,
    ) -> Self {
        Self {
            history,
            resolver,
            scheme: CommitmentScheme::new(),
            store: RwLock::new(CommitmentStore::default()),
            config,
        }
    }

    pub fn history(&self) -> &Arc<TxHistory> {
        &self.history
    }

    /// Rebuild the output commitment of every record, oldest first.
    ///
    /// Returns the commitments with one search hint each. Records whose
    /// commitment cannot be rebuilt are dropped with a warning.
    pub async fn get_incomplete_commitments_for_txs(
        &self,
        records: &[TxRecord],
    ) -> (Vec<IncompleteCommitment>, Vec<u64>) {
        let keys = self.history.keys();
        let mut ordered: Vec<&TxRecord> = records.iter().collect();
        ordered.sort_by_key(|record| record.nonce);

        let mut store = self.store.write().await;
        let mut values: HashMap<u64, (TokenType, u64)> = HashMap::new();
        let mut commitments = Vec::with_capacity(ordered.len());
        let mut hints = Vec::with_capacity(ordered.len());

        for record in ordered {
            let rebuilt = build::rebuild(&self.scheme, keys, record, |nonce| {
                values.get(&nonce).copied().or_else(|| store.value_of(nonce))
            });
            let commitment = match rebuilt {
                Ok(commitment) => commitment,
                Err(e) => {
                    warn!("Dropping commitment of nonce {}: {}", record.nonce, e);
                    continue;
                }
            };
            values.insert(record.nonce, (commitment.token_type, commitment.value));

            let (state, hint) = match self.metadata_index(record) {
                Some(index) => (
                    CommitmentState::Positioned {
                        commitment: commitment.clone(),
                        index,
                    },
                    index,
                ),
                None => (
                    CommitmentState::Incomplete {
                        commitment: commitment.clone(),
                        hint: record.merkle_start_index,
                    },
                    record.merkle_start_index,
                ),
            };
            store.advance(state);
            commitments.push(commitment);
            hints.push(hint);
        }

        (commitments, hints)
    }

    /// Resolve commitments against the tree. Ones not found yet are dropped.
    pub async fn activate_commitments(
        &self,
        commitments: Vec<IncompleteCommitment>,
        hints: &[u64],
    ) -> Result<Vec<ActiveCommitment>, CoreError> {
        let requests: Vec<(CommitmentHash, u64)> = commitments
            .iter()
            .enumerate()
            .map(|(i, commitment)| (commitment.hash, hints.get(i).copied().unwrap_or(0)))
            .collect();
        let infos = self.resolver.get_commitments_info(&requests).await?;

        let total = commitments.len();
        let mut store = self.store.write().await;
        let mut active = Vec::with_capacity(total);
        for (commitment, info) in commitments.into_iter().zip(infos) {
            let Some(info) = info else {
                debug!("Commitment of nonce {} not in tree yet", commitment.nonce);
                continue;
            };
            let resolved = ActiveCommitment {
                commitment,
                index: info.index,
                opening: info.opening,
            };
            store.advance(CommitmentState::Active(resolved.clone()));
            active.push(resolved);
        }

        info!("Activated {} of {} commitments", active.len(), total);
        Ok(active)
    }

    /// Spendable commitments of `token`.
    ///
    /// `speculative` is a transaction built but not yet submitted; its inputs
    /// are treated as spent.
    pub async fn get_active_commitments(
        &self,
        token: TokenType,
        speculative: Option<&TxRecord>,
    ) -> Result<Vec<ActiveCommitment>, CoreError> {
        let records: Vec<TxRecord> = self
            .history
            .get_all_txs()
            .await?
            .into_iter()
            .filter(|record| record.token_type == token)
            .collect();
        let (commitments, hints) = self.get_incomplete_commitments_for_txs(&records).await;

        let consumed: HashMap<u64, u64> = records
            .iter()
            .flat_map(|record| record.inputs.iter().map(move |input| (*input, record.nonce)))
            .collect();
        {
            let mut store = self.store.write().await;
            for (input, consumer) in &consumed {
                store.consume(*input, *consumer);
            }
        }

        let excluded: HashSet<u64> = speculative
            .map(|tx| tx.inputs.iter().copied().collect())
            .unwrap_or_default();
        let (unspent, unspent_hints): (Vec<_>, Vec<_>) = commitments
            .into_iter()
            .zip(hints)
            .filter(|(commitment, _)| {
                !consumed.contains_key(&commitment.nonce) && !excluded.contains(&commitment.nonce)
            })
            .unzip();

        self.activate_commitments(unspent, &unspent_hints).await
    }

    /// Whether `active` exceeds what a single spend can reference
    pub fn need_merge(&self, active: &[ActiveCommitment]) -> bool {
        active.len() > self.config.max_spend_inputs
    }

    pub async fn is_commitment_inserted(
        &self,
        hash: &CommitmentHash,
        hint: Option<u64>,
    ) -> Result<bool, CoreError> {
        Ok(self.resolver.has_commitment(hash, hint.unwrap_or(0)).await?)
    }

    /// Poll until `hash` is in the tree. `Ok(false)` once `timeout` elapses.
    ///
    /// The deadline only ends the wait between polls; a check already issued
    /// runs to completion.
    pub async fn await_commitment_insertion(
        &self,
        hash: &CommitmentHash,
        hint: Option<u64>,
        poll_interval: Duration,
        timeout: Duration,
    ) -> Result<bool, CoreError> {
        let deadline = Instant::now() + timeout;
        let mut ticker = time::interval(poll_interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = time::sleep_until(deadline) => {
                    debug!("Gave up waiting for {} after {:?}", hash, timeout);
                    return Ok(false);
                }
                _ = ticker.tick() => {}
            }
            if self.is_commitment_inserted(hash, hint).await? {
                return Ok(true);
            }
        }
    }

    /// [`Self::await_commitment_insertion`] with the configured interval and timeout
    pub async fn wait_for_insertion(
        &self,
        hash: &CommitmentHash,
        hint: Option<u64>,
    ) -> Result<bool, CoreError> {
        self.await_commitment_insertion(
            hash,
            hint,
            self.config.poll_interval(),
            self.config.insertion_timeout(),
        )
        .await
    }

    pub async fn commitment_phase(&self, nonce: u64) -> Option<CommitmentPhase> {
        self.store.read().await.get(nonce).map(CommitmentState::phase)
    }

    pub async fn commitment_state(&self, nonce: u64) -> Option<CommitmentState> {
        self.store.read().await.get(nonce).cloned()
    }

    /// Encrypted metadata sidecar for an outgoing transaction
    pub fn build_metadata(
        &self,
        record: &TxRecord,
        assoc_comm_index: u64,
        balance: u64,
    ) -> Result<EncryptedEnvelope, CryptoError> {
        let metadata = CommitmentMetadata {
            nonce: record.nonce,
            token_type: record.token_type,
            assoc_comm_index,
            balance,
        };
        self.history
            .keys()
            .encrypt_metadata(&metadata, &record.commitment_hash)
    }

    /// Tree index recorded in the record's own metadata
    fn metadata_index(&self, record: &TxRecord) -> Option<u64> {
        let envelope = record.metadata.as_ref()?;
        match self
            .history
            .keys()
            .decrypt_metadata(envelope, &record.commitment_hash)
        {
            Ok(metadata) if metadata.nonce == record.nonce => Some(metadata.assoc_comm_index),
            Ok(metadata) => {
                warn!(
                    "Metadata of nonce {} claims nonce {}, ignoring",
                    record.nonce, metadata.nonce
                );
                None
            }
            Err(e) => {
                warn!("Cannot read metadata of nonce {}: {}", record.nonce, e);
                None
            }
        }
    }
}
