#![allow(dead_code)] // Each test binary uses a different subset

use async_trait::async_trait;
use shade_config::{CommitmentConfig, SyncConfig, TreeConfig};
use shade_core::commitments::build::{output_preimage, output_value};
use shade_core::ledger::codec::seal_record;
use shade_core::{
    CommitmentManager, ConfirmationStatus, LedgerError, LedgerTxSource, MemoryLedger,
    MemoryTreeStorage, TreeResolver, TxHistory, TxRecord, TxSource, TxStatus, TxType,
};
use shade_privacy::{CommitmentHash, CommitmentMetadata, CommitmentScheme, TokenType, ViewingKey};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub enum Metadata {
    Omit,
    Honest,
    Balance(u64),
}

/// Test wallet that publishes well-formed transactions to an in-memory
/// ledger and tree
pub struct Wallet {
    pub keys: ViewingKey,
    pub ledger: Arc<MemoryLedger>,
    pub tree: Arc<MemoryTreeStorage>,
    scheme: CommitmentScheme,
    values: HashMap<u64, u64>,
    balances: HashMap<TokenType, u64>,
}

impl Wallet {
    pub fn new(seed: u8) -> Self {
        init_logger();
        Self {
            keys: ViewingKey::from_bytes([seed; 32]),
            ledger: Arc::new(MemoryLedger::new()),
            tree: Arc::new(MemoryTreeStorage::new()),
            scheme: CommitmentScheme::new(),
            values: HashMap::new(),
            balances: HashMap::new(),
        }
    }

    pub fn history(&self, config: SyncConfig) -> Arc<TxHistory> {
        let source = Arc::new(LedgerTxSource::new(self.ledger.clone()));
        Arc::new(TxHistory::new(self.keys.clone(), source, config))
    }

    pub fn resolver(&self, config: TreeConfig) -> Arc<TreeResolver> {
        Arc::new(TreeResolver::new(self.tree.clone(), config))
    }

    pub fn manager(&self, config: CommitmentConfig) -> CommitmentManager {
        CommitmentManager::new(
            self.history(SyncConfig::default()),
            self.resolver(TreeConfig::default()),
            config,
        )
    }

    /// Build a record whose commitment hash is correct for this wallet
    pub async fn prepare(
        &self,
        nonce: u64,
        tx_type: TxType,
        token: TokenType,
        amount: u64,
        fee: u64,
        inputs: Vec<u64>,
    ) -> TxRecord {
        let mut record = TxRecord {
            nonce,
            tx_type,
            token_type: token,
            identifier: self.keys.identifier_for(nonce),
            amount,
            fee,
            commitment_hash: CommitmentHash([0u8; 32]),
            merkle_start_index: self.tree.len().await,
            warden: [7u8; 32],
            status: TxStatus::Confirmed,
            signature: None,
            inputs,
            metadata: None,
        };
        let value = self.value_of(&record);
        record.commitment_hash = self
            .scheme
            .commit_output(&output_preimage(&self.keys, &record, value));
        record
    }

    pub async fn publish_with(
        &mut self,
        mut record: TxRecord,
        confirmation: ConfirmationStatus,
        insert: bool,
        metadata: Metadata,
    ) -> TxRecord {
        let value = self.value_of(&record);
        let index = if insert {
            self.tree
                .insert(&record.commitment_hash)
                .await
                .expect("tree has room")
        } else {
            record.merkle_start_index
        };

        let balance = self.balances.entry(record.token_type).or_default();
        *balance = *balance + record.credit() - record.debit();
        let honest = *balance;

        let claimed = match metadata {
            Metadata::Omit => None,
            Metadata::Honest => Some(honest),
            Metadata::Balance(claimed) => Some(claimed),
        };
        record.metadata = claimed.map(|balance| {
            let metadata = CommitmentMetadata {
                nonce: record.nonce,
                token_type: record.token_type,
                assoc_comm_index: index,
                balance,
            };
            self.keys
                .encrypt_metadata(&metadata, &record.commitment_hash)
                .unwrap()
        });

        self.values.insert(record.nonce, value);
        let data = seal_record(&self.keys, &record).unwrap();
        let signature = self
            .ledger
            .submit(vec![record.identifier], data, confirmation)
            .await;
        record.signature = Some(signature);
        record
    }

    pub async fn publish(&mut self, record: TxRecord) -> TxRecord {
        self.publish_with(record, ConfirmationStatus::Finalized, true, Metadata::Honest)
            .await
    }

    pub async fn topup(&mut self, nonce: u64, token: TokenType, amount: u64) -> TxRecord {
        let record = self
            .prepare(nonce, TxType::Topup, token, amount, 0, vec![])
            .await;
        self.publish(record).await
    }

    pub async fn send(
        &mut self,
        nonce: u64,
        token: TokenType,
        amount: u64,
        fee: u64,
        inputs: Vec<u64>,
    ) -> TxRecord {
        let record = self
            .prepare(nonce, TxType::Send, token, amount, fee, inputs)
            .await;
        self.publish(record).await
    }

    fn value_of(&self, record: &TxRecord) -> u64 {
        output_value(record, |nonce| {
            self.values
                .get(&nonce)
                .map(|value| (record.token_type, *value))
        })
        .unwrap()
    }
}

/// Source answering from a scripted table instead of the ledger
#[derive(Default)]
pub struct ScriptedSource {
    records: Mutex<HashMap<u64, TxRecord>>,
    calls: Mutex<Vec<Vec<u64>>>,
}

impl ScriptedSource {
    pub fn set(&self, record: TxRecord) {
        self.records.lock().unwrap().insert(record.nonce, record);
    }

    pub fn remove(&self, nonce: u64) {
        self.records.lock().unwrap().remove(&nonce);
    }

    /// Every nonce batch requested so far
    pub fn calls(&self) -> Vec<Vec<u64>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl TxSource for ScriptedSource {
    async fn get_txs_from_nonces(
        &self,
        nonces: &[u64],
        _keys: &ViewingKey,
    ) -> Result<Vec<TxRecord>, LedgerError> {
        self.calls.lock().unwrap().push(nonces.to_vec());
        let records = self.records.lock().unwrap();
        Ok(nonces
            .iter()
            .filter_map(|nonce| records.get(nonce).cloned())
            .collect())
    }
}

/// Bare record for scripted sources; commitment hash is not meaningful
pub fn scripted_record(nonce: u64, tx_type: TxType, amount: u64, fee: u64, status: TxStatus) -> TxRecord {
    TxRecord {
        nonce,
        tx_type,
        token_type: TokenType::LAMPORTS,
        identifier: ViewingKey::from_bytes([0u8; 32]).identifier_for(nonce),
        amount,
        fee,
        commitment_hash: CommitmentHash([nonce as u8 + 1; 32]),
        merkle_start_index: 0,
        warden: [0u8; 32],
        status,
        signature: None,
        inputs: vec![],
        metadata: None,
    }
}
