//! In-memory ledger used by tests and offline tooling.

use async_trait::async_trait;
use shade_privacy::Identifier;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::{ConfirmationStatus, LedgerQuery, ParsedTransaction, Signature};
use crate::error::LedgerError;

#[derive(Default)]
struct LedgerState {
    transactions: HashMap<Signature, ParsedTransaction>,
    /// Signatures per address, oldest first
    by_address: HashMap<Identifier, Vec<Signature>>,
    next_slot: u64,
}

/// Append-only ledger held in memory
#[derive(Default)]
pub struct MemoryLedger {
    state: RwLock<LedgerState>,
    unavailable: AtomicBool,
    signature_queries: AtomicUsize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful transaction touching `accounts`
    pub async fn submit(
        &self,
        accounts: Vec<Identifier>,
        data: Vec<u8>,
        confirmation: ConfirmationStatus,
    ) -> Signature {
        self.push(accounts, data, confirmation, None).await
    }

    /// Record a transaction that failed on-chain
    pub async fn submit_failed(
        &self,
        accounts: Vec<Identifier>,
        data: Vec<u8>,
        reason: &str,
    ) -> Signature {
        self.push(
            accounts,
            data,
            ConfirmationStatus::Finalized,
            Some(reason.to_string()),
        )
        .await
    }

    /// Move a transaction to a new confirmation level. Returns false if unknown.
    pub async fn set_confirmation(
        &self,
        signature: &Signature,
        confirmation: ConfirmationStatus,
    ) -> bool {
        let mut state = self.state.write().await;
        match state.transactions.get_mut(signature) {
            Some(tx) => {
                tx.confirmation = confirmation;
                true
            }
            None => false,
        }
    }

    /// Make every query fail with a transport error
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of `get_signatures_for_address` calls served so far
    pub fn signature_queries(&self) -> usize {
        self.signature_queries.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.transactions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn push(
        &self,
        accounts: Vec<Identifier>,
        data: Vec<u8>,
        confirmation: ConfirmationStatus,
        err: Option<String>,
    ) -> Signature {
        let mut state = self.state.write().await;

        let slot = state.next_slot;
        state.next_slot += 1;

        let mut raw = [0u8; 64];
        raw[..8].copy_from_slice(&slot.to_le_bytes());
        if let Some(first) = accounts.first() {
            raw[8..40].copy_from_slice(first.as_bytes());
        }
        let signature = Signature(raw);

        for account in &accounts {
            state
                .by_address
                .entry(*account)
                .or_default()
                .push(signature);
        }
        state.transactions.insert(
            signature,
            ParsedTransaction {
                signature,
                slot,
                confirmation,
                err,
                accounts,
                data,
            },
        );

        signature
    }

    fn check_available(&self) -> Result<(), LedgerError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(LedgerError::Transport("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl LedgerQuery for MemoryLedger {
    async fn get_signatures_for_address(
        &self,
        address: &Identifier,
    ) -> Result<Vec<Signature>, LedgerError> {
        self.signature_queries.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;

        let state = self.state.read().await;
        Ok(state
            .by_address
            .get(address)
            .map(|sigs| sigs.iter().rev().copied().collect())
            .unwrap_or_default())
    }

    async fn get_parsed_transaction(
        &self,
        signature: &Signature,
    ) -> Result<Option<ParsedTransaction>, LedgerError> {
        self.check_available()?;
        Ok(self.state.read().await.transactions.get(signature).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signatures_are_listed_newest_first() {
        let ledger = MemoryLedger::new();
        let address = Identifier([1u8; 32]);

        let first = ledger
            .submit(vec![address], vec![1], ConfirmationStatus::Confirmed)
            .await;
        let second = ledger
            .submit(vec![address], vec![2], ConfirmationStatus::Processed)
            .await;

        let sigs = ledger.get_signatures_for_address(&address).await.unwrap();
        assert_eq!(sigs, vec![second, first]);

        let tx = ledger.get_parsed_transaction(&first).await.unwrap().unwrap();
        assert_eq!(tx.data, vec![1]);
        assert_eq!(tx.slot, 0);
    }

    #[tokio::test]
    async fn unknown_address_is_empty_not_error() {
        let ledger = MemoryLedger::new();
        let sigs = ledger
            .get_signatures_for_address(&Identifier([9u8; 32]))
            .await
            .unwrap();
        assert!(sigs.is_empty());
        assert_eq!(ledger.signature_queries(), 1);
    }

    #[tokio::test]
    async fn unavailable_ledger_reports_transport_error() {
        let ledger = MemoryLedger::new();
        ledger.set_unavailable(true);

        let result = ledger.get_signatures_for_address(&Identifier([0u8; 32])).await;
        assert!(matches!(result, Err(LedgerError::Transport(_))));
    }

    #[tokio::test]
    async fn confirmation_can_be_upgraded() {
        let ledger = MemoryLedger::new();
        let sig = ledger
            .submit(vec![Identifier([1u8; 32])], vec![], ConfirmationStatus::Processed)
            .await;

        assert!(ledger.set_confirmation(&sig, ConfirmationStatus::Finalized).await);
        let tx = ledger.get_parsed_transaction(&sig).await.unwrap().unwrap();
        assert_eq!(tx.confirmation, ConfirmationStatus::Finalized);
        assert!(!ledger.set_confirmation(&Signature([7u8; 64]), ConfirmationStatus::Confirmed).await);
    }
}
