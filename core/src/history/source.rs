use async_trait::async_trait;
use futures::future::try_join_all;
use log::{debug, warn};
use shade_privacy::ViewingKey;
use std::sync::Arc;

use crate::error::LedgerError;
use crate::ledger::{LedgerQuery, codec};
use crate::types::TxRecord;

/// Maps nonces to transaction records
///
/// The discovery algorithm only ever asks "which of these nonces exist";
/// how a nonce becomes a record is up to the implementation. Absent nonces
/// are omitted from the result.
#[async_trait]
pub trait TxSource: Send + Sync {
    async fn get_txs_from_nonces(
        &self,
        nonces: &[u64],
        keys: &ViewingKey,
    ) -> Result<Vec<TxRecord>, LedgerError>;
}

/// Resolves nonces through identifier lookups on the ledger
pub struct LedgerTxSource {
    ledger: Arc<dyn LedgerQuery>,
}

impl LedgerTxSource {
    pub fn new(ledger: Arc<dyn LedgerQuery>) -> Self {
        Self { ledger }
    }

    async fn fetch_nonce(
        &self,
        nonce: u64,
        keys: &ViewingKey,
    ) -> Result<Option<TxRecord>, LedgerError> {
        let identifier = keys.identifier_for(nonce);
        let signatures = self.ledger.get_signatures_for_address(&identifier).await?;

        for signature in signatures {
            let Some(tx) = self.ledger.get_parsed_transaction(&signature).await? else {
                continue;
            };
            if let Some(err) = &tx.err {
                debug!("Skipping failed transaction {} for nonce {}: {}", signature, nonce, err);
                continue;
            }

            match codec::open_record(keys, nonce, &tx) {
                Ok(record) => return Ok(Some(record)),
                Err(e) => warn!("Dropping undecodable transaction {} for nonce {}: {}", signature, nonce, e),
            }
        }

        Ok(None)
    }
}

#[async_trait]
impl TxSource for LedgerTxSource {
    async fn get_txs_from_nonces(
        &self,
        nonces: &[u64],
        keys: &ViewingKey,
    ) -> Result<Vec<TxRecord>, LedgerError> {
        let found = try_join_all(nonces.iter().map(|nonce| self.fetch_nonce(*nonce, keys))).await?;
        Ok(found.into_iter().flatten().collect())
    }
}
