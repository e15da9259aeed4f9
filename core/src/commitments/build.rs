//! Commitment reconstruction
//!
//! The output commitment of a transaction is recomputed from the owner's
//! keys and the transaction's private fields. The hash published on the
//! ledger is only accepted if it matches.

use shade_privacy::{CommitmentScheme, OutputPreimage, TokenType, ViewingKey};
use thiserror::Error;

use super::state::IncompleteCommitment;
use crate::types::{TxRecord, TxType};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("Input nonce {0} has no known output")]
    UnknownInput(u64),

    #[error("Input nonce {input} holds {found}, expected {expected}")]
    TokenMismatch {
        input: u64,
        expected: TokenType,
        found: TokenType,
    },

    #[error("Inputs worth {available} cannot cover {spent}")]
    Underflow { available: u64, spent: u64 },

    #[error("Top-up spends inputs")]
    TopupWithInputs,

    #[error("Recomputed commitment does not match the ledger")]
    HashMismatch,
}

/// Preimage of the output commitment of `record` holding `value`
pub fn output_preimage(keys: &ViewingKey, record: &TxRecord, value: u64) -> OutputPreimage {
    OutputPreimage {
        nullifier_secret: keys.nullifier_secret_for(record.nonce),
        token_type: record.token_type,
        value,
        amount: record.amount,
        fee: record.fee,
        linked_input: match record.tx_type {
            TxType::Topup => None,
            TxType::Send => record.inputs.first().copied(),
        },
    }
}

/// Value left in the output of `record`.
///
/// Top-ups hold the deposited amount. A send keeps the change:
/// sum of its inputs minus amount and fee.
pub fn output_value<F>(record: &TxRecord, input_value: F) -> Result<u64, BuildError>
where
    F: Fn(u64) -> Option<(TokenType, u64)>,
{
    match record.tx_type {
        TxType::Topup if !record.inputs.is_empty() => Err(BuildError::TopupWithInputs),
        TxType::Topup => Ok(record.amount),
        TxType::Send => {
            let mut available = 0u64;
            for input in &record.inputs {
                let (token, value) = input_value(*input).ok_or(BuildError::UnknownInput(*input))?;
                if token != record.token_type {
                    return Err(BuildError::TokenMismatch {
                        input: *input,
                        expected: record.token_type,
                        found: token,
                    });
                }
                available = available.saturating_add(value);
            }

            let spent = record.amount.saturating_add(record.fee);
            available
                .checked_sub(spent)
                .ok_or(BuildError::Underflow { available, spent })
        }
    }
}

/// Rebuild and check the output commitment of `record`
pub fn rebuild<F>(
    scheme: &CommitmentScheme,
    keys: &ViewingKey,
    record: &TxRecord,
    input_value: F,
) -> Result<IncompleteCommitment, BuildError>
where
    F: Fn(u64) -> Option<(TokenType, u64)>,
{
    let value = output_value(record, input_value)?;
    let preimage = output_preimage(keys, record, value);

    if scheme.commit_output(&preimage) != record.commitment_hash {
        return Err(BuildError::HashMismatch);
    }

    Ok(IncompleteCommitment {
        hash: record.commitment_hash,
        nonce: record.nonce,
        token_type: record.token_type,
        value,
        amount: record.amount,
        fee: record.fee,
        linked_input: preimage.linked_input,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TxStatus;
    use shade_privacy::CommitmentHash;

    fn record(nonce: u64, tx_type: TxType, amount: u64, fee: u64, inputs: Vec<u64>) -> TxRecord {
        TxRecord {
            nonce,
            tx_type,
            token_type: TokenType::USDC,
            identifier: shade_privacy::Identifier([0u8; 32]),
            amount,
            fee,
            commitment_hash: CommitmentHash([0u8; 32]),
            merkle_start_index: 0,
            warden: [0u8; 32],
            status: TxStatus::Confirmed,
            signature: None,
            inputs,
            metadata: None,
        }
    }

    #[test]
    fn send_keeps_change() {
        let send = record(1, TxType::Send, 30, 1, vec![0]);
        let value = output_value(&send, |_| Some((TokenType::USDC, 100))).unwrap();
        assert_eq!(value, 69);
    }

    #[test]
    fn send_failures() {
        let send = record(1, TxType::Send, 30, 1, vec![0]);
        assert_eq!(output_value(&send, |_| None), Err(BuildError::UnknownInput(0)));
        assert_eq!(
            output_value(&send, |_| Some((TokenType::USDC, 20))),
            Err(BuildError::Underflow {
                available: 20,
                spent: 31
            })
        );
        assert!(matches!(
            output_value(&send, |_| Some((TokenType::USDT, 100))),
            Err(BuildError::TokenMismatch { .. })
        ));
    }

    #[test]
    fn rebuild_accepts_only_matching_hash() {
        let keys = ViewingKey::from_bytes([3u8; 32]);
        let scheme = CommitmentScheme::new();
        let mut topup = record(0, TxType::Topup, 100, 2, vec![]);

        assert_eq!(
            rebuild(&scheme, &keys, &topup, |_| None),
            Err(BuildError::HashMismatch)
        );

        topup.commitment_hash = scheme.commit_output(&output_preimage(&keys, &topup, 100));
        let commitment = rebuild(&scheme, &keys, &topup, |_| None).unwrap();
        assert_eq!(commitment.value, 100);
        assert_eq!(commitment.linked_input, None);
    }

    #[test]
    fn topup_with_inputs_rejected() {
        let topup = record(0, TxType::Topup, 100, 0, vec![3]);
        assert_eq!(output_value(&topup, |_| None), Err(BuildError::TopupWithInputs));
    }
}
