//! Shade instruction payload
//!
//! ```text
//! u8 version | u8 tx_type | u16 token | [32] commitment_hash | u64 merkle_start_index
//! | [32] warden | [12] iv | u32 len | body ciphertext
//! | u32 meta_len | metadata envelope (iv || ciphertext), absent when meta_len = 0
//!
//! body plaintext: u64 amount | u64 fee | u16 n | n x u64 input nonce
//! ```
//!
//! All integers little-endian. Only the body and the metadata sidecar are
//! private; the commitment hash and tree hint are public.

use shade_privacy::{CommitmentHash, EncryptedEnvelope, TokenType, ViewingKey};

use super::ParsedTransaction;
use crate::error::CodecError;
use crate::types::{TxRecord, TxType};

pub const PAYLOAD_VERSION: u8 = 1;

/// Private part of a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxBody {
    pub amount: u64,
    pub fee: u64,
    pub inputs: Vec<u64>,
}

impl TxBody {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let count =
            u16::try_from(self.inputs.len()).map_err(|_| CodecError::TooManyInputs(self.inputs.len()))?;

        let mut bytes = Vec::with_capacity(18 + self.inputs.len() * 8);
        bytes.extend_from_slice(&self.amount.to_le_bytes());
        bytes.extend_from_slice(&self.fee.to_le_bytes());
        bytes.extend_from_slice(&count.to_le_bytes());
        for input in &self.inputs {
            bytes.extend_from_slice(&input.to_le_bytes());
        }
        Ok(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(bytes);
        let amount = reader.u64()?;
        let fee = reader.u64()?;
        let count = reader.u16()?;
        let inputs = (0..count)
            .map(|_| reader.u64())
            .collect::<Result<Vec<_>, _>>()?;
        reader.finish()?;

        Ok(Self {
            amount,
            fee,
            inputs,
        })
    }
}

/// Decoded instruction data, body still encrypted
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxPayload {
    pub tx_type: TxType,
    pub token_type: TokenType,
    pub commitment_hash: CommitmentHash,
    pub merkle_start_index: u64,
    pub warden: [u8; 32],
    pub body: EncryptedEnvelope,
    pub metadata: Option<EncryptedEnvelope>,
}

impl TxPayload {
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let body_len = u32::try_from(self.body.cipher_text.len())
            .map_err(|_| CodecError::TooLarge(self.body.cipher_text.len()))?;
        let metadata = self
            .metadata
            .as_ref()
            .map(EncryptedEnvelope::to_bytes)
            .unwrap_or_default();
        let metadata_len =
            u32::try_from(metadata.len()).map_err(|_| CodecError::TooLarge(metadata.len()))?;

        let mut data = Vec::with_capacity(128 + self.body.cipher_text.len() + metadata.len());
        data.push(PAYLOAD_VERSION);
        data.push(self.tx_type.to_u8());
        data.extend_from_slice(&self.token_type.0.to_le_bytes());
        data.extend_from_slice(self.commitment_hash.as_bytes());
        data.extend_from_slice(&self.merkle_start_index.to_le_bytes());
        data.extend_from_slice(&self.warden);
        data.extend_from_slice(&self.body.iv);
        data.extend_from_slice(&body_len.to_le_bytes());
        data.extend_from_slice(&self.body.cipher_text);
        data.extend_from_slice(&metadata_len.to_le_bytes());
        data.extend_from_slice(&metadata);
        Ok(data)
    }

    pub fn decode(data: &[u8]) -> Result<Self, CodecError> {
        let mut reader = Reader::new(data);

        let version = reader.u8()?;
        if version != PAYLOAD_VERSION {
            return Err(CodecError::UnsupportedVersion(version));
        }
        let raw_type = reader.u8()?;
        let tx_type = TxType::from_u8(raw_type).ok_or(CodecError::UnknownTxType(raw_type))?;
        let token_type = TokenType(reader.u16()?);
        let commitment_hash = CommitmentHash(reader.array()?);
        let merkle_start_index = reader.u64()?;
        let warden = reader.array()?;

        let iv = reader.array()?;
        let body_len = reader.u32()? as usize;
        let cipher_text = reader.take(body_len)?.to_vec();

        let metadata_len = reader.u32()? as usize;
        let metadata = match metadata_len {
            0 => None,
            len => Some(EncryptedEnvelope::from_bytes(reader.take(len)?)?),
        };
        reader.finish()?;

        Ok(Self {
            tx_type,
            token_type,
            commitment_hash,
            merkle_start_index,
            warden,
            body: EncryptedEnvelope { iv, cipher_text },
            metadata,
        })
    }
}

/// Encrypt and encode the instruction data for `record`
pub fn seal_record(keys: &ViewingKey, record: &TxRecord) -> Result<Vec<u8>, CodecError> {
    let body = TxBody {
        amount: record.amount,
        fee: record.fee,
        inputs: record.inputs.clone(),
    };
    let envelope = keys.encrypt(&body.to_bytes()?, record.nonce)?;

    TxPayload {
        tx_type: record.tx_type,
        token_type: record.token_type,
        commitment_hash: record.commitment_hash,
        merkle_start_index: record.merkle_start_index,
        warden: record.warden,
        body: envelope,
        metadata: record.metadata.clone(),
    }
    .encode()
}

/// Decode and decrypt a ledger transaction found under the identifier of `nonce`
pub fn open_record(
    keys: &ViewingKey,
    nonce: u64,
    tx: &ParsedTransaction,
) -> Result<TxRecord, CodecError> {
    let payload = TxPayload::decode(&tx.data)?;
    let body = TxBody::from_bytes(&keys.decrypt(&payload.body, nonce)?)?;

    Ok(TxRecord {
        nonce,
        tx_type: payload.tx_type,
        token_type: payload.token_type,
        identifier: keys.identifier_for(nonce),
        amount: body.amount,
        fee: body.fee,
        commitment_hash: payload.commitment_hash,
        merkle_start_index: payload.merkle_start_index,
        warden: payload.warden,
        status: tx.confirmation.into(),
        signature: Some(tx.signature),
        inputs: body.inputs,
        metadata: payload.metadata,
    })
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let remaining = self.bytes.len() - self.pos;
        if len > remaining {
            return Err(CodecError::Truncated {
                needed: len,
                remaining,
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.array::<1>()?[0])
    }

    fn u16(&mut self) -> Result<u16, CodecError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    fn u32(&mut self) -> Result<u32, CodecError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    fn u64(&mut self) -> Result<u64, CodecError> {
        Ok(u64::from_le_bytes(self.array()?))
    }

    fn finish(self) -> Result<(), CodecError> {
        match self.bytes.len() - self.pos {
            0 => Ok(()),
            extra => Err(CodecError::TrailingBytes(extra)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{ConfirmationStatus, Signature};
    use crate::types::TxStatus;
    use shade_privacy::{CommitmentMetadata, CryptoError};

    fn record(keys: &ViewingKey) -> TxRecord {
        let commitment_hash = CommitmentHash([4u8; 32]);
        let metadata = CommitmentMetadata {
            nonce: 3,
            token_type: TokenType::USDC,
            assoc_comm_index: 17,
            balance: 69,
        };

        TxRecord {
            nonce: 3,
            tx_type: TxType::Send,
            token_type: TokenType::USDC,
            identifier: keys.identifier_for(3),
            amount: 30,
            fee: 1,
            commitment_hash,
            merkle_start_index: 16,
            warden: [2u8; 32],
            status: TxStatus::Confirmed,
            signature: None,
            inputs: vec![0, 2],
            metadata: Some(keys.encrypt_metadata(&metadata, &commitment_hash).unwrap()),
        }
    }

    fn parsed(data: Vec<u8>) -> ParsedTransaction {
        ParsedTransaction {
            signature: Signature([1u8; 64]),
            slot: 9,
            confirmation: ConfirmationStatus::Finalized,
            err: None,
            accounts: vec![],
            data,
        }
    }

    #[test]
    fn sealed_record_opens_with_same_key() {
        let keys = ViewingKey::from_bytes([1u8; 32]);
        let original = record(&keys);

        let data = seal_record(&keys, &original).unwrap();
        let opened = open_record(&keys, 3, &parsed(data)).unwrap();

        assert_eq!(opened.amount, 30);
        assert_eq!(opened.fee, 1);
        assert_eq!(opened.inputs, vec![0, 2]);
        assert_eq!(opened.signature, Some(Signature([1u8; 64])));
        assert_eq!(opened.status, TxStatus::Confirmed);
        assert_eq!(opened.metadata, original.metadata);
        assert_eq!(opened.identifier, original.identifier);
    }

    #[test]
    fn wrong_nonce_cannot_open_body() {
        let keys = ViewingKey::from_bytes([1u8; 32]);
        let data = seal_record(&keys, &record(&keys)).unwrap();

        let result = open_record(&keys, 4, &parsed(data));
        assert_eq!(result, Err(CodecError::Crypto(CryptoError::DecryptionFailed)));
    }

    #[test]
    fn header_fields_are_validated() {
        let keys = ViewingKey::from_bytes([1u8; 32]);
        let mut data = seal_record(&keys, &record(&keys)).unwrap();

        data[1] = 9;
        assert_eq!(TxPayload::decode(&data), Err(CodecError::UnknownTxType(9)));

        data[0] = 2;
        assert_eq!(TxPayload::decode(&data), Err(CodecError::UnsupportedVersion(2)));
    }

    #[test]
    fn truncated_and_padded_payloads_rejected() {
        let keys = ViewingKey::from_bytes([1u8; 32]);
        let data = seal_record(&keys, &record(&keys)).unwrap();

        assert!(matches!(
            TxPayload::decode(&data[..40]),
            Err(CodecError::Truncated { .. })
        ));

        let mut padded = data.clone();
        padded.push(0);
        assert_eq!(TxPayload::decode(&padded), Err(CodecError::TrailingBytes(1)));
    }

    #[test]
    fn payload_without_metadata() {
        let keys = ViewingKey::from_bytes([1u8; 32]);
        let mut topup = record(&keys);
        topup.tx_type = TxType::Topup;
        topup.inputs.clear();
        topup.metadata = None;

        let payload = TxPayload::decode(&seal_record(&keys, &topup).unwrap()).unwrap();
        assert_eq!(payload.metadata, None);
        assert_eq!(payload.tx_type, TxType::Topup);
        assert_eq!(payload.merkle_start_index, 16);
    }

    #[test]
    fn body_layout() {
        let body = TxBody {
            amount: 100,
            fee: 1,
            inputs: vec![0, 5],
        };
        let bytes = body.to_bytes().unwrap();
        assert_eq!(
            hex::encode(&bytes),
            concat!(
                "6400000000000000",
                "0100000000000000",
                "0200",
                "0000000000000000",
                "0500000000000000",
            )
        );
        assert_eq!(TxBody::from_bytes(&bytes).unwrap(), body);
        assert!(matches!(
            TxBody::from_bytes(&bytes[..bytes.len() - 1]),
            Err(CodecError::Truncated { .. })
        ));
    }
}
