//! Ethereum transaction types, signing digests and signed encodings.
//!
//! Supported transaction types:
//!
//! - **Legacy**: with [EIP-155] replay protection, or without a chain id
//! - **EIP-2930** (type 1): access list transactions
//! - **EIP-1559** (type 2): priority fee transactions
//! - **EIP-4844** (type 3): blob transactions, optionally carrying sidecars
//!
//! # Signing Flow
//!
//! 1. [`Transaction::digest_for_signing`] gives the 32-byte digest the chip signs
//! 2. The chip signs it and reports `r`, `s` and `v`
//! 3. [`Transaction::assemble_signed`] re-encodes the original transaction with
//!    the signature into wire-ready bytes
//!
//! Blob sidecars never enter the digest. A signed EIP-4844 transaction that
//! carries sidecars is assembled in its network form,
//! `0x03 || rlp([tx_payload_body, blobs, commitments, proofs])`.
//!
//! # Example
//!
//! ```
//! use halo_evm_signer_core::{Eip1559Transaction, Transaction};
//! use alloy_primitives::{Address, Bytes, U256};
//!
//! let tx = Transaction::Eip1559(Eip1559Transaction {
//!     chain_id: 1,
//!     nonce: 0,
//!     max_priority_fee_per_gas: U256::from(1_000_000_000u64),
//!     max_fee_per_gas: U256::from(100_000_000_000u64),
//!     gas_limit: 21000,
//!     to: Some(Address::ZERO),
//!     value: U256::from(1_000_000_000_000_000_000u128),
//!     data: Bytes::new(),
//!     access_list: vec![],
//! });
//!
//! let digest = tx.digest_for_signing();
//! // Have the chip sign `digest`...
//! ```
//!
//! [EIP-155]: https://eips.ethereum.org/EIPS/eip-155

use alloy_primitives::{Address, B256, Bytes, FixedBytes, U256, keccak256};
use alloy_rlp::{Decodable, EMPTY_STRING_CODE, Encodable, Header, RlpDecodable, RlpEncodable};
use serde::{Deserialize, Serialize};

use crate::crypto::recover_address;
use crate::error::{Error, Result};
use crate::signature::ChipSignature;

/// Largest chain id whose EIP-155 `v` still fits in a `u64`.
const MAX_EIP155_CHAIN_ID: u64 = (u64::MAX - 36) / 2;

/// An access list entry for EIP-2930 and later transactions.
///
/// Access lists specify which addresses and storage keys will be accessed
/// during transaction execution, potentially reducing gas costs.
#[derive(
    Debug, Clone, PartialEq, Eq, Serialize, Deserialize, RlpEncodable, RlpDecodable,
)]
#[serde(rename_all = "camelCase")]
pub struct AccessListEntry {
    /// The address being accessed.
    pub address: Address,

    /// The storage keys being accessed at this address.
    pub storage_keys: Vec<B256>,
}

/// One blob with its KZG commitment and proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobSidecar {
    /// The blob, exactly [`Eip4844Transaction::BLOB_SIZE`] bytes.
    pub blob: Bytes,

    /// The KZG commitment to the blob.
    pub commitment: FixedBytes<48>,

    /// The KZG proof for the blob.
    pub proof: FixedBytes<48>,
}

/// A legacy transaction.
///
/// With a chain id it follows [EIP-155]; without one it is signed as a
/// pre-EIP-155 transaction with `v` in `{27, 28}`.
///
/// [EIP-155]: https://eips.ethereum.org/EIPS/eip-155
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyTransaction {
    /// The chain ID for replay protection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,

    /// The transaction nonce.
    pub nonce: u64,

    /// The gas price in wei.
    pub gas_price: U256,

    /// The gas limit.
    pub gas_limit: u64,

    /// The recipient address, or `None` for contract creation.
    #[serde(default)]
    pub to: Option<Address>,

    /// The value to transfer in wei.
    pub value: U256,

    /// The transaction input data.
    #[serde(default)]
    pub data: Bytes,
}

impl LegacyTransaction {
    fn encode_fields(&self, out: &mut Vec<u8>) {
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        encode_to(self.to.as_ref(), out);
        self.value.encode(out);
        self.data.encode(out);
    }

    /// Encodes the payload whose hash is signed.
    ///
    /// `rlp([nonce, gasPrice, gasLimit, to, value, data, chainId, 0, 0])` with a
    /// chain id, or the first six fields without one.
    #[must_use]
    pub fn encode_for_signing(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_rlp_list(&mut buf, |buf| {
            self.encode_fields(buf);
            if let Some(chain_id) = self.chain_id {
                chain_id.encode(buf);
                0u8.encode(buf);
                0u8.encode(buf);
            }
        });
        buf
    }

    /// Returns the `v` value of the signed encoding.
    ///
    /// `chain_id * 2 + 35 + yParity` with a chain id, otherwise the chip's own
    /// `27` or `28`.
    pub(crate) fn signed_v(&self, signature: &ChipSignature) -> Result<u64> {
        match self.chain_id {
            Some(chain_id) => chain_id
                .checked_mul(2)
                .and_then(|v| v.checked_add(35 + u64::from(signature.y_parity())))
                .ok_or_else(|| {
                    Error::Serialization(format!("chain id {chain_id} overflows v"))
                }),
            None => Ok(u64::from(signature.v())),
        }
    }

    fn encode_signed(&self, signature: &ChipSignature) -> Result<Vec<u8>> {
        let v = self.signed_v(signature)?;
        let mut buf = Vec::new();
        encode_rlp_list(&mut buf, |buf| {
            self.encode_fields(buf);
            v.encode(buf);
            signature.r_u256().encode(buf);
            signature.s_u256().encode(buf);
        });
        Ok(buf)
    }

    fn decode_signed(buf: &mut &[u8]) -> Result<(Self, ChipSignature)> {
        let mut payload = decode_list(buf)?;

        let nonce = u64::decode(&mut payload)?;
        let gas_price = U256::decode(&mut payload)?;
        let gas_limit = u64::decode(&mut payload)?;
        let to = decode_to(&mut payload)?;
        let value = U256::decode(&mut payload)?;
        let data = Bytes::decode(&mut payload)?;
        let v = u64::decode(&mut payload)?;
        let r = U256::decode(&mut payload)?;
        let s = U256::decode(&mut payload)?;
        ensure_consumed(payload)?;

        let (chain_id, y_parity) = match v {
            27 | 28 => (None, u8::from(v == 28)),
            // 35 and 36 would mean chain id 0.
            v if v >= 37 => (Some((v - 35) / 2), u8::from((v - 35) % 2 == 1)),
            v => {
                return Err(Error::Serialization(format!(
                    "invalid legacy signature v {v}"
                )));
            }
        };

        let tx = Self {
            chain_id,
            nonce,
            gas_price,
            gas_limit,
            to,
            value,
            data,
        };
        let signature =
            ChipSignature::from_parity(r.to_be_bytes::<32>(), s.to_be_bytes::<32>(), y_parity)?;

        Ok((tx, signature))
    }
}

/// An EIP-2930 (Type 1) transaction.
///
/// See [EIP-2930] for details.
///
/// [EIP-2930]: https://eips.ethereum.org/EIPS/eip-2930
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip2930Transaction {
    /// The chain ID.
    pub chain_id: u64,

    /// The transaction nonce.
    pub nonce: u64,

    /// The gas price in wei.
    pub gas_price: U256,

    /// The gas limit.
    pub gas_limit: u64,

    /// The recipient address, or `None` for contract creation.
    #[serde(default)]
    pub to: Option<Address>,

    /// The value to transfer in wei.
    pub value: U256,

    /// The transaction input data.
    #[serde(default)]
    pub data: Bytes,

    /// The access list.
    #[serde(default)]
    pub access_list: Vec<AccessListEntry>,
}

impl Eip2930Transaction {
    /// The transaction type identifier for EIP-2930.
    pub const TX_TYPE: u8 = 0x01;

    fn encode_fields(&self, out: &mut Vec<u8>) {
        self.chain_id.encode(out);
        self.nonce.encode(out);
        self.gas_price.encode(out);
        self.gas_limit.encode(out);
        encode_to(self.to.as_ref(), out);
        self.value.encode(out);
        self.data.encode(out);
        self.access_list.encode(out);
    }

    fn decode_fields(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            chain_id: u64::decode(buf)?,
            nonce: u64::decode(buf)?,
            gas_price: U256::decode(buf)?,
            gas_limit: u64::decode(buf)?,
            to: decode_to(buf)?,
            value: U256::decode(buf)?,
            data: Bytes::decode(buf)?,
            access_list: Vec::decode(buf)?,
        })
    }
}

/// An EIP-1559 (Type 2) transaction.
///
/// This transaction type introduces:
///
/// - Base fee burning
/// - Priority fee (tip) for validators
/// - More predictable gas pricing
///
/// See [EIP-1559] for details.
///
/// [EIP-1559]: https://eips.ethereum.org/EIPS/eip-1559
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip1559Transaction {
    /// The chain ID.
    pub chain_id: u64,

    /// The transaction nonce.
    pub nonce: u64,

    /// The maximum priority fee per gas (tip).
    pub max_priority_fee_per_gas: U256,

    /// The maximum total fee per gas.
    pub max_fee_per_gas: U256,

    /// The gas limit.
    pub gas_limit: u64,

    /// The recipient address, or `None` for contract creation.
    #[serde(default)]
    pub to: Option<Address>,

    /// The value to transfer in wei.
    pub value: U256,

    /// The transaction input data.
    #[serde(default)]
    pub data: Bytes,

    /// The access list.
    #[serde(default)]
    pub access_list: Vec<AccessListEntry>,
}

impl Eip1559Transaction {
    /// The transaction type identifier for EIP-1559.
    pub const TX_TYPE: u8 = 0x02;

    fn encode_fields(&self, out: &mut Vec<u8>) {
        self.chain_id.encode(out);
        self.nonce.encode(out);
        self.max_priority_fee_per_gas.encode(out);
        self.max_fee_per_gas.encode(out);
        self.gas_limit.encode(out);
        encode_to(self.to.as_ref(), out);
        self.value.encode(out);
        self.data.encode(out);
        self.access_list.encode(out);
    }

    fn decode_fields(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            chain_id: u64::decode(buf)?,
            nonce: u64::decode(buf)?,
            max_priority_fee_per_gas: U256::decode(buf)?,
            max_fee_per_gas: U256::decode(buf)?,
            gas_limit: u64::decode(buf)?,
            to: decode_to(buf)?,
            value: U256::decode(buf)?,
            data: Bytes::decode(buf)?,
            access_list: Vec::decode(buf)?,
        })
    }
}

/// An EIP-4844 (Type 3) blob transaction.
///
/// See [EIP-4844] for details.
///
/// [EIP-4844]: https://eips.ethereum.org/EIPS/eip-4844
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip4844Transaction {
    /// The chain ID.
    pub chain_id: u64,

    /// The transaction nonce.
    pub nonce: u64,

    /// The maximum priority fee per gas (tip).
    pub max_priority_fee_per_gas: U256,

    /// The maximum total fee per gas.
    pub max_fee_per_gas: U256,

    /// The gas limit.
    pub gas_limit: u64,

    /// The recipient; blob transactions cannot create contracts.
    pub to: Address,

    /// The value to transfer in wei.
    pub value: U256,

    /// The transaction input data.
    #[serde(default)]
    pub data: Bytes,

    /// The access list.
    #[serde(default)]
    pub access_list: Vec<AccessListEntry>,

    /// The maximum fee per blob gas.
    pub max_fee_per_blob_gas: U256,

    /// Versioned hashes of the blobs.
    pub blob_versioned_hashes: Vec<B256>,

    /// The blobs themselves; never part of the signing digest.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sidecars: Option<Vec<BlobSidecar>>,
}

impl Eip4844Transaction {
    /// The transaction type identifier for EIP-4844.
    pub const TX_TYPE: u8 = 0x03;

    /// Size of one blob in bytes.
    pub const BLOB_SIZE: usize = 131_072;

    /// Version byte of a KZG versioned hash.
    pub const VERSIONED_HASH_VERSION_KZG: u8 = 0x01;

    fn encode_fields(&self, out: &mut Vec<u8>) {
        self.chain_id.encode(out);
        self.nonce.encode(out);
        self.max_priority_fee_per_gas.encode(out);
        self.max_fee_per_gas.encode(out);
        self.gas_limit.encode(out);
        self.to.encode(out);
        self.value.encode(out);
        self.data.encode(out);
        self.access_list.encode(out);
        self.max_fee_per_blob_gas.encode(out);
        self.blob_versioned_hashes.encode(out);
    }

    fn decode_fields(buf: &mut &[u8]) -> Result<Self> {
        Ok(Self {
            chain_id: u64::decode(buf)?,
            nonce: u64::decode(buf)?,
            max_priority_fee_per_gas: U256::decode(buf)?,
            max_fee_per_gas: U256::decode(buf)?,
            gas_limit: u64::decode(buf)?,
            to: Address::decode(buf)?,
            value: U256::decode(buf)?,
            data: Bytes::decode(buf)?,
            access_list: Vec::decode(buf)?,
            max_fee_per_blob_gas: U256::decode(buf)?,
            blob_versioned_hashes: Vec::decode(buf)?,
            sidecars: None,
        })
    }

    /// Encodes the network form:
    /// `0x03 || rlp([[fields..., yParity, r, s], blobs, commitments, proofs])`.
    fn encode_network(&self, signature: Option<&ChipSignature>, sidecars: &[BlobSidecar]) -> Vec<u8> {
        let blobs: Vec<&Bytes> = sidecars.iter().map(|s| &s.blob).collect();
        let commitments: Vec<&FixedBytes<48>> = sidecars.iter().map(|s| &s.commitment).collect();
        let proofs: Vec<&FixedBytes<48>> = sidecars.iter().map(|s| &s.proof).collect();

        let mut buf = vec![Self::TX_TYPE];
        encode_rlp_list(&mut buf, |buf| {
            encode_rlp_list(buf, |buf| {
                self.encode_fields(buf);
                if let Some(signature) = signature {
                    encode_signature(signature, buf);
                }
            });
            alloy_rlp::encode_list::<_, Bytes>(&blobs, buf);
            alloy_rlp::encode_list::<_, FixedBytes<48>>(&commitments, buf);
            alloy_rlp::encode_list::<_, FixedBytes<48>>(&proofs, buf);
        });
        buf
    }

    fn decode_signed(buf: &mut &[u8]) -> Result<(Self, ChipSignature)> {
        let mut outer = decode_list(buf)?;

        // The network form nests the signed body as its first list item.
        if outer.first().is_some_and(|b| *b >= alloy_rlp::EMPTY_LIST_CODE) {
            let (mut tx, signature) = decode_typed_body(&mut outer, Self::decode_fields)?;
            let blobs = Vec::<Bytes>::decode(&mut outer)?;
            let commitments = Vec::<FixedBytes<48>>::decode(&mut outer)?;
            let proofs = Vec::<FixedBytes<48>>::decode(&mut outer)?;
            ensure_consumed(outer)?;

            if blobs.len() != commitments.len() || blobs.len() != proofs.len() {
                return Err(Error::Serialization(format!(
                    "sidecar lists differ in length: {} blobs, {} commitments, {} proofs",
                    blobs.len(),
                    commitments.len(),
                    proofs.len()
                )));
            }

            tx.sidecars = Some(
                blobs
                    .into_iter()
                    .zip(commitments)
                    .zip(proofs)
                    .map(|((blob, commitment), proof)| BlobSidecar {
                        blob,
                        commitment,
                        proof,
                    })
                    .collect(),
            );
            return Ok((tx, signature));
        }

        let tx = Self::decode_fields(&mut outer)?;
        let signature = decode_signature(&mut outer)?;
        ensure_consumed(outer)?;
        Ok((tx, signature))
    }

    fn validate_blobs(&self) -> Result<()> {
        if self.blob_versioned_hashes.is_empty() {
            return Err(Error::Serialization(
                "blob transaction has no versioned hashes".to_string(),
            ));
        }

        if let Some(hash) = self
            .blob_versioned_hashes
            .iter()
            .find(|hash| hash[0] != Self::VERSIONED_HASH_VERSION_KZG)
        {
            return Err(Error::Serialization(format!(
                "versioned hash {hash} has version 0x{:02x}",
                hash[0]
            )));
        }

        if let Some(ref sidecars) = self.sidecars {
            if sidecars.len() != self.blob_versioned_hashes.len() {
                return Err(Error::Serialization(format!(
                    "{} sidecars for {} versioned hashes",
                    sidecars.len(),
                    self.blob_versioned_hashes.len()
                )));
            }
            if let Some(sidecar) = sidecars.iter().find(|s| s.blob.len() != Self::BLOB_SIZE) {
                return Err(Error::Serialization(format!(
                    "blob is {} bytes, expected {}",
                    sidecar.blob.len(),
                    Self::BLOB_SIZE
                )));
            }
        }

        Ok(())
    }
}

/// A transaction of any supported type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Transaction {
    /// Legacy transaction, with or without EIP-155.
    #[serde(rename = "legacy")]
    Legacy(LegacyTransaction),
    /// EIP-2930 (Type 1) transaction.
    #[serde(rename = "eip2930")]
    Eip2930(Eip2930Transaction),
    /// EIP-1559 (Type 2) transaction.
    #[serde(rename = "eip1559")]
    Eip1559(Eip1559Transaction),
    /// EIP-4844 (Type 3) transaction.
    #[serde(rename = "eip4844")]
    Eip4844(Eip4844Transaction),
}

impl Transaction {
    /// Returns the EIP-2718 type byte, `0` for legacy transactions.
    #[must_use]
    pub const fn tx_type(&self) -> u8 {
        match self {
            Self::Legacy(_) => 0,
            Self::Eip2930(_) => Eip2930Transaction::TX_TYPE,
            Self::Eip1559(_) => Eip1559Transaction::TX_TYPE,
            Self::Eip4844(_) => Eip4844Transaction::TX_TYPE,
        }
    }

    /// Returns the chain ID, if the transaction has one.
    #[must_use]
    pub const fn chain_id(&self) -> Option<u64> {
        match self {
            Self::Legacy(tx) => tx.chain_id,
            Self::Eip2930(tx) => Some(tx.chain_id),
            Self::Eip1559(tx) => Some(tx.chain_id),
            Self::Eip4844(tx) => Some(tx.chain_id),
        }
    }

    /// Returns a copy of the transaction with any blob sidecars removed.
    #[must_use]
    pub fn without_sidecars(&self) -> Self {
        match self {
            Self::Eip4844(tx) => Self::Eip4844(Eip4844Transaction {
                sidecars: None,
                ..tx.clone()
            }),
            other => other.clone(),
        }
    }

    /// Checks that the transaction can be signed and encoded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if:
    /// - a typed transaction has chain id `0`
    /// - a chain id is too large for EIP-155
    /// - the priority fee exceeds the fee cap
    /// - a blob transaction has no versioned hashes, a hash with a version
    ///   other than `0x01`, or sidecars that do not match its hashes
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Legacy(tx) => tx.chain_id.map_or(Ok(()), check_chain_id),
            Self::Eip2930(tx) => check_chain_id(tx.chain_id),
            Self::Eip1559(tx) => {
                check_chain_id(tx.chain_id)?;
                check_fees(&tx.max_priority_fee_per_gas, &tx.max_fee_per_gas)
            }
            Self::Eip4844(tx) => {
                check_chain_id(tx.chain_id)?;
                check_fees(&tx.max_priority_fee_per_gas, &tx.max_fee_per_gas)?;
                tx.validate_blobs()
            }
        }
    }

    /// Encodes the payload whose hash is signed.
    ///
    /// Typed transactions are `type || rlp(fields)`. Blob sidecars are never
    /// part of it.
    #[must_use]
    pub fn encode_for_signing(&self) -> Vec<u8> {
        let tx_type = self.tx_type();
        match self {
            Self::Legacy(tx) => tx.encode_for_signing(),
            Self::Eip2930(tx) => encode_typed(tx_type, |b| tx.encode_fields(b), None),
            Self::Eip1559(tx) => encode_typed(tx_type, |b| tx.encode_fields(b), None),
            Self::Eip4844(tx) => encode_typed(tx_type, |b| tx.encode_fields(b), None),
        }
    }

    /// Returns the 32-byte digest the chip signs.
    ///
    /// For a blob transaction this is the digest of the transaction with its
    /// sidecars stripped; it is the same with and without sidecars.
    #[must_use]
    pub fn digest_for_signing(&self) -> B256 {
        keccak256(self.encode_for_signing())
    }

    /// Encodes the original transaction together with its signature.
    ///
    /// Legacy transactions get `v = chainId * 2 + 35 + yParity` (or the chip's
    /// `27`/`28` without a chain id); typed transactions get `yParity`. A blob
    /// transaction with sidecars is emitted in its network form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if [`validate`](Self::validate) fails.
    pub fn assemble_signed(&self, signature: &ChipSignature) -> Result<Bytes> {
        self.validate()?;
        Ok(self.encode_signed(signature, true)?.into())
    }

    fn encode_signed(&self, signature: &ChipSignature, with_sidecars: bool) -> Result<Vec<u8>> {
        let tx_type = self.tx_type();
        Ok(match self {
            Self::Legacy(tx) => tx.encode_signed(signature)?,
            Self::Eip2930(tx) => encode_typed(tx_type, |b| tx.encode_fields(b), Some(signature)),
            Self::Eip1559(tx) => encode_typed(tx_type, |b| tx.encode_fields(b), Some(signature)),
            Self::Eip4844(tx) => match tx.sidecars {
                Some(ref sidecars) if with_sidecars => tx.encode_network(Some(signature), sidecars),
                _ => encode_typed(tx_type, |b| tx.encode_fields(b), Some(signature)),
            },
        })
    }

    /// Parses a transaction from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JsonError`] if parsing fails.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the transaction to JSON.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JsonError`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A transaction together with its signature, as decoded from the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// The transaction.
    pub transaction: Transaction,

    /// The signature, normalized to the chip's 27/28 convention.
    pub signature: ChipSignature,
}

impl SignedTransaction {
    /// Decodes a signed transaction in any supported wire form.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if the bytes are not a well-formed
    /// signed transaction of a supported type.
    pub fn decode(raw: &[u8]) -> Result<Self> {
        let (&first, rest) = raw
            .split_first()
            .ok_or_else(|| Error::Serialization("empty transaction".to_string()))?;

        let mut buf = rest;
        let (transaction, signature) = match first {
            b if b >= alloy_rlp::EMPTY_LIST_CODE => {
                buf = raw;
                let (tx, signature) = LegacyTransaction::decode_signed(&mut buf)?;
                (Transaction::Legacy(tx), signature)
            }
            Eip2930Transaction::TX_TYPE => {
                let (tx, signature) =
                    decode_typed_body(&mut buf, Eip2930Transaction::decode_fields)?;
                (Transaction::Eip2930(tx), signature)
            }
            Eip1559Transaction::TX_TYPE => {
                let (tx, signature) =
                    decode_typed_body(&mut buf, Eip1559Transaction::decode_fields)?;
                (Transaction::Eip1559(tx), signature)
            }
            Eip4844Transaction::TX_TYPE => {
                let (tx, signature) = Eip4844Transaction::decode_signed(&mut buf)?;
                (Transaction::Eip4844(tx), signature)
            }
            other => {
                return Err(Error::Serialization(format!(
                    "unsupported transaction type 0x{other:02x}"
                )));
            }
        };
        ensure_consumed(buf)?;

        Ok(Self {
            transaction,
            signature,
        })
    }

    /// Encodes the transaction back into its wire form.
    ///
    /// # Errors
    ///
    /// See [`Transaction::assemble_signed`].
    pub fn encode(&self) -> Result<Bytes> {
        self.transaction.assemble_signed(&self.signature)
    }

    /// Returns the transaction hash.
    ///
    /// Blob transactions are hashed without their sidecars.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Serialization`] if a legacy chain id is too large to
    /// encode in `v`.
    pub fn hash(&self) -> Result<B256> {
        Ok(keccak256(self.transaction.encode_signed(&self.signature, false)?))
    }

    /// Recovers the address that signed the transaction.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] if no key matches the signature.
    pub fn recover_signer(&self) -> Result<Address> {
        recover_address(&self.transaction.digest_for_signing(), &self.signature)
    }
}

fn check_chain_id(chain_id: u64) -> Result<()> {
    if chain_id == 0 {
        return Err(Error::Serialization("chain id must not be 0".to_string()));
    }
    if chain_id > MAX_EIP155_CHAIN_ID {
        return Err(Error::Serialization(format!("chain id {chain_id} is too large")));
    }
    Ok(())
}

fn check_fees(max_priority_fee_per_gas: &U256, max_fee_per_gas: &U256) -> Result<()> {
    if max_priority_fee_per_gas > max_fee_per_gas {
        return Err(Error::Serialization(format!(
            "priority fee {max_priority_fee_per_gas} exceeds fee cap {max_fee_per_gas}"
        )));
    }
    Ok(())
}

/// Encodes an RLP list using a closure to write elements.
fn encode_rlp_list<F>(out: &mut Vec<u8>, f: F)
where
    F: FnOnce(&mut Vec<u8>),
{
    let mut content = Vec::new();
    f(&mut content);

    let header = Header {
        list: true,
        payload_length: content.len(),
    };
    header.encode(out);
    out.extend_from_slice(&content);
}

/// Encodes `type || rlp([fields..., (yParity, r, s)])`.
fn encode_typed<F>(tx_type: u8, fields: F, signature: Option<&ChipSignature>) -> Vec<u8>
where
    F: FnOnce(&mut Vec<u8>),
{
    let mut buf = vec![tx_type];
    encode_rlp_list(&mut buf, |buf| {
        fields(buf);
        if let Some(signature) = signature {
            encode_signature(signature, buf);
        }
    });
    buf
}

fn encode_signature(signature: &ChipSignature, out: &mut Vec<u8>) {
    signature.y_parity().encode(out);
    signature.r_u256().encode(out);
    signature.s_u256().encode(out);
}

/// Encodes the recipient; contract creation is the empty string.
fn encode_to(to: Option<&Address>, out: &mut Vec<u8>) {
    match to {
        Some(address) => address.encode(out),
        None => out.push(EMPTY_STRING_CODE),
    }
}

fn decode_to(buf: &mut &[u8]) -> Result<Option<Address>> {
    if buf.first() == Some(&EMPTY_STRING_CODE) {
        *buf = &buf[1..];
        return Ok(None);
    }
    Ok(Some(Address::decode(buf)?))
}

/// Takes the payload of the next RLP list off `buf`.
fn decode_list<'a>(buf: &mut &'a [u8]) -> Result<&'a [u8]> {
    let header = Header::decode(buf)?;
    if !header.list {
        return Err(Error::Serialization("expected an RLP list".to_string()));
    }
    if buf.len() < header.payload_length {
        return Err(alloy_rlp::Error::InputTooShort.into());
    }

    let (payload, rest) = buf.split_at(header.payload_length);
    *buf = rest;
    Ok(payload)
}

fn decode_signature(buf: &mut &[u8]) -> Result<ChipSignature> {
    let y_parity = u8::decode(buf)?;
    let r = U256::decode(buf)?;
    let s = U256::decode(buf)?;
    ChipSignature::from_parity(r.to_be_bytes::<32>(), s.to_be_bytes::<32>(), y_parity)
        .map_err(|e| Error::Serialization(e.to_string()))
}

/// Decodes `rlp([fields..., yParity, r, s])`.
fn decode_typed_body<T>(
    buf: &mut &[u8],
    decode_fields: fn(&mut &[u8]) -> Result<T>,
) -> Result<(T, ChipSignature)> {
    let mut payload = decode_list(buf)?;
    let tx = decode_fields(&mut payload)?;
    let signature = decode_signature(&mut payload)?;
    ensure_consumed(payload)?;
    Ok((tx, signature))
}

fn ensure_consumed(buf: &[u8]) -> Result<()> {
    if buf.is_empty() {
        Ok(())
    } else {
        Err(Error::Serialization(format!(
            "{} unexpected trailing bytes",
            buf.len()
        )))
    }
}
