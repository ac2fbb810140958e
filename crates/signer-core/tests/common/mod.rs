//! A software chip for integration tests.
//!
//! [`SoftChip`] holds real secp256k1 keys per slot and answers the same JSON
//! records a HaLo chip would, so signatures produced through it can be
//! recovered and checked end to end.

#![allow(dead_code, unreachable_pub)]

use std::cell::RefCell;
use std::collections::BTreeMap;

use alloy_primitives::{Address, B256, eip191_hash_message, keccak256};
use async_trait::async_trait;
use halo_evm_signer_core::address::address_from_verifying_key;
use halo_evm_signer_core::eip712::{DOMAIN_TYPE, Eip712Domain, TypeField, TypedData};
use halo_evm_signer_core::error::{ChipError, ChipErrorCode};
use halo_evm_signer_core::halo::{
    Chip, Command, DataStructKey, MessageFormat, ObjectType, SignPayload, SignRequest,
};
use k256::ecdsa::SigningKey;
use serde_json::{Value, json};

/// Firmware version reported through `get_data_struct`.
pub const FIRMWARE_VERSION: &str = "01.C8.0041";

/// Installs the test logger once per binary.
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Builds a signing key from a small scalar.
pub fn key(scalar: u8) -> SigningKey {
    let mut bytes = [0u8; 32];
    bytes[31] = scalar;
    SigningKey::from_slice(&bytes).expect("non-zero scalar is a valid key")
}

struct SlotKey {
    key: SigningKey,
    password: Option<String>,
}

/// An in-memory chip backed by real keys.
pub struct SoftChip {
    slots: RefCell<BTreeMap<u32, SlotKey>>,
    pending: RefCell<Option<(u32, SigningKey)>>,
    root: SigningKey,
    confirm_public_key: bool,
    objects_per_round: usize,
    sent: RefCell<Vec<Value>>,
}

impl SoftChip {
    pub fn new() -> Self {
        Self {
            slots: RefCell::new(BTreeMap::new()),
            pending: RefCell::new(None),
            root: key(0x77),
            confirm_public_key: false,
            objects_per_round: usize::MAX,
            sent: RefCell::new(Vec::new()),
        }
    }

    /// Installs `key` in `slot`, optionally protected by `password`.
    pub fn with_key(self, slot: u32, key: SigningKey, password: Option<&str>) -> Self {
        self.slots.borrow_mut().insert(
            slot,
            SlotKey {
                key,
                password: password.map(str::to_string),
            },
        );
        self
    }

    /// Makes `gen_key` ask for the candidate public key to be confirmed.
    pub fn confirming_public_key(mut self) -> Self {
        self.confirm_public_key = true;
        self
    }

    /// Caps the number of objects answered per `get_data_struct` round.
    pub fn objects_per_round(mut self, count: usize) -> Self {
        self.objects_per_round = count;
        self
    }

    /// Returns the address of the key in `slot`.
    pub fn address(&self, slot: u32) -> Address {
        let slots = self.slots.borrow();
        address_from_verifying_key(slots[&slot].key.verifying_key())
    }

    /// Returns the records sent so far.
    pub fn sent(&self) -> Vec<Value> {
        self.sent.borrow().clone()
    }

    /// Returns the names of the commands sent so far.
    pub fn sent_names(&self) -> Vec<String> {
        self.sent
            .borrow()
            .iter()
            .map(|record| record["name"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    fn sign(&self, request: &SignRequest) -> Result<Value, ChipError> {
        let key_no = request.slot.key_no();
        let slots = self.slots.borrow();
        let slot = slots.get(&key_no).ok_or_else(|| not_initialized(key_no))?;

        if let Some(ref expected) = slot.password {
            let given = request.password.as_ref().map(|p| p.expose());
            if given != Some(expected.as_str()) {
                return Err(ChipError::new(
                    Some(ChipErrorCode::WrongPwd),
                    "wrong password",
                ));
            }
        }

        let public_key = uncompressed_hex(&slot.key);
        if let Some(ref pinned) = request.options.public_key_hex {
            if *pinned != public_key {
                return Err(ChipError::new(
                    Some(ChipErrorCode::InvalidData),
                    "public key does not match slot",
                ));
            }
        }

        let digest = digest_of(&request.payload)?;
        let (signature, recovery_id) = slot
            .key
            .sign_prehash_recoverable(digest.as_slice())
            .map_err(|e| ChipError::new(Some(ChipErrorCode::InvalidData), e.to_string()))?;
        let bytes = signature.to_bytes();
        let v = 27 + recovery_id.to_byte();

        Ok(json!({
            "input": {"keyNo": key_no, "digest": hex::encode(digest)},
            "signature": {
                "raw": {
                    "r": hex::encode(&bytes[..32]),
                    "s": hex::encode(&bytes[32..]),
                    "v": v,
                },
                "der": hex::encode(signature.to_der().as_bytes()),
                "ether": format!("0x{}{v:02x}", hex::encode(bytes)),
            },
            "publicKey": public_key,
            "etherAddress": address_from_verifying_key(slot.key.verifying_key()).to_checksum(None),
        }))
    }

    fn key_info(&self, key_no: u32) -> Result<Value, ChipError> {
        let slots = self.slots.borrow();
        let slot = slots.get(&key_no).ok_or_else(|| not_initialized(key_no))?;
        let public_key = uncompressed_hex(&slot.key);

        Ok(json!({
            "keyState": {"isPasswordProtected": slot.password.is_some()},
            "publicKey": public_key,
            "attestSig": self.attest(&public_key),
        }))
    }

    fn data_struct(&self, keys: &[DataStructKey]) -> Value {
        let slots = self.slots.borrow();
        let answered = keys.len().min(self.objects_per_round);

        let data: serde_json::Map<String, Value> = keys[..answered]
            .iter()
            .map(|k| {
                let value = match k.object_type {
                    ObjectType::PublicKey => slots
                        .get(&k.index)
                        .map_or(Value::Null, |s| uncompressed_hex(&s.key).into()),
                    ObjectType::CompressedPublicKey => {
                        slots.get(&k.index).map_or(Value::Null, |s| {
                            hex::encode(s.key.verifying_key().to_encoded_point(true)).into()
                        })
                    }
                    ObjectType::FirmwareVersion => FIRMWARE_VERSION.into(),
                    _ => Value::Null,
                };
                (k.to_string(), value)
            })
            .collect();

        json!({"isPartial": answered < keys.len(), "data": data})
    }

    fn gen_key(&self, key_no: u32, entropy: B256) -> Result<Value, ChipError> {
        let mut seed = entropy.to_vec();
        seed.extend_from_slice(&key_no.to_be_bytes());
        let key = SigningKey::from_slice(keccak256(&seed).as_slice())
            .map_err(|e| ChipError::new(Some(ChipErrorCode::InvalidData), e.to_string()))?;
        let public_key = uncompressed_hex(&key);
        *self.pending.borrow_mut() = Some((key_no, key));

        if self.confirm_public_key {
            Ok(json!({"needsConfirmPK": true, "publicKey": public_key}))
        } else {
            Ok(json!({
                "needsConfirmPK": false,
                "rootPublicKey": uncompressed_hex(&self.root),
                "rootAttestSig": self.attest(&public_key),
            }))
        }
    }

    fn gen_key_confirm(&self, key_no: u32, public_key: &str) -> Result<Value, ChipError> {
        let pending = self.pending.borrow();
        match *pending {
            Some((slot, ref key)) if slot == key_no && uncompressed_hex(key) == public_key => {
                Ok(json!({
                    "rootPublicKey": uncompressed_hex(&self.root),
                    "rootAttestSig": self.attest(public_key),
                }))
            }
            _ => Err(ChipError::new(
                Some(ChipErrorCode::InvalidData),
                "no matching key generation in progress",
            )),
        }
    }

    fn gen_key_finalize(&self, key_no: u32, password: Option<&str>) -> Result<Value, ChipError> {
        let (slot, key) = self.pending.borrow_mut().take().ok_or_else(|| {
            ChipError::new(Some(ChipErrorCode::InvalidData), "no key generation in progress")
        })?;
        if slot != key_no {
            return Err(ChipError::new(Some(ChipErrorCode::InvalidKeyNo), "slot mismatch"));
        }

        let public_key = uncompressed_hex(&key);
        let attest_sig = self.attest(&public_key);
        self.slots.borrow_mut().insert(
            key_no,
            SlotKey {
                key,
                password: password.map(str::to_string),
            },
        );

        Ok(json!({"publicKey": public_key, "attestSig": attest_sig}))
    }

    /// Signs a public key with the root key, DER encoded.
    fn attest(&self, public_key: &str) -> String {
        let digest = keccak256(public_key.as_bytes());
        let (signature, _) = self
            .root
            .sign_prehash_recoverable(digest.as_slice())
            .expect("prehash is 32 bytes");
        hex::encode(signature.to_der().as_bytes())
    }
}

#[async_trait(?Send)]
impl Chip for SoftChip {
    async fn execute(&self, command: &Command) -> Result<Value, ChipError> {
        self.sent.borrow_mut().push(command.to_json());

        match command {
            Command::Sign(request) => self.sign(request),
            Command::GetKeyInfo { slot } => self.key_info(slot.key_no()),
            Command::GetDataStruct { keys } => Ok(self.data_struct(keys)),
            Command::GenKey { slot, entropy } => self.gen_key(slot.key_no(), *entropy),
            Command::GenKeyConfirm { slot, public_key } => {
                self.gen_key_confirm(slot.key_no(), public_key)
            }
            Command::GenKeyFinalize { slot, password } => {
                self.gen_key_finalize(slot.key_no(), password.as_ref().map(|p| p.expose()))
            }
        }
    }
}

fn not_initialized(key_no: u32) -> ChipError {
    ChipError::new(
        Some(ChipErrorCode::KeyNotInitialized),
        format!("slot {key_no} holds no key"),
    )
}

fn uncompressed_hex(key: &SigningKey) -> String {
    hex::encode(key.verifying_key().to_encoded_point(false))
}

/// Computes the digest the chip signs for a `sign` payload.
fn digest_of(payload: &SignPayload) -> Result<B256, ChipError> {
    let invalid = |e: String| ChipError::new(Some(ChipErrorCode::InvalidData), e);

    match payload {
        SignPayload::Digest(digest) => Ok(*digest),
        SignPayload::Message { message, format } => match format {
            MessageFormat::Text => Ok(eip191_hash_message(message.as_bytes())),
            MessageFormat::Hex => {
                let bytes = hex::decode(message).map_err(|e| invalid(e.to_string()))?;
                Ok(eip191_hash_message(bytes))
            }
        },
        SignPayload::TypedData(payload) => {
            let domain: Eip712Domain =
                serde_json::from_value(payload.domain.clone()).map_err(|e| invalid(e.to_string()))?;
            let typed_data = TypedData {
                domain,
                types: payload.types.clone(),
                primary_type: primary_type(&payload.types).ok_or_else(|| {
                    invalid("typed data has no unreferenced type".to_string())
                })?,
                message: payload.value.clone(),
            };
            typed_data.signing_hash().map_err(|e| invalid(e.to_string()))
        }
    }
}

/// Picks the one type no other type refers to, or the domain when no
/// other type is left.
fn primary_type(types: &BTreeMap<String, Vec<TypeField>>) -> Option<String> {
    if types.is_empty() {
        return Some(DOMAIN_TYPE.to_string());
    }
    types
        .keys()
        .find(|name| {
            !types.values().flatten().any(|field| {
                field.field_type.trim_end_matches("[]") == name.as_str()
            })
        })
        .cloned()
}
