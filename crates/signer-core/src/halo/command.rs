//! Chip commands and their responses.
//!
//! [`Command`] is the closed set of requests the chip understands. Each one
//! becomes a JSON record with a `name` field and camelCase arguments:
//!
//! | Command            | Record                                                   |
//! |--------------------|----------------------------------------------------------|
//! | `sign`             | `{name, keyNo, password?, message+format \| digest \| typedData}` |
//! | `get_key_info`     | `{name, keyNo}`                                          |
//! | `get_data_struct`  | `{name, spec: "type:index,..."}`                         |
//! | `gen_key`          | `{name, keyNo, entropy}`                                 |
//! | `gen_key_confirm`  | `{name, keyNo, publicKey}`                               |
//! | `gen_key_finalize` | `{name, keyNo, password?}`                               |
//!
//! Each command has a matching response struct. Responses are deserialized
//! once, in [`parse_response`], and any shape mismatch becomes a protocol
//! error naming the command.

use core::fmt;
use std::collections::BTreeMap;

use alloy_primitives::{B256, Bytes};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::data_struct::DataStructKey;
use super::slot::Slot;
use crate::eip712::TypeField;
use crate::error::{Error, Result};
use crate::signature::ChipSignature;

/// A slot password.
///
/// The `Debug` output never contains the password itself.
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    /// Wraps a password.
    #[must_use]
    pub fn new(password: impl Into<String>) -> Self {
        Self(password.into())
    }

    /// Returns the password as sent to the chip.
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(***)")
    }
}

impl From<String> for Password {
    fn from(password: String) -> Self {
        Self(password)
    }
}

/// Optional flags carried on every `sign` command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignOptions {
    /// Uncompressed public key the slot is expected to hold, as hex.
    ///
    /// The chip refuses to sign if the slot holds a different key.
    pub public_key_hex: Option<String>,

    /// Use the chip's legacy sign command encoding.
    pub legacy_sign_command: bool,
}

/// How the chip should interpret a message to sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageFormat {
    /// UTF-8 text.
    Text,
    /// Hex-encoded bytes, without `0x`.
    Hex,
}

impl MessageFormat {
    /// Returns the format as the chip spells it.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Hex => "hex",
        }
    }
}

/// Typed data in the chip's representation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TypedDataPayload {
    /// The EIP-712 domain object.
    pub domain: Value,

    /// Type definitions, never including `EIP712Domain`.
    pub types: BTreeMap<String, Vec<TypeField>>,

    /// The value to sign.
    pub value: Value,
}

/// What a `sign` command asks the chip to sign.
#[derive(Debug, Clone, PartialEq)]
pub enum SignPayload {
    /// A message the chip hashes with the EIP-191 prefix.
    Message {
        /// The message, as text or as hex without `0x`.
        message: String,
        /// How to interpret `message`.
        format: MessageFormat,
    },

    /// A precomputed 32-byte digest.
    Digest(B256),

    /// EIP-712 typed data the chip hashes itself.
    TypedData(TypedDataPayload),
}

/// Arguments of a `sign` command.
#[derive(Debug, Clone, PartialEq)]
pub struct SignRequest {
    /// The slot holding the signing key.
    pub slot: Slot,

    /// The slot password, if it has one.
    pub password: Option<Password>,

    /// Optional command flags.
    pub options: SignOptions,

    /// What to sign.
    pub payload: SignPayload,
}

/// A command the chip understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Signs a message, digest or typed data with a slot key.
    Sign(SignRequest),

    /// Reads a slot's key state, public key and attestation.
    GetKeyInfo {
        /// The slot to read.
        slot: Slot,
    },

    /// Reads a batch of structured data objects.
    GetDataStruct {
        /// The objects to read, in request order.
        keys: Vec<DataStructKey>,
    },

    /// Starts generating a key in a slot.
    GenKey {
        /// The slot to generate the key in.
        slot: Slot,
        /// Host-supplied entropy mixed into the key.
        entropy: B256,
    },

    /// Confirms the candidate public key the chip proposed.
    GenKeyConfirm {
        /// The slot being generated.
        slot: Slot,
        /// The candidate public key, as returned by `gen_key`.
        public_key: String,
    },

    /// Finalizes key generation, optionally protecting the slot with a password.
    GenKeyFinalize {
        /// The slot being generated.
        slot: Slot,
        /// The password to protect the slot with.
        password: Option<Password>,
    },
}

impl Command {
    /// Returns the command name as the chip knows it.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Sign(_) => "sign",
            Self::GetKeyInfo { .. } => "get_key_info",
            Self::GetDataStruct { .. } => "get_data_struct",
            Self::GenKey { .. } => "gen_key",
            Self::GenKeyConfirm { .. } => "gen_key_confirm",
            Self::GenKeyFinalize { .. } => "gen_key_finalize",
        }
    }

    /// Returns the slot the command addresses, if any.
    #[must_use]
    pub const fn slot(&self) -> Option<Slot> {
        match self {
            Self::Sign(request) => Some(request.slot),
            Self::GetKeyInfo { slot }
            | Self::GenKey { slot, .. }
            | Self::GenKeyConfirm { slot, .. }
            | Self::GenKeyFinalize { slot, .. } => Some(*slot),
            Self::GetDataStruct { .. } => None,
        }
    }

    /// Builds the JSON record sent to the chip.
    ///
    /// # Example
    ///
    /// ```
    /// use halo_evm_signer_core::halo::{Command, Slot};
    /// use serde_json::json;
    ///
    /// let command = Command::GetKeyInfo { slot: Slot::new(3).unwrap() };
    /// assert_eq!(command.to_json(), json!({"name": "get_key_info", "keyNo": 3}));
    /// ```
    #[must_use]
    pub fn to_json(&self) -> Value {
        let mut record = Map::new();
        record.insert("name".into(), self.name().into());

        if let Some(slot) = self.slot() {
            record.insert("keyNo".into(), slot.key_no().into());
        }

        match self {
            Self::Sign(request) => request.write_fields(&mut record),
            Self::GetKeyInfo { .. } => {}
            Self::GetDataStruct { keys } => {
                let spec: Vec<String> = keys.iter().map(ToString::to_string).collect();
                record.insert("spec".into(), spec.join(",").into());
            }
            Self::GenKey { entropy, .. } => {
                record.insert("entropy".into(), hex::encode(entropy).into());
            }
            Self::GenKeyConfirm { public_key, .. } => {
                record.insert("publicKey".into(), public_key.as_str().into());
            }
            Self::GenKeyFinalize { password, .. } => {
                if let Some(password) = password {
                    record.insert("password".into(), password.expose().into());
                }
            }
        }

        Value::Object(record)
    }
}

impl SignRequest {
    fn write_fields(&self, record: &mut Map<String, Value>) {
        if let Some(ref password) = self.password {
            record.insert("password".into(), password.expose().into());
        }
        if let Some(ref public_key_hex) = self.options.public_key_hex {
            record.insert("publicKeyHex".into(), public_key_hex.as_str().into());
        }
        if self.options.legacy_sign_command {
            record.insert("legacySignCommand".into(), true.into());
        }

        match self.payload {
            SignPayload::Message {
                ref message,
                format,
            } => {
                record.insert("message".into(), message.as_str().into());
                record.insert("format".into(), format.as_str().into());
            }
            SignPayload::Digest(digest) => {
                record.insert("digest".into(), hex::encode(digest).into());
            }
            SignPayload::TypedData(ref typed_data) => {
                let fields = [
                    ("domain".to_string(), typed_data.domain.clone()),
                    ("types".to_string(), types_to_json(&typed_data.types)),
                    ("value".to_string(), typed_data.value.clone()),
                ];
                record.insert("typedData".into(), Value::Object(fields.into_iter().collect()));
            }
        }
    }
}

fn types_to_json(types: &BTreeMap<String, Vec<TypeField>>) -> Value {
    types
        .iter()
        .map(|(name, fields)| {
            let fields = fields
                .iter()
                .map(|f| {
                    let mut field = Map::new();
                    field.insert("name".into(), f.name.as_str().into());
                    field.insert("type".into(), f.field_type.as_str().into());
                    Value::Object(field)
                })
                .collect();
            (name.clone(), Value::Array(fields))
        })
        .collect::<Map<_, _>>()
        .into()
}

/// Deserializes a chip response for the named command.
///
/// # Errors
///
/// Returns [`Error::Protocol`] if the response does not have the expected shape.
pub fn parse_response<T: DeserializeOwned>(command: &'static str, response: Value) -> Result<T> {
    serde_json::from_value(response).map_err(|e| Error::malformed(command, e))
}

/// Decodes a hex field of a chip response.
fn decode_hex_field(command: &'static str, field: &str, value: &str) -> Result<Bytes> {
    let value = value.strip_prefix("0x").unwrap_or(value);
    hex::decode(value)
        .map(Bytes::from)
        .map_err(|e| Error::malformed(command, format!("{field} is not hex: {e}")))
}

// =============================================================================
// sign
// =============================================================================

/// The inputs the chip echoes back in a `sign` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignInput {
    /// The slot that signed.
    #[serde(default)]
    pub key_no: Option<u32>,

    /// The digest the chip actually signed, as hex.
    #[serde(default)]
    pub digest: Option<String>,
}

/// Signature components as hex, with the recovery byte in the 27/28 convention.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawSignature {
    /// The R component.
    pub r: String,
    /// The S component.
    pub s: String,
    /// The recovery byte.
    pub v: u8,
}

/// The `signature` object of a `sign` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignatureRecord {
    /// The raw components.
    #[serde(default)]
    pub raw: Option<RawSignature>,

    /// The DER encoding, as hex.
    #[serde(default)]
    pub der: Option<String>,

    /// The 65-byte compact form, as `0x`-prefixed hex.
    #[serde(default)]
    pub ether: Option<String>,
}

/// Response to a `sign` command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignResponse {
    /// The inputs the chip echoed.
    #[serde(default)]
    pub input: SignInput,

    /// The signature, absent if the chip did not sign.
    #[serde(default)]
    pub signature: Option<SignatureRecord>,

    /// The slot's public key, as hex.
    #[serde(default)]
    pub public_key: Option<String>,

    /// The slot's address.
    #[serde(default)]
    pub ether_address: Option<String>,
}

impl SignResponse {
    /// Decodes the chip's raw signature.
    ///
    /// # Errors
    ///
    /// - [`Error::Signing`] if the response carries no signature, or its `r`/`s`
    ///   are not 32-byte hex scalars
    /// - [`Error::Protocol`] if `v` is not `27` or `28`
    pub fn chip_signature(&self) -> Result<ChipSignature> {
        let raw = self
            .signature
            .as_ref()
            .and_then(|signature| signature.raw.as_ref())
            .ok_or_else(|| Error::Signing("chip response carries no signature".to_string()))?;

        ChipSignature::from_hex_parts(&raw.r, &raw.s, raw.v)
    }
}

// =============================================================================
// get_key_info
// =============================================================================

/// The `keyState` object of a `get_key_info` response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyState {
    #[serde(default)]
    is_password_protected: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeyInfoResponse {
    #[serde(default)]
    key_state: KeyState,
    #[serde(default)]
    public_key: Option<String>,
    #[serde(default)]
    attest_sig: Option<String>,
}

/// A slot's self-reported state.
///
/// This is a snapshot: nothing signals when the chip state changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyInfo {
    /// Whether signing with the slot needs a password.
    pub is_password_protected: bool,

    /// The slot's public key, if it holds one.
    pub public_key: Option<Bytes>,

    /// The chip's attestation over the public key.
    pub attest_sig: Option<Bytes>,
}

impl KeyInfo {
    pub(crate) fn parse(response: Value) -> Result<Self> {
        const COMMAND: &str = "get_key_info";

        let response: KeyInfoResponse = parse_response(COMMAND, response)?;
        let decode = |field: &str, value: Option<String>| {
            value
                .filter(|v| !v.is_empty())
                .map(|v| decode_hex_field(COMMAND, field, &v))
                .transpose()
        };

        Ok(Self {
            is_password_protected: response.key_state.is_password_protected,
            public_key: decode("publicKey", response.public_key)?,
            attest_sig: decode("attestSig", response.attest_sig)?,
        })
    }

    /// Returns the public key as hex without `0x`, as the chip reports it.
    #[must_use]
    pub fn public_key_hex(&self) -> Option<String> {
        self.public_key.as_ref().map(hex::encode)
    }
}

// =============================================================================
// get_data_struct
// =============================================================================

/// Response to one `get_data_struct` command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataStructResponse {
    /// Whether the chip left some requested objects out.
    #[serde(default)]
    pub is_partial: bool,

    /// Objects keyed by `"type:index"`; `None` means the chip has no such object.
    #[serde(default)]
    pub data: BTreeMap<String, Option<Value>>,
}

// =============================================================================
// gen_key, gen_key_confirm, gen_key_finalize
// =============================================================================

/// Response to `gen_key`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenKeyResponse {
    /// Whether the candidate public key must be confirmed.
    #[serde(default, rename = "needsConfirmPK")]
    pub needs_confirm_pk: bool,

    /// The candidate public key, when confirmation is needed.
    #[serde(default)]
    pub public_key: Option<String>,

    /// The chip's root public key, when no confirmation is needed.
    #[serde(default)]
    pub root_public_key: Option<String>,

    /// The root key's attestation, when no confirmation is needed.
    #[serde(default)]
    pub root_attest_sig: Option<String>,
}

/// Response to `gen_key_confirm`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenKeyConfirmResponse {
    /// The chip's root public key.
    #[serde(default)]
    pub root_public_key: Option<String>,

    /// The root key's attestation.
    #[serde(default)]
    pub root_attest_sig: Option<String>,
}

/// Response to `gen_key_finalize`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenKeyFinalizeResponse {
    /// The generated public key.
    #[serde(default)]
    pub public_key: Option<String>,

    /// The chip's attestation over the generated key.
    #[serde(default)]
    pub attest_sig: Option<String>,
}
