//! EIP-712 typed structured data.
//!
//! The chip hashes typed data itself, so the main job of this module is to
//! turn a [`TypedData`] into the payload the chip's `sign` command expects:
//!
//! - every type as a flat list of `{name, type}` fields
//! - the `EIP712Domain` pseudo-type removed (the chip derives it from `domain`)
//! - a `value` object: the message, or the domain itself when the primary
//!   type *is* `EIP712Domain`
//!
//! The EIP-712 digest is also computed locally by [`TypedData::signing_hash`]
//! so a chip signature can be checked by recovering its signer:
//!
//! ```text
//! keccak256("\x19\x01" || domainSeparator || hashStruct(message))
//! ```
//!
//! # Example
//!
//! ```
//! use halo_evm_signer_core::{Eip712Domain, TypedData};
//! use serde_json::json;
//!
//! let domain = Eip712Domain {
//!     name: Some("My DApp".to_string()),
//!     version: Some("1".to_string()),
//!     chain_id: Some(1),
//!     verifying_contract: None,
//!     salt: None,
//! };
//!
//! let types = json!({
//!     "EIP712Domain": [
//!         {"name": "name", "type": "string"},
//!         {"name": "version", "type": "string"},
//!         {"name": "chainId", "type": "uint256"}
//!     ],
//!     "Person": [
//!         {"name": "name", "type": "string"},
//!         {"name": "wallet", "type": "address"}
//!     ]
//! });
//!
//! let message = json!({
//!     "name": "Alice",
//!     "wallet": "0x0000000000000000000000000000000000000001"
//! });
//!
//! let typed_data = TypedData::new(domain, types, "Person".to_string(), message);
//! let payload = typed_data.to_chip_payload().unwrap();
//! assert!(!payload.types.contains_key("EIP712Domain"));
//! ```

use std::collections::BTreeMap;

use alloy_primitives::{Address, B256, U256, keccak256};
use serde::{Deserialize, Deserializer, Serialize, de};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::halo::TypedDataPayload;

/// Name of the domain separator pseudo-type.
pub const DOMAIN_TYPE: &str = "EIP712Domain";

/// The EIP-712 domain separator parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Eip712Domain {
    /// The human-readable name of the signing domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// The version of the signing domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// The chain ID where signatures are valid.
    ///
    /// Read from a number or a decimal or `0x` hex string.
    #[serde(
        default,
        deserialize_with = "deserialize_chain_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub chain_id: Option<u64>,

    /// The address of the contract verifying the signature.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verifying_contract: Option<String>,

    /// A disambiguating salt for the protocol.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,
}

impl Eip712Domain {
    /// Computes the domain separator hash.
    ///
    /// The `EIP712Domain` type is built from the fields that are present, in
    /// the canonical order `name, version, chainId, verifyingContract, salt`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTypedData`] if `verifying_contract` is not an
    /// address or `salt` is not 32 bytes.
    pub fn separator_hash(&self) -> Result<B256> {
        let mut fields = Vec::new();
        let mut encoded = Vec::new();

        if let Some(ref name) = self.name {
            fields.push("string name");
            encoded.extend_from_slice(keccak256(name.as_bytes()).as_slice());
        }
        if let Some(ref version) = self.version {
            fields.push("string version");
            encoded.extend_from_slice(keccak256(version.as_bytes()).as_slice());
        }
        if let Some(chain_id) = self.chain_id {
            fields.push("uint256 chainId");
            encoded.extend_from_slice(&U256::from(chain_id).to_be_bytes::<32>());
        }
        if let Some(ref contract) = self.verifying_contract {
            fields.push("address verifyingContract");
            let mut buf = [0u8; 32];
            buf[12..].copy_from_slice(parse_address(contract)?.as_slice());
            encoded.extend_from_slice(&buf);
        }
        if let Some(ref salt) = self.salt {
            fields.push("bytes32 salt");
            encoded.extend_from_slice(&parse_bytes32(salt)?);
        }

        let type_string = format!("{DOMAIN_TYPE}({})", fields.join(","));

        let mut buf = Vec::with_capacity(32 + encoded.len());
        buf.extend_from_slice(keccak256(type_string.as_bytes()).as_slice());
        buf.extend_from_slice(&encoded);

        Ok(keccak256(&buf))
    }
}

/// A type field definition for EIP-712.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeField {
    /// The name of the field.
    pub name: String,

    /// The type of the field (e.g., "string", "uint256", "address").
    #[serde(rename = "type")]
    pub field_type: String,
}

/// Typed structured data for EIP-712 signing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypedData {
    /// The EIP-712 domain.
    #[serde(default)]
    pub domain: Eip712Domain,

    /// The type definitions, possibly including `EIP712Domain`.
    pub types: BTreeMap<String, Vec<TypeField>>,

    /// The primary type being signed.
    pub primary_type: String,

    /// The message data.
    ///
    /// Unused, and may be left out, when the primary type is `EIP712Domain`.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub message: Value,
}

impl TypedData {
    /// Creates a new typed data instance.
    ///
    /// `types` is a JSON object mapping type names to arrays of
    /// `{name, type}` objects; malformed entries are skipped.
    #[must_use]
    pub fn new(domain: Eip712Domain, types: Value, primary_type: String, message: Value) -> Self {
        Self {
            domain,
            types: parse_types(&types),
            primary_type,
            message,
        }
    }

    /// Builds the payload the chip's `sign` command expects.
    ///
    /// The `EIP712Domain` entry is never part of the payload. When the primary
    /// type is `EIP712Domain`, the domain object itself is sent as the value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JsonError`] if the domain cannot be serialized.
    pub fn to_chip_payload(&self) -> Result<TypedDataPayload> {
        let mut types = self.types.clone();
        types.remove(DOMAIN_TYPE);

        let domain = serde_json::to_value(&self.domain)?;
        let value = if self.primary_type == DOMAIN_TYPE {
            domain.clone()
        } else {
            self.message.clone()
        };

        Ok(TypedDataPayload {
            domain,
            types,
            value,
        })
    }

    /// Computes the EIP-712 digest for this typed data.
    ///
    /// When the primary type is `EIP712Domain` the digest is the bare
    /// `keccak256("\x19\x01" || domainSeparator)`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTypedData`] or [`Error::UndefinedType`] if the type
    /// definitions or message are malformed.
    pub fn signing_hash(&self) -> Result<B256> {
        let domain_separator = self.domain.separator_hash()?;

        let mut data = Vec::with_capacity(2 + 32 + 32);
        data.extend_from_slice(&[0x19, 0x01]);
        data.extend_from_slice(domain_separator.as_slice());

        if self.primary_type != DOMAIN_TYPE {
            let struct_hash = self.hash_struct(&self.primary_type, &self.message)?;
            data.extend_from_slice(struct_hash.as_slice());
        }

        Ok(keccak256(&data))
    }

    /// `hashStruct(s) = keccak256(typeHash || encodeData(s))`
    fn hash_struct(&self, type_name: &str, data: &Value) -> Result<B256> {
        let type_hash = keccak256(self.encode_type(type_name)?.as_bytes());
        let encoded_data = self.encode_data(type_name, data)?;

        let mut buf = Vec::with_capacity(32 + encoded_data.len());
        buf.extend_from_slice(type_hash.as_slice());
        buf.extend_from_slice(&encoded_data);

        Ok(keccak256(&buf))
    }

    /// Encodes the type and every struct type it references, transitively.
    fn encode_type(&self, type_name: &str) -> Result<String> {
        let mut referenced = Vec::new();
        self.collect_references(type_name, &mut referenced)?;
        referenced.retain(|name| name != type_name);
        referenced.sort();

        let mut result = self.encode_single_type(type_name)?;
        for name in &referenced {
            result.push_str(&self.encode_single_type(name)?);
        }

        Ok(result)
    }

    fn encode_single_type(&self, type_name: &str) -> Result<String> {
        let fields = self.fields(type_name)?;
        let field_strings: Vec<String> = fields
            .iter()
            .map(|f| format!("{} {}", f.field_type, f.name))
            .collect();

        Ok(format!("{type_name}({})", field_strings.join(",")))
    }

    fn collect_references(&self, type_name: &str, found: &mut Vec<String>) -> Result<()> {
        if found.iter().any(|name| name == type_name) {
            return Ok(());
        }
        found.push(type_name.to_string());

        for field in self.fields(type_name)? {
            if let Some(ref_type) = self.referenced_type(&field.field_type) {
                self.collect_references(ref_type, found)?;
            }
        }

        Ok(())
    }

    /// Gets the struct type a field refers to, stripping any array suffixes.
    fn referenced_type<'a>(&self, field_type: &'a str) -> Option<&'a str> {
        let base_type = field_type.split('[').next().unwrap_or(field_type);
        self.types.contains_key(base_type).then_some(base_type)
    }

    fn fields(&self, type_name: &str) -> Result<&[TypeField]> {
        self.types
            .get(type_name)
            .map(Vec::as_slice)
            .ok_or_else(|| Error::UndefinedType(type_name.to_string()))
    }

    fn encode_data(&self, type_name: &str, data: &Value) -> Result<Vec<u8>> {
        let obj = data
            .as_object()
            .ok_or_else(|| Error::InvalidTypedData(format!("expected object for {type_name}")))?;

        let mut encoded = Vec::new();
        for field in self.fields(type_name)? {
            let value = obj
                .get(&field.name)
                .ok_or_else(|| Error::InvalidTypedData(format!("missing field: {}", field.name)))?;

            encoded.extend_from_slice(&self.encode_field(&field.field_type, value)?);
        }

        Ok(encoded)
    }

    fn encode_field(&self, field_type: &str, value: &Value) -> Result<Vec<u8>> {
        if let Some(base_type) = array_element_type(field_type) {
            let items = value
                .as_array()
                .ok_or_else(|| Error::InvalidTypedData("expected array".to_string()))?;

            let mut items_encoded = Vec::with_capacity(items.len() * 32);
            for item in items {
                items_encoded.extend_from_slice(&self.encode_field(base_type, item)?);
            }
            return Ok(keccak256(&items_encoded).to_vec());
        }

        if self.types.contains_key(field_type) {
            return Ok(self.hash_struct(field_type, value)?.to_vec());
        }

        encode_primitive(field_type, value)
    }

    /// Parses typed data from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JsonError`] if parsing fails.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Strips one trailing array dimension (`T[]` or `T[n]`).
fn array_element_type(field_type: &str) -> Option<&str> {
    let open = field_type.rfind('[')?;
    field_type.ends_with(']').then(|| &field_type[..open])
}

/// Parses type definitions from JSON.
fn parse_types(types: &Value) -> BTreeMap<String, Vec<TypeField>> {
    let mut result = BTreeMap::new();

    if let Some(obj) = types.as_object() {
        for (type_name, fields) in obj {
            if let Some(arr) = fields.as_array() {
                let type_fields: Vec<TypeField> = arr
                    .iter()
                    .filter_map(|f| serde_json::from_value(f.clone()).ok())
                    .collect();
                result.insert(type_name.clone(), type_fields);
            }
        }
    }

    result
}

/// Encodes a primitive type value into its 32-byte word.
fn encode_primitive(field_type: &str, value: &Value) -> Result<Vec<u8>> {
    let mut buf = [0u8; 32];

    match field_type {
        "string" => {
            let s = value
                .as_str()
                .ok_or_else(|| Error::InvalidTypedData("expected string".to_string()))?;
            Ok(keccak256(s.as_bytes()).to_vec())
        }
        "bytes" => {
            let bytes = parse_hex_bytes(value)?;
            Ok(keccak256(&bytes).to_vec())
        }
        "bool" => {
            let b = value
                .as_bool()
                .ok_or_else(|| Error::InvalidTypedData("expected bool".to_string()))?;
            buf[31] = u8::from(b);
            Ok(buf.to_vec())
        }
        "address" => {
            let addr_str = value
                .as_str()
                .ok_or_else(|| Error::InvalidTypedData("expected address string".to_string()))?;
            buf[12..].copy_from_slice(parse_address(addr_str)?.as_slice());
            Ok(buf.to_vec())
        }
        t if t.starts_with("bytes") => {
            let size: usize = t[5..]
                .parse()
                .map_err(|_| Error::InvalidTypedData(format!("invalid bytes type: {t}")))?;
            let bytes = parse_hex_bytes(value)?;

            if bytes.len() > size || size > 32 {
                return Err(Error::InvalidTypedData(format!(
                    "bytes too long for {t}: {}",
                    bytes.len()
                )));
            }

            buf[..bytes.len()].copy_from_slice(&bytes);
            Ok(buf.to_vec())
        }
        t if t.starts_with("uint") => Ok(parse_uint(value)?.to_be_bytes::<32>().to_vec()),
        t if t.starts_with("int") => Ok(parse_int(value)?.to_be_bytes::<32>().to_vec()),
        _ => Err(Error::InvalidTypedData(format!(
            "unsupported type: {field_type}"
        ))),
    }
}

fn deserialize_chain_id<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ChainId {
        Number(u64),
        Text(String),
    }

    match Option::<ChainId>::deserialize(deserializer)? {
        None => Ok(None),
        Some(ChainId::Number(n)) => Ok(Some(n)),
        Some(ChainId::Text(s)) => {
            let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                Some(hex_str) => u64::from_str_radix(hex_str, 16),
                None => s.parse(),
            };
            parsed
                .map(Some)
                .map_err(|_| de::Error::custom(format!("invalid chainId: {s}")))
        }
    }
}

fn parse_address(s: &str) -> Result<Address> {
    s.parse::<Address>()
        .map_err(|e| Error::InvalidTypedData(format!("invalid address {s}: {e}")))
}

fn parse_bytes32(s: &str) -> Result<[u8; 32]> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(s)?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        Error::InvalidTypedData(format!("invalid bytes32 length: {}", bytes.len()))
    })
}

fn parse_hex_bytes(value: &Value) -> Result<Vec<u8>> {
    let s = value
        .as_str()
        .ok_or_else(|| Error::InvalidTypedData("expected hex string".to_string()))?;
    Ok(hex::decode(s.strip_prefix("0x").unwrap_or(s))?)
}

fn parse_uint(value: &Value) -> Result<U256> {
    if let Some(n) = value.as_u64() {
        return Ok(U256::from(n));
    }
    if let Some(s) = value.as_str() {
        if let Some(hex_str) = s.strip_prefix("0x") {
            return U256::from_str_radix(hex_str, 16)
                .map_err(|_| Error::InvalidTypedData(format!("invalid hex uint: {s}")));
        }
        return U256::from_str_radix(s, 10)
            .map_err(|_| Error::InvalidTypedData(format!("invalid uint: {s}")));
    }
    Err(Error::InvalidTypedData("expected uint".to_string()))
}

/// Parses a signed integer into its two's complement word.
fn parse_int(value: &Value) -> Result<U256> {
    let (negative, magnitude) = match (value.as_i64(), value.as_str()) {
        (Some(n), _) => (n < 0, U256::from(n.unsigned_abs())),
        (None, Some(s)) => match s.strip_prefix('-') {
            Some(rest) => (true, parse_uint(&Value::String(rest.to_string()))?),
            None => (false, parse_uint(value)?),
        },
        _ => return Err(Error::InvalidTypedData("expected int".to_string())),
    };

    Ok(if negative {
        magnitude.wrapping_neg()
    } else {
        magnitude
    })
}
