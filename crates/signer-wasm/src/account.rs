//! Slot accounts and key generation for browser use.
//!
//! # Example
//!
//! ```javascript
//! import { execHaloCmdWeb } from '@arx-research/libhalo/api/web';
//! import { HaloAccount } from 'halo-evm-signer-wasm';
//!
//! const account = await HaloAccount.connect(execHaloCmdWeb, () => prompt("Password"), 1);
//! console.log("address:", account.address);
//!
//! const signature = await account.signMessage("hello");
//! const rawTx = await account.signTransaction(JSON.stringify({
//!     type: "eip1559",
//!     chainId: 1,
//!     nonce: 0,
//!     maxPriorityFeePerGas: "0x3b9aca00",
//!     maxFeePerGas: "0x4a817c800",
//!     gasLimit: 21000,
//!     to: "0x...",
//!     value: "0xde0b6b3a7640000",
//! }));
//! ```

use std::fmt;

use halo_evm_signer_core::halo::{
    DataStructKey, GenerateKeyState, HaloSession, KeyGenerator, KeyInfo, Slot,
};
use halo_evm_signer_core::{
    Address, B256, Bytes, MessagePayload, SlotAccount, Transaction, TypedData,
};
use js_sys::Function;
use serde_json::{Value, json};
use wasm_bindgen::prelude::*;

use crate::chip::{JsChip, JsPasswordPrompt, to_js};
use crate::error::{WasmError, WasmResult};

/// An Ethereum account backed by one chip slot.
///
/// The chip is reached through the `execute` function passed to
/// [`connect`](Self::connect); the password function, when given, is asked
/// once per signature.
#[wasm_bindgen]
pub struct HaloAccount {
    inner: SlotAccount<JsChip, JsPasswordPrompt>,
}

impl fmt::Debug for HaloAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HaloAccount")
            .field("inner", &self.inner)
            .finish()
    }
}

#[wasm_bindgen]
impl HaloAccount {
    /// Binds slot `keyNo` to an account.
    ///
    /// Without `address`, the slot's key info is read and the address derived
    /// from its public key; signatures are then pinned to that key.
    ///
    /// # Errors
    ///
    /// - If `keyNo` is `0` or `address` is not an address
    /// - If the chip call fails or the slot holds no key
    #[wasm_bindgen]
    pub async fn connect(
        execute: Function,
        prompt_password: Option<Function>,
        key_no: u32,
        address: Option<String>,
    ) -> Result<HaloAccount, JsValue> {
        Self::connect_internal(execute, prompt_password, key_no, address)
            .await
            .map_err(JsValue::from)
    }

    async fn connect_internal(
        execute: Function,
        prompt_password: Option<Function>,
        key_no: u32,
        address: Option<String>,
    ) -> WasmResult<HaloAccount> {
        let slot = parse_slot(key_no)?;
        let address = address
            .map(|a| {
                a.parse::<Address>()
                    .map_err(|e| WasmError::InvalidArgument(format!("address: {e}")))
            })
            .transpose()?;

        let inner = SlotAccount::connect(
            JsChip::new(execute),
            JsPasswordPrompt::new(prompt_password),
            slot,
            address,
        )
        .await?;

        Ok(Self { inner })
    }

    /// The checksummed account address.
    #[wasm_bindgen(getter)]
    pub fn address(&self) -> String {
        self.inner.address().to_checksum(None)
    }

    /// The slot backing the account.
    #[wasm_bindgen(getter, js_name = "keyNo")]
    pub fn key_no(&self) -> u32 {
        self.inner.slot().key_no()
    }

    /// Signs a UTF-8 personal message (EIP-191).
    ///
    /// Returns the 65-byte signature as `0x`-prefixed hex.
    #[wasm_bindgen(js_name = "signMessage")]
    pub async fn sign_message(&self, message: String) -> Result<String, JsValue> {
        let signature = self
            .inner
            .sign_message(MessagePayload::Text(message))
            .await
            .map_err(WasmError::from)?;
        Ok(signature.to_hex())
    }

    /// Signs a hex-encoded personal message (EIP-191).
    #[wasm_bindgen(js_name = "signMessageHex")]
    pub async fn sign_message_hex(&self, message: &str) -> Result<String, JsValue> {
        self.sign_message_hex_internal(message)
            .await
            .map_err(JsValue::from)
    }

    async fn sign_message_hex_internal(&self, message: &str) -> WasmResult<String> {
        let bytes: Bytes = message
            .parse()
            .map_err(|e| WasmError::InvalidArgument(format!("message: {e}")))?;
        let signature = self.inner.sign_message(MessagePayload::Hex(bytes)).await?;
        Ok(signature.to_hex())
    }

    /// Signs EIP-712 typed data given as JSON.
    #[wasm_bindgen(js_name = "signTypedData")]
    pub async fn sign_typed_data(&self, typed_data_json: &str) -> Result<String, JsValue> {
        self.sign_typed_data_internal(typed_data_json)
            .await
            .map_err(JsValue::from)
    }

    async fn sign_typed_data_internal(&self, typed_data_json: &str) -> WasmResult<String> {
        let typed_data = TypedData::from_json(typed_data_json)?;
        let signature = self.inner.sign_typed_data(typed_data).await?;
        Ok(signature.to_hex())
    }

    /// Signs a precomputed 32-byte digest given as hex.
    #[wasm_bindgen(js_name = "signDigest")]
    pub async fn sign_digest(&self, digest: &str) -> Result<String, JsValue> {
        self.sign_digest_internal(digest)
            .await
            .map_err(JsValue::from)
    }

    async fn sign_digest_internal(&self, digest: &str) -> WasmResult<String> {
        let digest = parse_b256("digest", digest)?;
        let signature = self.inner.sign_digest(digest).await?;
        Ok(signature.to_hex())
    }

    /// Signs a transaction given as JSON.
    ///
    /// Returns the signed transaction, ready for `eth_sendRawTransaction`, as
    /// `0x`-prefixed hex.
    #[wasm_bindgen(js_name = "signTransaction")]
    pub async fn sign_transaction(&self, tx_json: &str) -> Result<String, JsValue> {
        self.sign_transaction_internal(tx_json)
            .await
            .map_err(JsValue::from)
    }

    async fn sign_transaction_internal(&self, tx_json: &str) -> WasmResult<String> {
        let tx = Transaction::from_json(tx_json)?;
        let raw = self.inner.sign_transaction(&tx).await?;
        Ok(raw.to_string())
    }
}

/// Generates a key in slot `keyNo`.
///
/// `entropy` is 32 bytes of caller randomness as hex, e.g. from
/// `crypto.getRandomValues`. `onState`, when given, is called with every
/// recorded state, including the final error state. The password function is
/// asked once, before the key is finalized.
///
/// Resolves to the completed state object.
#[wasm_bindgen(js_name = "generateKey")]
pub async fn generate_key(
    execute: Function,
    prompt_password: Option<Function>,
    key_no: u32,
    entropy: String,
    on_state: Option<Function>,
) -> Result<JsValue, JsValue> {
    generate_key_internal(execute, prompt_password, key_no, &entropy, on_state)
        .await
        .map_err(JsValue::from)
}

async fn generate_key_internal(
    execute: Function,
    prompt_password: Option<Function>,
    key_no: u32,
    entropy: &str,
    on_state: Option<Function>,
) -> WasmResult<JsValue> {
    let slot = parse_slot(key_no)?;
    let entropy = parse_b256("entropy", entropy)?;

    let mut generator =
        KeyGenerator::new(JsChip::new(execute), JsPasswordPrompt::new(prompt_password));
    if let Some(on_state) = on_state {
        generator = generator.with_observer(move |state| {
            if let Ok(state) = state_to_js(state) {
                // The callback's own failures do not stop key generation.
                let _ = on_state.call1(&JsValue::NULL, &state);
            }
        });
    }

    let state = generator.generate(slot, entropy).await?;
    state_to_js(&state)
}

/// Reads the key state of slot `keyNo`.
///
/// Resolves to `{isPasswordProtected, publicKey, attestSig}`; the keys are hex
/// or `null`.
#[wasm_bindgen(js_name = "getKeyInfo")]
pub async fn get_key_info(execute: Function, key_no: u32) -> Result<JsValue, JsValue> {
    get_key_info_internal(execute, key_no)
        .await
        .map_err(JsValue::from)
}

async fn get_key_info_internal(execute: Function, key_no: u32) -> WasmResult<JsValue> {
    let slot = parse_slot(key_no)?;
    let info = HaloSession::new(JsChip::new(execute))
        .get_key_info(slot)
        .await?;
    to_js(&key_info_json(&info))
}

/// Reads structured data objects, over as many rounds as the chip needs.
///
/// `spec` is a comma-separated list of `type:index` keys, e.g.
/// `"publicKey:1,firmwareVersion:0"`. Resolves to `{isPartial, data}`.
#[wasm_bindgen(js_name = "getDataStruct")]
pub async fn get_data_struct(execute: Function, spec: String) -> Result<JsValue, JsValue> {
    get_data_struct_internal(execute, &spec)
        .await
        .map_err(JsValue::from)
}

async fn get_data_struct_internal(execute: Function, spec: &str) -> WasmResult<JsValue> {
    let keys = spec
        .split(',')
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .map(str::parse::<DataStructKey>)
        .collect::<Result<Vec<_>, _>>()?;

    let response = HaloSession::new(JsChip::new(execute))
        .fetch_data_struct(&keys)
        .await?;

    to_js(&json!({
        "isPartial": response.is_partial,
        "data": response.data,
    }))
}

fn parse_slot(key_no: u32) -> WasmResult<Slot> {
    Slot::new(key_no)
        .map_err(|_| WasmError::InvalidArgument("keyNo must be at least 1".to_string()))
}

fn parse_b256(field: &str, value: &str) -> WasmResult<B256> {
    let bytes = hex::decode(value.strip_prefix("0x").unwrap_or(value))
        .map_err(|e| WasmError::InvalidArgument(format!("{field}: {e}")))?;
    if bytes.len() != 32 {
        return Err(WasmError::InvalidArgument(format!(
            "{field} must be 32 bytes, got {}",
            bytes.len()
        )));
    }
    Ok(B256::from_slice(&bytes))
}

fn state_to_js(state: &GenerateKeyState) -> WasmResult<JsValue> {
    let value = serde_json::to_value(state).map_err(|e| WasmError::JsError(e.to_string()))?;
    to_js(&value)
}

fn key_info_json(info: &KeyInfo) -> Value {
    json!({
        "isPasswordProtected": info.is_password_protected,
        "publicKey": info.public_key_hex(),
        "attestSig": info.attest_sig.as_ref().map(hex::encode),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_zero_rejected() {
        assert!(matches!(parse_slot(0), Err(WasmError::InvalidArgument(_))));
        assert_eq!(parse_slot(3).unwrap().key_no(), 3);
    }

    #[test]
    fn b256_accepts_prefixed_hex() {
        let digest = parse_b256("digest", &format!("0x{}", "ab".repeat(32))).unwrap();
        assert_eq!(digest, B256::repeat_byte(0xab));

        assert!(parse_b256("digest", "abcd").is_err());
        assert!(parse_b256("digest", "zz").is_err());
    }

    #[test]
    fn key_info_shape() {
        let info = KeyInfo {
            is_password_protected: true,
            public_key: Some(Bytes::from_static(&[0x04, 0xaa])),
            attest_sig: None,
        };

        assert_eq!(
            key_info_json(&info),
            json!({"isPasswordProtected": true, "publicKey": "04aa", "attestSig": null})
        );
    }
}
