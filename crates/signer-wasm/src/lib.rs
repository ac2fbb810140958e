//! HaLo EVM Signer WASM Library
//!
//! This crate provides WebAssembly bindings for the HaLo EVM Signer, enabling
//! browser-based applications to sign Ethereum payloads with a HaLo NFC chip.
//!
//! # Chip Access
//!
//! The bindings do not talk to NFC themselves. The caller passes a command
//! executor, a function taking a command object and resolving to the chip's
//! response, such as libhalo's `execHaloCmdWeb`. Errors it throws keep their
//! `errorName` reason code.
//!
//! # Quick Start
//!
//! ```javascript
//! import init, { HaloAccount, generateKey } from 'halo-evm-signer-wasm';
//! import { execHaloCmdWeb } from '@arx-research/libhalo/api/web';
//!
//! // Initialize WASM module
//! await init();
//!
//! // Generate a key in slot 2 (or use an existing one)
//! const entropy = crypto.getRandomValues(new Uint8Array(32));
//! const state = await generateKey(
//!     execHaloCmdWeb,
//!     () => prompt("New password"),
//!     2,
//!     Array.from(entropy, b => b.toString(16).padStart(2, "0")).join(""),
//!     s => console.log("key generation:", s.step),
//! );
//!
//! // Bind the slot to an account
//! const account = await HaloAccount.connect(execHaloCmdWeb, () => prompt("Password"), 2);
//! console.log("Ethereum address:", account.address);
//!
//! // Sign a transaction
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
//!
//! # API Reference
//!
//! ## [`HaloAccount`]
//!
//! - [`connect(execute, promptPassword, keyNo, address?)`](HaloAccount::connect) - Bind a slot
//! - [`address`](HaloAccount::address) - The checksummed address
//! - [`signMessage(message)`](HaloAccount::sign_message) - Sign a personal message (EIP-191)
//! - [`signMessageHex(hex)`](HaloAccount::sign_message_hex) - Sign raw bytes (EIP-191)
//! - [`signTypedData(json)`](HaloAccount::sign_typed_data) - Sign EIP-712 typed data
//! - [`signDigest(hex)`](HaloAccount::sign_digest) - Sign a 32-byte digest
//! - [`signTransaction(json)`](HaloAccount::sign_transaction) - Sign a transaction
//!
//! ## Functions
//!
//! - [`generateKey`](generate_key) - Run the key generation handshake
//! - [`getKeyInfo`](get_key_info) - Read a slot's key state
//! - [`getDataStruct`](get_data_struct) - Read structured data objects

pub mod account;
pub mod chip;
pub mod error;

pub use account::{HaloAccount, generate_key, get_data_struct, get_key_info};
pub use chip::{JsChip, JsPasswordPrompt};
pub use error::{WasmError, WasmResult};

use wasm_bindgen::prelude::*;

/// Initializes the WASM module.
///
/// This function is automatically called when the module is loaded,
/// but can be called explicitly if needed.
#[wasm_bindgen(start)]
#[expect(clippy::missing_const_for_fn, reason = "not a stable API function")]
pub fn init() {
    // Nothing to initialize for now
}

/// Returns the library version.
///
/// # Returns
///
/// The version string (e.g., `"0.1.0"`).
#[wasm_bindgen(js_name = "getVersion")]
pub fn get_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Import for WASM tests
    #[expect(unused_imports, reason = "import for WASM tests")]
    use wasm_bindgen_test::wasm_bindgen_test;

    #[test]
    fn version() {
        let version = get_version();
        assert!(!version.is_empty());
    }
}
