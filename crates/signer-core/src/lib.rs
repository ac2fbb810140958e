//! HaLo EVM Signer Core Library
//!
//! This crate provides the core functionality for signing Ethereum payloads
//! with a HaLo NFC chip. The chip holds secp256k1 keys in numbered slots and
//! answers JSON commands; this crate speaks that protocol, hashes what needs
//! hashing, and turns the chip's signatures into wire-ready transactions.
//!
//! # Overview
//!
//! The chip is reached through a caller-supplied command executor, the
//! [`halo::Chip`] trait. Everything above it is pure and platform independent:
//!
//! - **Command codec**: typed requests and responses for every chip command
//! - **Structured data**: multi-round reads of the chip's data objects
//! - **Signing**: personal messages (EIP-191), EIP-712 typed data and digests
//! - **Transactions**: legacy (EIP-155), EIP-2930, EIP-1559 and EIP-4844
//!   serialization and signed assembly
//! - **Key generation**: the `gen_key` / confirm / finalize state machine
//! - **Accounts**: a slot bound to its address
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Application Layer                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SlotAccount   │   Signer     │   KeyGenerator              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Transaction   │   EIP-712    │   Address    │   Signature  │
//! │   Assembly     │   Hashing    │  Derivation  │    Types     │
//! ├─────────────────────────────────────────────────────────────┤
//! │                    HaLo Command Layer                       │
//! │  ┌─────────┐  ┌──────────┐  ┌──────────┐  ┌───────────────┐ │
//! │  │  Slot   │  │ Command  │  │  Data    │  │    Session    │ │
//! │  │         │  │  Codec   │  │  Struct  │  │               │ │
//! │  └─────────┘  └──────────┘  └──────────┘  └───────────────┘ │
//! ├─────────────────────────────────────────────────────────────┤
//! │           Command Executor (NFC / WebNFC / bridge)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ## Creating a Transaction
//!
//! ```rust
//! use halo_evm_signer_core::{Address, Bytes, Eip1559Transaction, Transaction, U256};
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
//! // The digest the chip signs
//! let digest = tx.digest_for_signing();
//! ```
//!
//! ## Hashing EIP-712 Typed Data
//!
//! ```rust
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
//!     "Transfer": [
//!         {"name": "to", "type": "address"},
//!         {"name": "amount", "type": "uint256"}
//!     ]
//! });
//!
//! let message = json!({
//!     "to": "0x0000000000000000000000000000000000000001",
//!     "amount": "1000000000000000000"
//! });
//!
//! let typed_data = TypedData::new(domain, types, "Transfer".to_string(), message);
//! let hash = typed_data.signing_hash().unwrap();
//! ```
//!
//! ## Signing with a Chip
//!
//! ```ignore
//! use halo_evm_signer_core::{SlotAccount, MessagePayload};
//! use halo_evm_signer_core::halo::{NoPassword, Slot};
//!
//! // `chip` implements `halo::Chip` for the platform at hand
//! let account = SlotAccount::connect(chip, NoPassword, Slot::new(1)?, None).await?;
//! let signature = account
//!     .sign_message(MessagePayload::Text("hello".to_string()))
//!     .await?;
//! let raw_tx = account.sign_transaction(&tx).await?;
//! ```
//!
//! # Security Considerations
//!
//! - Private keys never leave the chip
//! - Password-protected slots are unlocked per command; passwords are never
//!   cached by this crate
//! - Transactions are validated before the chip is asked to sign
//! - A connected account pins its public key so the chip refuses to sign if
//!   the slot's key changed

pub mod account;
pub mod address;
pub mod crypto;
pub mod eip712;
pub mod error;
pub mod halo;
pub mod signature;
pub mod signing;
pub mod transaction;

// Re-exports for convenience
pub use account::SlotAccount;
pub use eip712::{Eip712Domain, TypedData};
pub use error::{ChipError, ChipErrorCode, Error, Result};
pub use signature::ChipSignature;
pub use signing::{MessagePayload, Signer, SigningIntent};
pub use transaction::{
    AccessListEntry, BlobSidecar, Eip1559Transaction, Eip2930Transaction, Eip4844Transaction,
    LegacyTransaction, SignedTransaction, Transaction,
};

// Re-export commonly used alloy types
pub use alloy_primitives::{Address, B256, Bytes, U256};
