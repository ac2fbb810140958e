//! Slot-bound accounts.
//!
//! A [`SlotAccount`] binds one chip slot to its Ethereum address and signs
//! messages, typed data and transactions with it, the capability wallet
//! libraries expect from an account. It holds no key material.
//!
//! # Example
//!
//! ```ignore
//! use halo_evm_signer_core::{MessagePayload, SlotAccount};
//! use halo_evm_signer_core::halo::{NoPassword, Slot};
//!
//! let account = SlotAccount::connect(chip, NoPassword, Slot::new(1)?, None).await?;
//! println!("address: {}", account.address());
//!
//! let signature = account
//!     .sign_message(MessagePayload::Text("hello".to_string()))
//!     .await?;
//! ```

use std::fmt;

use alloy_primitives::{Address, B256, Bytes};
use log::debug;

use crate::address::address_from_public_key;
use crate::eip712::TypedData;
use crate::error::{Error, Result};
use crate::halo::{Chip, HaloSession, KeyInfo, PasswordPrompt, SignOptions, Slot};
use crate::signature::ChipSignature;
use crate::signing::{MessagePayload, Signer, SigningIntent};
use crate::transaction::Transaction;

/// An account backed by one chip slot.
pub struct SlotAccount<C, P> {
    signer: Signer<C, P>,
    slot: Slot,
    address: Address,
    key_info: Option<KeyInfo>,
}

impl<C, P> fmt::Debug for SlotAccount<C, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotAccount")
            .field("slot", &self.slot)
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl<C: Chip, P: PasswordPrompt> SlotAccount<C, P> {
    /// Binds `slot` to an account.
    ///
    /// With a known `address` no chip call is made. Otherwise the slot's key
    /// info is read once, the address is derived from its public key, and
    /// every later `sign` command carries that public key so the chip refuses
    /// to sign if the slot's key changed.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if reading the key info fails
    /// - [`Error::SlotEmpty`] if the slot holds no key
    /// - [`Error::InvalidPublicKey`] if the reported key is not a secp256k1 point
    pub async fn connect(
        chip: C,
        prompt: P,
        slot: Slot,
        address: Option<Address>,
    ) -> Result<Self> {
        if let Some(address) = address {
            return Ok(Self {
                signer: Signer::new(chip, prompt),
                slot,
                address,
                key_info: None,
            });
        }

        let session = HaloSession::new(chip);
        let key_info = session.get_key_info(slot).await?;
        let public_key = key_info
            .public_key
            .as_ref()
            .ok_or(Error::SlotEmpty(slot.key_no()))?;
        let address = address_from_public_key(public_key)?;
        debug!("{slot} resolves to {address}");

        let options = SignOptions {
            public_key_hex: key_info.public_key_hex(),
            ..SignOptions::default()
        };
        let signer = Signer::new(session.into_chip(), prompt).with_options(options);

        Ok(Self {
            signer,
            slot,
            address,
            key_info: Some(key_info),
        })
    }

    /// Returns the account address.
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Returns the slot backing the account.
    #[must_use]
    pub const fn slot(&self) -> Slot {
        self.slot
    }

    /// Returns the key info read when connecting, if the address was not given.
    #[must_use]
    pub const fn key_info(&self) -> Option<&KeyInfo> {
        self.key_info.as_ref()
    }

    /// Signs any intent.
    ///
    /// # Errors
    ///
    /// See [`Signer::sign`].
    pub async fn sign(&self, intent: &SigningIntent) -> Result<ChipSignature> {
        self.signer.sign(self.slot, intent).await
    }

    /// Signs a personal message.
    ///
    /// # Errors
    ///
    /// See [`Signer::sign`].
    pub async fn sign_message(&self, message: MessagePayload) -> Result<ChipSignature> {
        self.sign(&SigningIntent::Message(message)).await
    }

    /// Signs EIP-712 typed data.
    ///
    /// # Errors
    ///
    /// See [`Signer::sign`].
    pub async fn sign_typed_data(&self, typed_data: TypedData) -> Result<ChipSignature> {
        self.sign(&SigningIntent::TypedData(typed_data)).await
    }

    /// Signs a precomputed digest.
    ///
    /// # Errors
    ///
    /// See [`Signer::sign`].
    pub async fn sign_digest(&self, digest: B256) -> Result<ChipSignature> {
        self.signer.sign_digest(self.slot, digest).await
    }

    /// Signs a transaction and returns its wire-ready encoding.
    ///
    /// # Errors
    ///
    /// See [`Signer::sign_transaction`].
    pub async fn sign_transaction(&self, tx: &Transaction) -> Result<Bytes> {
        self.signer.sign_transaction(self.slot, tx).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::halo::NoPassword;
    use crate::halo::testing::ScriptedChip;

    /// Uncompressed public key of private key `1`.
    const GENERATOR: &str = "0479be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\
                             483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8";

    fn signed_response() -> serde_json::Value {
        json!({"signature": {"raw": {"r": "11".repeat(32), "s": "22".repeat(32), "v": 27}}})
    }

    #[tokio::test]
    async fn connect_derives_address_and_pins_public_key() {
        let chip = ScriptedChip::new(vec![
            Ok(json!({"keyState": {"isPasswordProtected": false}, "publicKey": GENERATOR})),
            Ok(signed_response()),
        ]);

        let account = SlotAccount::connect(&chip, NoPassword, Slot::new(2).unwrap(), None)
            .await
            .unwrap();

        assert_eq!(
            account.address().to_checksum(None),
            "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
        );
        assert!(account.key_info().is_some());

        account.sign_digest(B256::ZERO).await.unwrap();
        let sent = chip.sent();
        assert_eq!(sent[0], json!({"name": "get_key_info", "keyNo": 2}));
        assert_eq!(sent[1]["publicKeyHex"], GENERATOR);
        assert_eq!(sent[1]["keyNo"], 2);
    }

    #[tokio::test]
    async fn known_address_skips_key_info() {
        let chip = ScriptedChip::new(vec![Ok(signed_response())]);
        let address = Address::repeat_byte(0x11);

        let account = SlotAccount::connect(&chip, NoPassword, Slot::FIRST, Some(address))
            .await
            .unwrap();
        account
            .sign_message(MessagePayload::Text("gm".to_string()))
            .await
            .unwrap();

        assert_eq!(account.address(), address);
        assert!(account.key_info().is_none());

        let sent = chip.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0]["name"], "sign");
        assert!(sent[0].get("publicKeyHex").is_none());
    }

    #[tokio::test]
    async fn empty_slot() {
        let chip = ScriptedChip::new(vec![Ok(json!({"keyState": {}}))]);

        let err = SlotAccount::connect(&chip, NoPassword, Slot::new(5).unwrap(), None)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::SlotEmpty(5)));
    }
}
