//! Signing pipeline.
//!
//! [`Signer`] turns a [`SigningIntent`] into a chip `sign` command, asks the
//! [`PasswordPrompt`] for the slot password, and decodes the chip's answer
//! into a [`ChipSignature`]. Transactions go through the same path as a
//! precomputed digest and are re-encoded with the signature afterwards.
//!
//! The password is asked for once per signing call and never cached.

use alloy_primitives::{B256, Bytes, eip191_hash_message};
use log::{debug, trace};

use crate::eip712::TypedData;
use crate::error::Result;
use crate::halo::{
    Chip, HaloSession, MessageFormat, PasswordPrompt, SignOptions, SignPayload, SignRequest,
    SignResponse, Slot,
};
use crate::signature::ChipSignature;
use crate::transaction::Transaction;

/// A message to sign with the EIP-191 personal message prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePayload {
    /// UTF-8 text, signed as its bytes.
    Text(String),
    /// Raw bytes.
    Hex(Bytes),
}

impl MessagePayload {
    /// Returns the bytes that are prefixed and hashed.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Hex(bytes) => bytes,
        }
    }

    /// Returns the EIP-191 digest the chip signs for this message.
    ///
    /// # Example
    ///
    /// ```
    /// use halo_evm_signer_core::MessagePayload;
    ///
    /// let text = MessagePayload::Text("hi".to_string());
    /// let hex = MessagePayload::Hex(b"hi".to_vec().into());
    /// assert_eq!(text.eip191_hash(), hex.eip191_hash());
    /// ```
    #[must_use]
    pub fn eip191_hash(&self) -> B256 {
        eip191_hash_message(self.as_bytes())
    }

    fn to_sign_payload(&self) -> SignPayload {
        match self {
            Self::Text(text) => SignPayload::Message {
                message: text.clone(),
                format: MessageFormat::Text,
            },
            Self::Hex(bytes) => SignPayload::Message {
                message: hex::encode(bytes),
                format: MessageFormat::Hex,
            },
        }
    }
}

/// What a caller wants signed.
#[derive(Debug, Clone, PartialEq)]
pub enum SigningIntent {
    /// A personal message.
    Message(MessagePayload),
    /// EIP-712 typed data.
    TypedData(TypedData),
    /// A precomputed 32-byte digest.
    Digest(B256),
}

impl SigningIntent {
    /// Returns the digest the chip is expected to sign.
    ///
    /// # Errors
    ///
    /// Returns the errors of [`TypedData::signing_hash`] for typed data.
    pub fn digest(&self) -> Result<B256> {
        match self {
            Self::Message(message) => Ok(message.eip191_hash()),
            Self::TypedData(typed_data) => typed_data.signing_hash(),
            Self::Digest(digest) => Ok(*digest),
        }
    }

    /// Builds the `sign` command payload.
    ///
    /// Typed data is sent without its `EIP712Domain` type.
    ///
    /// # Errors
    ///
    /// Returns [`Error::JsonError`](crate::Error::JsonError) if the typed data
    /// domain cannot be serialized.
    pub fn to_sign_payload(&self) -> Result<SignPayload> {
        Ok(match self {
            Self::Message(message) => message.to_sign_payload(),
            Self::TypedData(typed_data) => SignPayload::TypedData(typed_data.to_chip_payload()?),
            Self::Digest(digest) => SignPayload::Digest(*digest),
        })
    }

    const fn kind(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::TypedData(_) => "typed data",
            Self::Digest(_) => "digest",
        }
    }
}

/// Signs intents with chip slots.
pub struct Signer<C, P> {
    session: HaloSession<C>,
    prompt: P,
    options: SignOptions,
}

impl<C, P> std::fmt::Debug for Signer<C, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signer")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<C: Chip, P: PasswordPrompt> Signer<C, P> {
    /// Creates a signer with default [`SignOptions`].
    #[must_use]
    pub fn new(chip: C, prompt: P) -> Self {
        Self {
            session: HaloSession::new(chip),
            prompt,
            options: SignOptions::default(),
        }
    }

    /// Replaces the options sent with every `sign` command.
    #[must_use]
    pub fn with_options(mut self, options: SignOptions) -> Self {
        self.options = options;
        self
    }

    /// Returns the options sent with every `sign` command.
    #[must_use]
    pub const fn options(&self) -> &SignOptions {
        &self.options
    }

    /// Returns the underlying session.
    #[must_use]
    pub const fn session(&self) -> &HaloSession<C> {
        &self.session
    }

    /// Signs an intent with the key in `slot`.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`](crate::Error::Protocol) if the chip call fails
    /// - [`Error::Signing`](crate::Error::Signing) if the chip answers without a signature
    pub async fn sign(&self, slot: Slot, intent: &SigningIntent) -> Result<ChipSignature> {
        let response = self.sign_raw(slot, intent).await?;
        let signature = response.chip_signature()?;
        trace!("chip signature {signature}");
        Ok(signature)
    }

    /// Signs an intent and returns the chip's full response.
    ///
    /// The response also carries the digest the chip signed and the slot's
    /// public key and address.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`](crate::Error::Protocol) if the chip call fails
    /// - [`Error::PasswordPrompt`](crate::Error::PasswordPrompt) if the
    ///   password prompt fails; nothing is sent then
    pub async fn sign_raw(&self, slot: Slot, intent: &SigningIntent) -> Result<SignResponse> {
        let payload = intent.to_sign_payload()?;
        debug!("signing {} with {slot}", intent.kind());

        let password = self.prompt.prompt_password().await?;
        self.session
            .sign(SignRequest {
                slot,
                password,
                options: self.options.clone(),
                payload,
            })
            .await
    }

    /// Signs a precomputed digest with the key in `slot`.
    ///
    /// # Errors
    ///
    /// See [`sign`](Self::sign).
    pub async fn sign_digest(&self, slot: Slot, digest: B256) -> Result<ChipSignature> {
        self.sign(slot, &SigningIntent::Digest(digest)).await
    }

    /// Signs a transaction and returns its wire-ready encoding.
    ///
    /// The chip signs [`Transaction::digest_for_signing`]; the original
    /// transaction, sidecars included, is then encoded with the signature.
    ///
    /// # Errors
    ///
    /// - [`Error::Serialization`](crate::Error::Serialization) if the transaction
    ///   is malformed; nothing is sent to the chip in that case
    /// - the errors of [`sign`](Self::sign)
    pub async fn sign_transaction(&self, slot: Slot, tx: &Transaction) -> Result<Bytes> {
        tx.validate()?;

        let digest = tx.digest_for_signing();
        trace!("transaction digest {digest}");

        let signature = self.sign_digest(slot, digest).await?;
        tx.assemble_signed(&signature)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::eip712::Eip712Domain;
    use crate::error::Error;
    use crate::halo::NoPassword;
    use crate::halo::testing::{CountingPrompt, FailingPrompt, ScriptedChip};

    fn signed_response(v: u8) -> serde_json::Value {
        json!({
            "input": {"keyNo": 1},
            "signature": {"raw": {"r": "11".repeat(32), "s": "22".repeat(32), "v": v}}
        })
    }

    #[tokio::test]
    async fn digest_sent_as_bare_hex() {
        let chip = ScriptedChip::new(vec![Ok(signed_response(27))]);
        let signer = Signer::new(&chip, NoPassword);

        let signature = signer
            .sign_digest(Slot::FIRST, B256::repeat_byte(0x5a))
            .await
            .unwrap();

        assert_eq!(signature.y_parity(), 0);
        assert_eq!(
            chip.sent()[0],
            json!({"name": "sign", "keyNo": 1, "digest": "5a".repeat(32)})
        );
    }

    #[tokio::test]
    async fn prompt_failure_is_not_sent_to_the_chip() {
        let chip = ScriptedChip::new(vec![Ok(signed_response(27))]);
        let signer = Signer::new(&chip, FailingPrompt);

        let err = signer
            .sign_digest(Slot::FIRST, B256::repeat_byte(0x5a))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::PasswordPrompt(ref reason) if reason == "dialog closed"));
        assert_eq!(err.reason_code(), None);
        assert!(chip.sent().is_empty());
    }

    #[tokio::test]
    async fn v28_is_odd_parity() {
        let chip = ScriptedChip::new(vec![Ok(signed_response(28))]);
        let signer = Signer::new(&chip, NoPassword);

        let signature = signer.sign_digest(Slot::FIRST, B256::ZERO).await.unwrap();
        assert_eq!(signature.y_parity(), 1);
    }

    #[tokio::test]
    async fn message_formats() {
        let chip = ScriptedChip::new(vec![Ok(signed_response(27)), Ok(signed_response(27))]);
        let signer = Signer::new(&chip, NoPassword);

        let text = SigningIntent::Message(MessagePayload::Text("hello".to_string()));
        let hex = SigningIntent::Message(MessagePayload::Hex(vec![0xca, 0xfe].into()));
        signer.sign(Slot::FIRST, &text).await.unwrap();
        signer.sign(Slot::FIRST, &hex).await.unwrap();

        let sent = chip.sent();
        assert_eq!(sent[0]["message"], "hello");
        assert_eq!(sent[0]["format"], "text");
        assert_eq!(sent[1]["message"], "cafe");
        assert_eq!(sent[1]["format"], "hex");
    }

    #[tokio::test]
    async fn typed_data_drops_domain_type() {
        let chip = ScriptedChip::new(vec![Ok(signed_response(27))]);
        let signer = Signer::new(&chip, NoPassword);

        let typed_data = TypedData::new(
            Eip712Domain {
                name: Some("Test".to_string()),
                ..Eip712Domain::default()
            },
            json!({
                "EIP712Domain": [{"name": "name", "type": "string"}],
                "Greeting": [{"name": "text", "type": "string"}]
            }),
            "Greeting".to_string(),
            json!({"text": "gm"}),
        );
        signer
            .sign(Slot::FIRST, &SigningIntent::TypedData(typed_data))
            .await
            .unwrap();

        let typed = &chip.sent()[0]["typedData"];
        assert!(typed["types"].get("EIP712Domain").is_none());
        assert_eq!(typed["value"], json!({"text": "gm"}));
        assert_eq!(typed["domain"], json!({"name": "Test"}));
    }

    #[tokio::test]
    async fn missing_signature_is_signing_error() {
        let chip = ScriptedChip::new(vec![Ok(json!({"input": {"keyNo": 1}}))]);
        let signer = Signer::new(&chip, NoPassword);

        let err = signer.sign_digest(Slot::FIRST, B256::ZERO).await.unwrap_err();
        assert!(matches!(err, Error::Signing(_)));
    }

    #[tokio::test]
    async fn password_prompted_once_per_call() {
        let chip = ScriptedChip::new(vec![Ok(signed_response(27)), Ok(signed_response(27))]);
        let prompt = CountingPrompt::new(Some("pw"));
        let signer = Signer::new(&chip, &prompt);

        signer.sign_digest(Slot::FIRST, B256::ZERO).await.unwrap();
        signer.sign_digest(Slot::FIRST, B256::ZERO).await.unwrap();

        assert_eq!(prompt.calls(), 2);
        assert!(chip.sent().iter().all(|c| c["password"] == "pw"));
    }

    #[tokio::test]
    async fn options_are_forwarded() {
        let chip = ScriptedChip::new(vec![Ok(signed_response(27))]);
        let signer = Signer::new(&chip, NoPassword).with_options(SignOptions {
            public_key_hex: Some("04ff".to_string()),
            legacy_sign_command: true,
        });

        signer.sign_digest(Slot::FIRST, B256::ZERO).await.unwrap();

        let sent = &chip.sent()[0];
        assert_eq!(sent["publicKeyHex"], "04ff");
        assert_eq!(sent["legacySignCommand"], true);
    }

    #[tokio::test]
    async fn malformed_transaction_never_reaches_chip() {
        let chip = ScriptedChip::new(vec![]);
        let signer = Signer::new(&chip, NoPassword);

        let tx = Transaction::from_json(
            r#"{"type": "eip1559", "chainId": 0, "nonce": 0,
                "maxPriorityFeePerGas": "0x1", "maxFeePerGas": "0x1",
                "gasLimit": 21000, "value": "0x0"}"#,
        )
        .unwrap();

        let err = signer.sign_transaction(Slot::FIRST, &tx).await.unwrap_err();
        assert!(matches!(err, Error::Serialization(_)));
        assert!(chip.sent().is_empty());
    }
}
