//! Key generation handshake.
//!
//! Generating a key takes up to three chip commands:
//!
//! ```text
//!            gen_key
//! initial ──────────────┬─────────────────────────┐
//!                       │ needsConfirmPK          │ root key returned
//!                       ▼                         ▼
//!                  confirming ──gen_key_confirm──► finalizing ──gen_key_finalize──► completed
//! ```
//!
//! Any failure moves the state to `error`. [`KeyGenerator`] records the state
//! after every transition, notifies its observer, and only then returns the
//! error, so [`KeyGenerator::state`] always holds the terminal record.
//!
//! The generator never retries a step. Calling
//! [`generate`](KeyGenerator::generate) again restarts from `initial`.

use std::fmt;

use alloy_primitives::B256;
use log::debug;
use serde::Serialize;

use super::session::HaloSession;
use super::slot::Slot;
use super::{Chip, PasswordPrompt};
use crate::error::{ChipErrorCode, Error, Result};

/// Steps of the key generation handshake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyGenStep {
    /// Nothing sent yet.
    #[default]
    Initial,
    /// Waiting for the candidate public key to be confirmed.
    Confirming,
    /// The root key is known; waiting for finalization.
    Finalizing,
    /// The key is generated.
    Completed,
    /// A step failed.
    Error,
}

/// Why key generation stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyGenFailure {
    /// The error message.
    pub message: String,

    /// The chip's reason code, if it gave one.
    pub code: Option<ChipErrorCode>,
}

impl From<&Error> for KeyGenFailure {
    fn from(err: &Error) -> Self {
        Self {
            message: err.to_string(),
            code: err.reason_code(),
        }
    }
}

/// Progress of one key generation.
///
/// Hex fields are kept exactly as the chip reported them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateKeyState {
    /// The current step.
    pub step: KeyGenStep,

    /// The candidate public key while confirming, then the generated key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,

    /// The chip's root public key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_public_key: Option<String>,

    /// The root key's attestation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_attest_sig: Option<String>,

    /// The attestation over the generated key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attest_sig: Option<String>,

    /// Set when `step` is [`KeyGenStep::Error`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<KeyGenFailure>,
}

/// Observer called with every recorded state.
type Observer<'a> = Box<dyn FnMut(&GenerateKeyState) + 'a>;

/// Drives the key generation handshake for one slot at a time.
///
/// # Example
///
/// ```ignore
/// use halo_evm_signer_core::halo::{KeyGenerator, NoPassword, Slot};
///
/// let mut generator = KeyGenerator::new(chip, NoPassword)
///     .with_observer(|state| println!("{:?}", state.step));
/// let state = generator.generate(Slot::new(2)?, entropy).await?;
/// println!("new key: {:?}", state.public_key);
/// ```
pub struct KeyGenerator<'a, C, P> {
    session: HaloSession<C>,
    prompt: P,
    state: GenerateKeyState,
    observer: Option<Observer<'a>>,
}

impl<C, P> fmt::Debug for KeyGenerator<'_, C, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyGenerator")
            .field("state", &self.state)
            .field("observed", &self.observer.is_some())
            .finish_non_exhaustive()
    }
}

impl<'a, C: Chip, P: PasswordPrompt> KeyGenerator<'a, C, P> {
    /// Creates a generator.
    ///
    /// `prompt` is asked once per generation, before finalizing; the password
    /// it returns protects the new key.
    #[must_use]
    pub fn new(chip: C, prompt: P) -> Self {
        Self {
            session: HaloSession::new(chip),
            prompt,
            state: GenerateKeyState::default(),
            observer: None,
        }
    }

    /// Registers a closure called with every recorded state.
    #[must_use]
    pub fn with_observer(mut self, observer: impl FnMut(&GenerateKeyState) + 'a) -> Self {
        self.observer = Some(Box::new(observer));
        self
    }

    /// Returns the most recently recorded state.
    #[must_use]
    pub const fn state(&self) -> &GenerateKeyState {
        &self.state
    }

    /// Generates a key in `slot`, mixing in `entropy`.
    ///
    /// Returns the completed state, with the generated public key, its
    /// attestation, and the root key with its attestation.
    ///
    /// # Errors
    ///
    /// - [`Error::Protocol`] if a chip command fails
    /// - [`Error::State`] if a response lacks a field the current step needs
    /// - [`Error::PasswordPrompt`] if the password prompt fails
    ///
    /// In every case the state is recorded as [`KeyGenStep::Error`] first.
    pub async fn generate(&mut self, slot: Slot, entropy: B256) -> Result<GenerateKeyState> {
        self.record(slot, GenerateKeyState::default());

        match self.run(slot, entropy).await {
            Ok(()) => Ok(self.state.clone()),
            Err(err) => {
                let mut failed = self.state.clone();
                failed.step = KeyGenStep::Error;
                failed.error = Some(KeyGenFailure::from(&err));
                self.record(slot, failed);
                Err(err)
            }
        }
    }

    async fn run(&mut self, slot: Slot, entropy: B256) -> Result<()> {
        let generated = self.session.gen_key(slot, entropy).await?;
        let mut next = GenerateKeyState::default();

        if generated.needs_confirm_pk {
            let public_key = require(generated.public_key, "gen_key", "publicKey")?;
            next.step = KeyGenStep::Confirming;
            next.public_key = Some(public_key.clone());
            self.record(slot, next.clone());

            let confirmed = self.session.gen_key_confirm(slot, &public_key).await?;
            next.root_public_key = Some(require(
                confirmed.root_public_key,
                "gen_key_confirm",
                "rootPublicKey",
            )?);
            next.root_attest_sig = Some(require(
                confirmed.root_attest_sig,
                "gen_key_confirm",
                "rootAttestSig",
            )?);
        } else {
            next.root_public_key = Some(require(
                generated.root_public_key,
                "gen_key",
                "rootPublicKey",
            )?);
            next.root_attest_sig = Some(require(
                generated.root_attest_sig,
                "gen_key",
                "rootAttestSig",
            )?);
        }

        next.step = KeyGenStep::Finalizing;
        self.record(slot, next.clone());

        let password = self.prompt.prompt_password().await?;
        let finalized = self.session.gen_key_finalize(slot, password).await?;

        next.public_key = Some(require(
            finalized.public_key,
            "gen_key_finalize",
            "publicKey",
        )?);
        next.attest_sig = Some(require(
            finalized.attest_sig,
            "gen_key_finalize",
            "attestSig",
        )?);
        next.step = KeyGenStep::Completed;
        self.record(slot, next);

        Ok(())
    }

    fn record(&mut self, slot: Slot, state: GenerateKeyState) {
        debug!(
            "key generation on {slot}: {:?} -> {:?}",
            self.state.step, state.step
        );
        self.state = state;
        if let Some(observer) = self.observer.as_mut() {
            observer(&self.state);
        }
    }
}

/// Takes a required response field, rejecting absent and empty values.
fn require(value: Option<String>, command: &str, field: &str) -> Result<String> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| Error::State(format!("`{command}` response has no `{field}`")))
}
