//! HaLo chip protocol.
//!
//! This module talks to a HaLo NFC chip through an external command executor.
//! It covers:
//!
//! - The command set and its JSON records
//! - Typed responses, validated in one place
//! - Multi-round structured data reads
//! - The key generation handshake
//!
//! # Architecture
//!
//! - [`command`]: command and response types
//! - [`session`]: one typed method per chip command
//! - [`data_struct`]: object types and the multi-round reader
//! - [`keygen`]: the key generation state machine
//! - [`slot`]: slot numbers
//!
//! # Collaborators
//!
//! The [`Chip`] trait is the only way commands reach the chip. Whatever
//! carries them (NFC in a browser, a USB reader, a test double) implements
//! it. The [`PasswordPrompt`] trait supplies slot passwords on demand.
//!
//! Both traits are `?Send`: browser executors hand back futures that cannot
//! cross threads. Calls are strictly sequential and the caller must not run
//! two operations against the same slot at once.

pub mod command;
pub mod data_struct;
pub mod keygen;
pub mod session;
pub mod slot;

pub use command::{
    Command, DataStructResponse, GenKeyConfirmResponse, GenKeyFinalizeResponse, GenKeyResponse,
    KeyInfo, MessageFormat, Password, SignOptions, SignPayload, SignRequest, SignResponse,
    TypedDataPayload,
};
pub use data_struct::{DataStructKey, ObjectType, fetch_data_struct};
pub use keygen::{GenerateKeyState, KeyGenFailure, KeyGenStep, KeyGenerator};
pub use session::HaloSession;
pub use slot::Slot;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ChipError, Result as CrateResult};

/// Executes commands against a chip.
///
/// Implementations send [`Command::to_json`] to the chip and return its JSON
/// response. Any failure, chip-side or transport-side, is reported as a
/// [`ChipError`], keeping the chip's reason code when it gave one.
#[async_trait(?Send)]
pub trait Chip {
    /// Executes one command.
    ///
    /// # Errors
    ///
    /// Returns the chip's or the transport's failure.
    async fn execute(&self, command: &Command) -> Result<Value, ChipError>;
}

#[async_trait(?Send)]
impl<T: Chip + ?Sized> Chip for &T {
    async fn execute(&self, command: &Command) -> Result<Value, ChipError> {
        (**self).execute(command).await
    }
}

/// Supplies slot passwords.
///
/// Called at most once per signing operation or finalize step. `Ok(None)`
/// means "no password". An error aborts the operation before the command
/// that needed the password is sent.
#[async_trait(?Send)]
pub trait PasswordPrompt {
    /// Asks for the password of the slot about to be used.
    ///
    /// # Errors
    ///
    /// Returns [`Error::PasswordPrompt`](crate::Error::PasswordPrompt) if no answer could be obtained.
    async fn prompt_password(&self) -> CrateResult<Option<Password>>;
}

#[async_trait(?Send)]
impl<T: PasswordPrompt + ?Sized> PasswordPrompt for &T {
    async fn prompt_password(&self) -> CrateResult<Option<Password>> {
        (**self).prompt_password().await
    }
}

/// A prompt for slots without a password.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPassword;

#[async_trait(?Send)]
impl PasswordPrompt for NoPassword {
    async fn prompt_password(&self) -> CrateResult<Option<Password>> {
        Ok(None)
    }
}

/// A prompt that always answers with the same password.
#[derive(Debug, Clone)]
pub struct StaticPassword(pub Password);

#[async_trait(?Send)]
impl PasswordPrompt for StaticPassword {
    async fn prompt_password(&self) -> CrateResult<Option<Password>> {
        Ok(Some(self.0.clone()))
    }
}
