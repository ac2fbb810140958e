//! Typed access to chip commands.
//!
//! [`HaloSession`] is the command codec: one method per chip command, each
//! taking typed arguments and returning a typed response. It shapes the
//! request, hands it to the [`Chip`], and narrows the JSON response. It never
//! retries.
//!
//! # Example
//!
//! ```ignore
//! use halo_evm_signer_core::halo::{HaloSession, Slot};
//!
//! let session = HaloSession::new(chip);
//! let info = session.get_key_info(Slot::new(1)?).await?;
//! println!("password protected: {}", info.is_password_protected);
//! ```

use std::fmt;

use alloy_primitives::B256;
use log::debug;
use serde_json::Value;

use super::Chip;
use super::command::{
    Command, DataStructResponse, GenKeyConfirmResponse, GenKeyFinalizeResponse, GenKeyResponse,
    KeyInfo, Password, SignRequest, SignResponse, parse_response,
};
use super::data_struct::{DataStructKey, fetch_data_struct};
use super::slot::Slot;
use crate::error::{Error, Result};

/// A connection to one chip through its command executor.
pub struct HaloSession<C> {
    /// The command executor.
    chip: C,
}

impl<C> fmt::Debug for HaloSession<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HaloSession").finish_non_exhaustive()
    }
}

impl<C: Chip> HaloSession<C> {
    /// Creates a session over the given command executor.
    #[must_use]
    pub const fn new(chip: C) -> Self {
        Self { chip }
    }

    /// Returns the underlying command executor.
    #[must_use]
    pub const fn chip(&self) -> &C {
        &self.chip
    }

    /// Consumes the session, returning the command executor.
    #[must_use]
    pub fn into_chip(self) -> C {
        self.chip
    }

    /// Sends a command and returns the chip's raw JSON response.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] carrying the chip's failure, reason code
    /// included.
    pub async fn execute(&self, command: &Command) -> Result<Value> {
        match command.slot() {
            Some(slot) => debug!("chip command `{}` on {slot}", command.name()),
            None => debug!("chip command `{}`", command.name()),
        }

        self.chip.execute(command).await.map_err(|cause| {
            debug!("chip command `{}` failed: {cause}", command.name());
            Error::protocol(command.name(), cause)
        })
    }

    /// Signs a message, digest or typed data.
    ///
    /// The response is returned as is; use [`SignResponse::chip_signature`] to
    /// decode the signature.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the command fails or the response is malformed.
    pub async fn sign(&self, request: SignRequest) -> Result<SignResponse> {
        let command = Command::Sign(request);
        let response = self.execute(&command).await?;
        parse_response(command.name(), response)
    }

    /// Reads a slot's key state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the command fails or the response is malformed.
    pub async fn get_key_info(&self, slot: Slot) -> Result<KeyInfo> {
        let response = self.execute(&Command::GetKeyInfo { slot }).await?;
        KeyInfo::parse(response)
    }

    /// Issues a single `get_data_struct` round for `keys`.
    ///
    /// The chip may answer only part of the request; see
    /// [`fetch_data_struct`](Self::fetch_data_struct) for the complete read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the command fails or the response is malformed.
    pub async fn get_data_struct(&self, keys: &[DataStructKey]) -> Result<DataStructResponse> {
        let command = Command::GetDataStruct {
            keys: keys.to_vec(),
        };
        let response = self.execute(&command).await?;
        parse_response(command.name(), response)
    }

    /// Reads every requested object, over as many rounds as the chip needs.
    ///
    /// # Errors
    ///
    /// See [`fetch_data_struct`](super::fetch_data_struct).
    pub async fn fetch_data_struct(&self, keys: &[DataStructKey]) -> Result<DataStructResponse> {
        fetch_data_struct(self, keys).await
    }

    /// Starts key generation in `slot`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the command fails or the response is malformed.
    pub async fn gen_key(&self, slot: Slot, entropy: B256) -> Result<GenKeyResponse> {
        let command = Command::GenKey { slot, entropy };
        let response = self.execute(&command).await?;
        parse_response(command.name(), response)
    }

    /// Confirms the candidate public key returned by [`gen_key`](Self::gen_key).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the command fails or the response is malformed.
    pub async fn gen_key_confirm(
        &self,
        slot: Slot,
        public_key: &str,
    ) -> Result<GenKeyConfirmResponse> {
        let command = Command::GenKeyConfirm {
            slot,
            public_key: public_key.to_string(),
        };
        let response = self.execute(&command).await?;
        parse_response(command.name(), response)
    }

    /// Finalizes key generation, optionally protecting the slot with `password`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the command fails or the response is malformed.
    pub async fn gen_key_finalize(
        &self,
        slot: Slot,
        password: Option<Password>,
    ) -> Result<GenKeyFinalizeResponse> {
        let command = Command::GenKeyFinalize { slot, password };
        let response = self.execute(&command).await?;
        parse_response(command.name(), response)
    }
}
