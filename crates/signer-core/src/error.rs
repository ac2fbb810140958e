//! Error types for the HaLo EVM signer library.
//!
//! This module provides a single error type [`enum@Error`] covering every failure
//! mode of the chip protocol layer, and [`ChipError`], the failure reported by
//! the external command executor.
//!
//! # Error Categories
//!
//! - **Protocol errors**: the chip call failed or returned a malformed record
//! - **Signing errors**: the chip answered a `sign` command without a signature
//! - **Serialization errors**: the transaction shape is unsupported or malformed
//! - **State errors**: a key generation response lacks a field the current step needs
//!
//! Every error keeps the chip's reason code when one was reported, see
//! [`Error::reason_code`].
//!
//! # Example
//!
//! ```
//! use halo_evm_signer_core::error::{ChipError, ChipErrorCode, Error};
//!
//! let err = Error::Protocol {
//!     command: "sign",
//!     cause: ChipError::new(Some(ChipErrorCode::WrongPwd), "wrong password"),
//! };
//! assert_eq!(err.reason_code(), Some(ChipErrorCode::WrongPwd));
//! ```

use core::fmt;
use core::result::Result as CoreResult;
use core::str::FromStr;

use alloy_rlp::Error as AlloyRlpError;
use hex::FromHexError;
use serde::{Serialize, Serializer};
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// The main error type for the HaLo EVM signer library.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    // =========================================================================
    // Chip Protocol Errors
    // =========================================================================
    /// The chip call failed, or its response did not have the expected shape.
    #[error("chip command `{command}` failed: {cause}")]
    Protocol {
        /// Name of the command that failed (e.g. `"sign"`).
        command: &'static str,

        /// The underlying failure, with the chip's reason code if it gave one.
        #[source]
        cause: ChipError,
    },

    /// The `sign` command succeeded but the response lacks signature fields.
    #[error("signing failed: {0}")]
    Signing(String),

    /// A key generation response is missing a field the current step needs.
    #[error("key generation state error: {0}")]
    State(String),

    /// The password prompt failed; nothing was sent to the chip.
    #[error("password prompt failed: {0}")]
    PasswordPrompt(String),

    // =========================================================================
    // Slot Errors
    // =========================================================================
    /// Slot numbers start at 1.
    #[error("invalid slot number {0}")]
    InvalidSlot(u32),

    /// The chip reports no public key for the slot.
    #[error("slot {0} holds no key")]
    SlotEmpty(u32),

    // =========================================================================
    // Cryptographic Errors
    // =========================================================================
    /// The public key is invalid or malformed.
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    /// The signature is invalid or could not be recovered.
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    // =========================================================================
    // Transaction Errors
    // =========================================================================
    /// The transaction shape is unsupported or malformed.
    #[error("transaction serialization failed: {0}")]
    Serialization(String),

    // =========================================================================
    // EIP-712 Errors
    // =========================================================================
    /// The EIP-712 typed data is invalid.
    #[error("invalid EIP-712 typed data: {0}")]
    InvalidTypedData(String),

    /// A type referenced in the typed data is not defined.
    #[error("undefined type in EIP-712 data: {0}")]
    UndefinedType(String),

    // =========================================================================
    // Encoding Errors
    // =========================================================================
    /// Failed to parse hex data.
    #[error("hex decoding failed: {0}")]
    HexDecodeFailed(String),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    JsonError(String),
}

impl Error {
    /// Wraps a chip failure for the given command.
    pub(crate) const fn protocol(command: &'static str, cause: ChipError) -> Self {
        Self::Protocol { command, cause }
    }

    /// Builds a protocol error for a response that did not have the expected shape.
    pub(crate) fn malformed(command: &'static str, reason: impl fmt::Display) -> Self {
        Self::protocol(command, ChipError::new(None, format!("malformed response: {reason}")))
    }

    /// Returns the chip's reason code, if this error originated from one.
    #[must_use]
    pub const fn reason_code(&self) -> Option<ChipErrorCode> {
        match self {
            Self::Protocol { cause, .. } => cause.code(),
            _ => None,
        }
    }
}

impl From<FromHexError> for Error {
    fn from(err: FromHexError) -> Self {
        Self::HexDecodeFailed(err.to_string())
    }
}

impl From<SerdeJsonError> for Error {
    fn from(err: SerdeJsonError) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<AlloyRlpError> for Error {
    fn from(err: AlloyRlpError) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// A specialized [`Result`] type for HaLo signer operations.
pub type Result<T> = CoreResult<T, Error>;

/// Reason codes the chip attaches to a failed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipErrorCode {
    /// The slot number is out of range for this chip.
    InvalidKeyNo,

    /// The slot exists but no key was generated in it.
    KeyNotInitialized,

    /// The payload (digest, message, entropy) has the wrong length.
    InvalidLength,

    /// The payload could not be interpreted.
    InvalidData,

    /// The slot password was wrong or missing.
    WrongPwd,
}

impl ChipErrorCode {
    /// Returns the code as the chip spells it, without the `ERROR_CODE_` prefix.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidKeyNo => "INVALID_KEY_NO",
            Self::KeyNotInitialized => "KEY_NOT_INITIALIZED",
            Self::InvalidLength => "INVALID_LENGTH",
            Self::InvalidData => "INVALID_DATA",
            Self::WrongPwd => "WRONG_PWD",
        }
    }
}

impl fmt::Display for ChipErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ChipErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> CoreResult<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl FromStr for ChipErrorCode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.strip_prefix("ERROR_CODE_").unwrap_or(s) {
            "INVALID_KEY_NO" => Ok(Self::InvalidKeyNo),
            "KEY_NOT_INITIALIZED" => Ok(Self::KeyNotInitialized),
            "INVALID_LENGTH" => Ok(Self::InvalidLength),
            "INVALID_DATA" => Ok(Self::InvalidData),
            "WRONG_PWD" => Ok(Self::WrongPwd),
            other => Err(Error::protocol(
                "unknown",
                ChipError::new(None, format!("unknown chip error code: {other}")),
            )),
        }
    }
}

/// A failure reported by the chip command executor.
///
/// Transports build this from whatever their platform raises; the reason code
/// is kept when the chip reported one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ChipError {
    code: Option<ChipErrorCode>,
    message: String,
}

impl ChipError {
    /// Creates a chip error with an optional reason code.
    #[must_use]
    pub fn new(code: Option<ChipErrorCode>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Creates a chip error, parsing the reason code out of `name` if it is a known one.
    ///
    /// Unknown names are kept only in the message.
    #[must_use]
    pub fn from_name(name: &str, message: impl Into<String>) -> Self {
        Self::new(name.parse().ok(), message)
    }

    /// Returns the reason code, if the chip gave one.
    #[must_use]
    pub const fn code(&self) -> Option<ChipErrorCode> {
        self.code
    }

    /// Returns the failure message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}
