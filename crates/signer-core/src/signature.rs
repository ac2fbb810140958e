//! Signatures as returned by the HaLo chip.
//!
//! The chip reports every signature as three components:
//!
//! - `r`: 32-byte x-coordinate of the ephemeral point
//! - `s`: 32-byte signature scalar
//! - `v`: recovery byte in the legacy Ethereum convention, always `27` or `28`
//!
//! [`ChipSignature`] keeps that convention and derives the `yParity` bit used by
//! typed transactions, plus the 65-byte compact form wallets expect.
//!
//! # Example
//!
//! ```
//! use halo_evm_signer_core::ChipSignature;
//!
//! let sig = ChipSignature::new([1u8; 32], [2u8; 32], 28).unwrap();
//! assert_eq!(sig.y_parity(), 1);
//! assert!(sig.to_hex().ends_with("1c"));
//! ```

use core::fmt;

use alloy_primitives::U256;
use serde::Serialize;

use crate::error::{Error, Result};

/// A secp256k1 ECDSA signature produced by the chip.
///
/// # Wire Format
///
/// The compact form is 65 bytes: `r (32 bytes) || s (32 bytes) || v (1 byte)`,
/// with `v` in `{27, 28}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChipSignature {
    /// The R component of the signature (32 bytes).
    #[serde(serialize_with = "hex_bytes::serialize")]
    r: [u8; 32],

    /// The S component of the signature (32 bytes).
    #[serde(serialize_with = "hex_bytes::serialize")]
    s: [u8; 32],

    /// The recovery byte (`27` or `28`).
    v: u8,
}

/// Serde helper for hex encoding 32-byte arrays.
mod hex_bytes {
    use hex::encode;
    use serde::Serializer;

    pub(super) fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format!("0x{}", encode(bytes)))
    }
}

impl ChipSignature {
    /// The length of a compact signature in bytes.
    pub const BYTE_LEN: usize = 65;

    /// Recovery byte for an even `y` coordinate.
    pub const V_EVEN: u8 = 27;

    /// Recovery byte for an odd `y` coordinate.
    pub const V_ODD: u8 = 28;

    /// Creates a signature from raw components.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if `v` is not `27` or `28`; the chip never
    /// produces any other value.
    pub fn new(r: [u8; 32], s: [u8; 32], v: u8) -> Result<Self> {
        if v != Self::V_EVEN && v != Self::V_ODD {
            return Err(Error::malformed(
                "sign",
                format!("recovery byte must be 27 or 28, got {v}"),
            ));
        }
        Ok(Self { r, s, v })
    }

    /// Creates a signature from a `yParity` bit (`0` or `1`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] if `y_parity` is greater than `1`.
    pub fn from_parity(r: [u8; 32], s: [u8; 32], y_parity: u8) -> Result<Self> {
        if y_parity > 1 {
            return Err(Error::InvalidSignature(format!(
                "y parity must be 0 or 1, got {y_parity}"
            )));
        }
        Ok(Self {
            r,
            s,
            v: Self::V_EVEN + y_parity,
        })
    }

    /// Creates a signature from the chip's hex-encoded components.
    ///
    /// `r` and `s` may carry a `0x` prefix and may be shorter than 32 bytes, in
    /// which case they are left-padded.
    ///
    /// # Errors
    ///
    /// - [`Error::Signing`] if `r` or `s` is not hex or longer than 32 bytes
    /// - [`Error::Protocol`] if `v` is not `27` or `28`
    pub fn from_hex_parts(r: &str, s: &str, v: u8) -> Result<Self> {
        Self::new(parse_scalar("r", r)?, parse_scalar("s", s)?, v)
    }

    /// Creates a signature from a 65-byte slice `r || s || v`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSignature`] if the slice is not 65 bytes, or a
    /// protocol error if `v` is out of range.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != Self::BYTE_LEN {
            return Err(Error::InvalidSignature(format!(
                "expected {} bytes, got {}",
                Self::BYTE_LEN,
                bytes.len()
            )));
        }

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[0..32]);
        s.copy_from_slice(&bytes[32..64]);

        Self::new(r, s, bytes[64])
    }

    /// Serializes the signature to its 65-byte compact form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::BYTE_LEN] {
        let mut bytes = [0u8; Self::BYTE_LEN];
        bytes[0..32].copy_from_slice(&self.r);
        bytes[32..64].copy_from_slice(&self.s);
        bytes[64] = self.v;
        bytes
    }

    /// Returns the R component of the signature.
    #[must_use]
    pub const fn r(&self) -> &[u8; 32] {
        &self.r
    }

    /// Returns the S component of the signature.
    #[must_use]
    pub const fn s(&self) -> &[u8; 32] {
        &self.s
    }

    /// Returns the recovery byte in the chip's convention (`27` or `28`).
    #[must_use]
    pub const fn v(&self) -> u8 {
        self.v
    }

    /// Returns the recovery bit: `0` when `v == 27`, otherwise `1`.
    #[must_use]
    pub const fn y_parity(&self) -> u8 {
        if self.v == Self::V_EVEN { 0 } else { 1 }
    }

    /// Returns the R component as a [`U256`].
    #[must_use]
    pub const fn r_u256(&self) -> U256 {
        U256::from_be_bytes(self.r)
    }

    /// Returns the S component as a [`U256`].
    #[must_use]
    pub const fn s_u256(&self) -> U256 {
        U256::from_be_bytes(self.s)
    }

    /// Encodes the compact signature as a `0x`-prefixed hex string.
    ///
    /// This is the same string the chip reports as its `ether` signature.
    #[must_use]
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.to_bytes()))
    }

    /// Parses a compact signature from a hex string, optionally prefixed with `0x`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HexDecodeFailed`] if the hex string is invalid, or the
    /// errors of [`from_bytes`](Self::from_bytes).
    pub fn from_hex(hex_str: &str) -> Result<Self> {
        let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
        let bytes = hex::decode(hex_str)?;
        Self::from_bytes(&bytes)
    }
}

impl fmt::Display for ChipSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Decodes one 32-byte scalar from the chip's hex representation.
fn parse_scalar(name: &str, value: &str) -> Result<[u8; 32]> {
    let value = value.strip_prefix("0x").unwrap_or(value);
    let bytes = hex::decode(value)
        .map_err(|e| Error::Signing(format!("signature component {name} is not hex: {e}")))?;
    if bytes.len() > 32 {
        return Err(Error::Signing(format!(
            "signature component {name} is {} bytes",
            bytes.len()
        )));
    }

    let mut scalar = [0u8; 32];
    scalar[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(scalar)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v27_is_even_parity() {
        let sig = ChipSignature::new([1u8; 32], [2u8; 32], 27).unwrap();
        assert_eq!(sig.y_parity(), 0);

        let sig = ChipSignature::new([1u8; 32], [2u8; 32], 28).unwrap();
        assert_eq!(sig.y_parity(), 1);
    }

    #[test]
    fn rejects_out_of_range_v() {
        for v in [0u8, 1, 26, 29, 37] {
            let err = ChipSignature::new([1u8; 32], [2u8; 32], v).unwrap_err();
            assert!(matches!(err, Error::Protocol { command: "sign", .. }));
        }
    }

    #[test]
    fn from_parity_maps_to_chip_convention() {
        let sig = ChipSignature::from_parity([0u8; 32], [0u8; 32], 1).unwrap();
        assert_eq!(sig.v(), 28);
        assert!(ChipSignature::from_parity([0u8; 32], [0u8; 32], 2).is_err());
    }

    #[test]
    fn from_hex_parts_pads_short_scalars() {
        let sig = ChipSignature::from_hex_parts("0x01", "ff", 27).unwrap();
        assert_eq!(sig.r_u256(), U256::from(1));
        assert_eq!(sig.s_u256(), U256::from(255));
    }

    #[test]
    fn from_hex_parts_rejects_garbage() {
        let err = ChipSignature::from_hex_parts("zz", "00", 27).unwrap_err();
        assert!(matches!(err, Error::Signing(_)));

        let long = "11".repeat(33);
        let err = ChipSignature::from_hex_parts(&long, "00", 27).unwrap_err();
        assert!(matches!(err, Error::Signing(_)));
    }

    #[test]
    fn compact_form_layout() {
        let sig = ChipSignature::new([0xaa; 32], [0xbb; 32], 28).unwrap();
        let bytes = sig.to_bytes();

        assert_eq!(&bytes[0..32], &[0xaa; 32]);
        assert_eq!(&bytes[32..64], &[0xbb; 32]);
        assert_eq!(bytes[64], 28);

        let hex = sig.to_hex();
        assert_eq!(hex.len(), 132);
        assert_eq!(ChipSignature::from_hex(&hex).unwrap(), sig);
    }

    #[test]
    fn from_bytes_invalid_length() {
        let result = ChipSignature::from_bytes(&[0u8; 64]);
        assert!(matches!(result, Err(Error::InvalidSignature(_))));
    }

    #[test]
    fn signature_display() {
        let sig = ChipSignature::new([0u8; 32], [0u8; 32], 27).unwrap();
        let display = format!("{sig}");
        assert!(display.starts_with("0x"));
        assert!(display.ends_with("1b"));
    }
}
