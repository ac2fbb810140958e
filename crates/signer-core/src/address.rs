//! Ethereum address derivation from secp256k1 public keys.
//!
//! The chip reports public keys as hex, usually as an uncompressed SEC1 point.
//! The derivation follows the standard Ethereum computation:
//!
//! 1. Decode the public key into an uncompressed point (65 bytes: `0x04 || x || y`)
//! 2. Remove the `0x04` prefix to get 64 bytes (`x || y`)
//! 3. Compute the Keccak-256 hash of the 64 bytes
//! 4. Take the last 20 bytes of the hash as the address
//!
//! # Example
//!
//! ```
//! use halo_evm_signer_core::address::address_from_public_key_hex;
//!
//! // The secp256k1 generator point, i.e. the public key of private key 1.
//! let g = "0479be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\
//!          483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8";
//! let address = address_from_public_key_hex(g).unwrap();
//! assert_eq!(
//!     address.to_checksum(None),
//!     "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf"
//! );
//! ```

use alloy_primitives::{Address, keccak256};
use k256::PublicKey;
use k256::ecdsa::VerifyingKey;

use crate::error::{Error, Result};

/// Length of an uncompressed public key without its SEC1 tag.
const RAW_POINT_LEN: usize = 64;

/// Derives an Ethereum address from a secp256k1 verifying key.
#[must_use]
pub fn address_from_verifying_key(public_key: &VerifyingKey) -> Address {
    let encoded = public_key.to_encoded_point(false);
    address_from_point(&encoded.as_bytes()[1..])
}

/// Derives an Ethereum address from raw public key bytes.
///
/// Accepts a compressed point (33 bytes), an uncompressed point (65 bytes,
/// `0x04 || x || y`) or the bare coordinates (64 bytes, `x || y`).
///
/// # Errors
///
/// Returns [`Error::InvalidPublicKey`] if the bytes do not encode a point on
/// the secp256k1 curve.
pub fn address_from_public_key(bytes: &[u8]) -> Result<Address> {
    let public_key = if bytes.len() == RAW_POINT_LEN {
        let mut tagged = Vec::with_capacity(RAW_POINT_LEN + 1);
        tagged.push(0x04);
        tagged.extend_from_slice(bytes);
        PublicKey::from_sec1_bytes(&tagged)
    } else {
        PublicKey::from_sec1_bytes(bytes)
    }
    .map_err(|_| {
        Error::InvalidPublicKey(format!(
            "{} bytes do not encode a secp256k1 point",
            bytes.len()
        ))
    })?;

    Ok(address_from_verifying_key(&VerifyingKey::from(&public_key)))
}

/// Derives an Ethereum address from a hex-encoded public key, with or without `0x`.
///
/// # Errors
///
/// Returns [`Error::HexDecodeFailed`] for invalid hex, or the errors of
/// [`address_from_public_key`].
pub fn address_from_public_key_hex(hex_str: &str) -> Result<Address> {
    let hex_str = hex_str.strip_prefix("0x").unwrap_or(hex_str);
    address_from_public_key(&hex::decode(hex_str)?)
}

/// Hashes the bare `x || y` coordinates into an address.
fn address_from_point(point: &[u8]) -> Address {
    let hash = keccak256(point);
    Address::from_slice(&hash[12..])
}

#[cfg(test)]
mod tests {
    use k256::ecdsa::SigningKey;

    use super::*;

    /// Uncompressed public key of private key `1`.
    const GENERATOR: &str = "0479be667ef9dcbbac55a06295ce870b07029bfcdb2dce28d959f2815b16f81798\
                             483ada7726a3c4655da4fbfc0e1108a8fd17b448a68554199c47d08ffb10d4b8";

    /// Address of private key `1`.
    const GENERATOR_ADDRESS: &str = "0x7E5F4552091A69125d5DfCb7b8C2659029395Bdf";

    #[test]
    fn uncompressed_key() {
        let address = address_from_public_key_hex(GENERATOR).unwrap();
        assert_eq!(address.to_checksum(None), GENERATOR_ADDRESS);
    }

    #[test]
    fn all_encodings_agree() {
        let key = SigningKey::from_slice(&[7u8; 32]).unwrap();
        let verifying = key.verifying_key();

        let compressed = verifying.to_encoded_point(true);
        let uncompressed = verifying.to_encoded_point(false);

        let expected = address_from_verifying_key(verifying);
        assert_eq!(
            address_from_public_key(compressed.as_bytes()).unwrap(),
            expected
        );
        assert_eq!(
            address_from_public_key(uncompressed.as_bytes()).unwrap(),
            expected
        );
        assert_eq!(
            address_from_public_key(&uncompressed.as_bytes()[1..]).unwrap(),
            expected
        );
    }

    #[test]
    fn prefixed_hex() {
        let prefixed = format!("0x{GENERATOR}");
        let address = address_from_public_key_hex(&prefixed).unwrap();
        assert_eq!(address.to_checksum(None), GENERATOR_ADDRESS);
    }

    #[test]
    fn invalid_public_key() {
        let result = address_from_public_key(&[0u8; 65]);
        assert!(matches!(result, Err(Error::InvalidPublicKey(_))));

        let result = address_from_public_key(&[0x04; 10]);
        assert!(matches!(result, Err(Error::InvalidPublicKey(_))));
    }

    #[test]
    fn invalid_hex() {
        let result = address_from_public_key_hex("not-hex");
        assert!(matches!(result, Err(Error::HexDecodeFailed(_))));
    }
}
