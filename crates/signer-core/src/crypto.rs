//! Signature recovery for chip signatures.
//!
//! The chip signs with secp256k1 and reports the recovery byte alongside
//! `r` and `s`, so the signer's public key (and address) can be recovered
//! from the digest alone. This is how signed transactions are checked
//! against the slot they were meant to come from.

use alloy_primitives::{Address, B256};
use k256::ecdsa::{RecoveryId, Signature as K256Signature, VerifyingKey};
use k256::FieldBytes;

use crate::address::address_from_verifying_key;
use crate::error::{Error, Result};
use crate::signature::ChipSignature;

/// Recovers the verifying key that produced `signature` over `digest`.
///
/// # Errors
///
/// Returns [`Error::InvalidSignature`] if the scalars are out of range, `s` is
/// not in the lower half of the curve order, or no key matches.
pub fn recover_verifying_key(digest: &B256, signature: &ChipSignature) -> Result<VerifyingKey> {
    let r_field = FieldBytes::from(*signature.r());
    let s_field = FieldBytes::from(*signature.s());

    let sig = K256Signature::from_scalars(r_field, s_field)
        .map_err(|_| Error::InvalidSignature("invalid signature scalars".to_string()))?;

    let recovery_id = RecoveryId::from_byte(signature.y_parity())
        .ok_or_else(|| Error::InvalidSignature("invalid recovery id".to_string()))?;

    VerifyingKey::recover_from_prehash(digest.as_slice(), &sig, recovery_id)
        .map_err(|e| Error::InvalidSignature(format!("recovery failed: {e}")))
}

/// Recovers the Ethereum address that produced `signature` over `digest`.
///
/// # Errors
///
/// See [`recover_verifying_key`].
pub fn recover_address(digest: &B256, signature: &ChipSignature) -> Result<Address> {
    recover_verifying_key(digest, signature).map(|key| address_from_verifying_key(&key))
}

#[cfg(test)]
mod tests {
    use alloy_primitives::keccak256;
    use k256::ecdsa::SigningKey;

    use super::*;

    fn sign(key: &SigningKey, digest: &B256) -> ChipSignature {
        let (sig, recid) = key.sign_prehash_recoverable(digest.as_slice()).unwrap();
        let bytes = sig.to_bytes();

        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..]);

        ChipSignature::from_parity(r, s, recid.to_byte()).unwrap()
    }

    #[test]
    fn recovers_signer() {
        let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
        let digest = keccak256(b"halo");

        let signature = sign(&key, &digest);
        let recovered = recover_address(&digest, &signature).unwrap();

        assert_eq!(recovered, address_from_verifying_key(key.verifying_key()));
    }

    #[test]
    fn wrong_parity_recovers_someone_else() {
        let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
        let digest = keccak256(b"halo");

        let signature = sign(&key, &digest);
        let flipped =
            ChipSignature::from_parity(*signature.r(), *signature.s(), 1 - signature.y_parity())
                .unwrap();

        let expected = address_from_verifying_key(key.verifying_key());
        match recover_address(&digest, &flipped) {
            Ok(address) => assert_ne!(address, expected),
            Err(err) => assert!(matches!(err, Error::InvalidSignature(_))),
        }
    }

    #[test]
    fn zero_scalars_rejected() {
        let signature = ChipSignature::new([0u8; 32], [0u8; 32], 27).unwrap();
        let result = recover_verifying_key(&B256::ZERO, &signature);
        assert!(matches!(result, Err(Error::InvalidSignature(_))));
    }
}
