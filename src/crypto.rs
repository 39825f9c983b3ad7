// Copyright (c) XBridge, Inc.
// SPDX-License-Identifier: Apache-2.0

use crate::error::{WitnessError, WitnessResult};
use crate::types::AccountId;
use fastcrypto::ed25519::{Ed25519KeyPair, Ed25519PublicKey, Ed25519Signature};
use fastcrypto::hash::{HashFunction, Keccak256};
use fastcrypto::traits::{KeyPair, Signer, ToFromBytes, VerifyingKey};

pub type WitnessKeyPair = Ed25519KeyPair;
pub type WitnessPublicKey = Ed25519PublicKey;
pub type WitnessSignature = Ed25519Signature;

/// The only key type accepted for the witness signing key.
pub const SIGNING_KEY_TYPE: &str = "ed25519";

/// Decode a 32-byte hex seed into a signing keypair.
pub fn keypair_from_seed_hex(seed_hex: &str) -> WitnessResult<WitnessKeyPair> {
    let bytes = hex::decode(seed_hex.trim_start_matches("0x"))
        .map_err(|e| WitnessError::SigningKey(format!("signing key is not valid hex: {e}")))?;
    WitnessKeyPair::from_bytes(&bytes)
        .map_err(|e| WitnessError::SigningKey(format!("invalid {SIGNING_KEY_TYPE} seed: {e}")))
}

/// Sign a canonical attestation message. Ed25519 signing is deterministic:
/// the same key and message always produce the same bytes.
pub fn sign(keypair: &WitnessKeyPair, message: &[u8]) -> Vec<u8> {
    keypair.sign(message).as_bytes().to_vec()
}

/// Verify a stored signature against a reconstructed canonical message.
/// Undecodable keys or signatures verify as false rather than erroring.
pub fn verify(public_key: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(pk) = WitnessPublicKey::from_bytes(public_key) else {
        return false;
    };
    let Ok(sig) = WitnessSignature::from_bytes(signature) else {
        return false;
    };
    pk.verify(message, &sig).is_ok()
}

/// Account controlled by the witness signing key. Used as the submitting
/// account for attestation batches: the tail of the keccak digest of the
/// public key.
pub fn account_from_public_key(public_key: &WitnessPublicKey) -> AccountId {
    let digest = Keccak256::digest(public_key.as_bytes()).digest;
    let mut id = [0u8; 20];
    id.copy_from_slice(&digest[12..]);
    AccountId(id)
}

pub fn public_key_bytes(keypair: &WitnessKeyPair) -> Vec<u8> {
    keypair.public().as_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_SEED: &str =
        "e42c82337ce12d4a7ad6cd65876d91b2ab6594fd50cdab1737c91773ba7451db";

    #[test]
    fn sign_and_verify_round_trip() {
        let kp = keypair_from_seed_hex(TEST_SEED).unwrap();
        let msg = b"attest this";
        let sig = sign(&kp, msg);
        assert!(verify(&public_key_bytes(&kp), msg, &sig));
        assert!(!verify(&public_key_bytes(&kp), b"attest that", &sig));
    }

    #[test]
    fn signing_is_deterministic() {
        let kp = keypair_from_seed_hex(TEST_SEED).unwrap();
        let msg = b"same message";
        assert_eq!(sign(&kp, msg), sign(&kp, msg));

        // A different key must not reproduce the signature
        let other = keypair_from_seed_hex(
            "1aacd610da3d0cc691a04b83b01c34c6c65cda0fe8d502df25ff4b3185c85687",
        )
        .unwrap();
        assert_ne!(sign(&kp, msg), sign(&other, msg));
    }

    #[test]
    fn tampered_signature_rejected() {
        let kp = keypair_from_seed_hex(TEST_SEED).unwrap();
        let msg = b"payload";
        let mut sig = sign(&kp, msg);
        sig[0] ^= 0x01;
        assert!(!verify(&public_key_bytes(&kp), msg, &sig));
    }

    #[test]
    fn garbage_inputs_verify_false() {
        let kp = keypair_from_seed_hex(TEST_SEED).unwrap();
        let sig = sign(&kp, b"m");
        assert!(!verify(b"not a key", b"m", &sig));
        assert!(!verify(&public_key_bytes(&kp), b"m", b"not a signature"));
    }

    #[test]
    fn submit_account_is_stable_per_key() {
        let kp = keypair_from_seed_hex(TEST_SEED).unwrap();
        let a = account_from_public_key(kp.public());
        let b = account_from_public_key(kp.public());
        assert_eq!(a, b);

        let other = keypair_from_seed_hex(
            "53e7baf8378fbc62692e3056c2e10c6666ef8b5b3a53914830f47636d1678140",
        )
        .unwrap();
        assert_ne!(a, account_from_public_key(other.public()));
    }

    #[test]
    fn bad_seed_rejected() {
        assert!(keypair_from_seed_hex("zz").is_err());
        assert!(keypair_from_seed_hex("abcd").is_err());
    }
}
