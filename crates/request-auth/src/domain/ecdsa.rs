//! # ECDSA Signatures (secp256k1)
//!
//! Recoverable signatures over keccak256 digests, Ethereum style.
//!
//! ## Security Notes
//!
//! - Signing uses RFC 6979 deterministic nonces and always emits low-S
//! - Decoded private key bytes are zeroized after parsing
//! - Address comparison is constant-time
//! - Uses k256 crate for cryptographic operations

use super::entities::{Address, RecoverableSignature};
use super::errors::SignatureError;
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};
use zeroize::Zeroize;

/// 32-byte digest.
pub type Hash = [u8; 32];

// =============================================================================
// HASHING AND KEYS
// =============================================================================

/// Keccak256 hash function.
pub fn keccak256(data: &[u8]) -> Hash {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Derive Ethereum address from public key.
pub fn address_from_pubkey(public_key: &VerifyingKey) -> Address {
    let pubkey_bytes = public_key.to_encoded_point(false);
    let pubkey_slice = pubkey_bytes.as_bytes();

    // Keccak256 hash of public key (without 0x04 prefix)
    let hash = keccak256(&pubkey_slice[1..]);

    // Take last 20 bytes as address
    let mut address = [0u8; 20];
    address.copy_from_slice(&hash[12..]);
    Address::new(address)
}

/// Parse a hex-encoded private key (`0x` prefix optional).
pub fn signing_key_from_hex(private_key: &str) -> Result<SigningKey, SignatureError> {
    let digits = private_key
        .strip_prefix("0x")
        .or_else(|| private_key.strip_prefix("0X"))
        .unwrap_or(private_key);

    let mut bytes = hex::decode(digits).map_err(|_| SignatureError::InvalidPrivateKey)?;
    let key = SigningKey::from_slice(&bytes).map_err(|_| SignatureError::InvalidPrivateKey);
    bytes.zeroize();
    key
}

/// Address controlled by a private key.
pub fn private_key_to_address(private_key: &SigningKey) -> Address {
    address_from_pubkey(private_key.verifying_key())
}

// =============================================================================
// SIGN / RECOVER
// =============================================================================

/// Sign `keccak256(message)`, returning `r ‖ s ‖ v` with `v` in {0, 1}.
pub fn sign(
    private_key: &SigningKey,
    message: &[u8],
) -> Result<RecoverableSignature, SignatureError> {
    let digest = keccak256(message);
    let (sig, recid) = private_key
        .sign_prehash_recoverable(&digest)
        .map_err(|_| SignatureError::SigningFailed)?;

    let mut bytes = [0u8; 65];
    bytes[..64].copy_from_slice(&sig.to_bytes());
    bytes[64] = recid.to_byte();
    Ok(RecoverableSignature::new(bytes))
}

/// Recover the signer of `keccak256(message)`.
///
/// Extra bytes past the first 65 are ignored.
pub fn try_recover_address(message: &[u8], signature: &[u8]) -> Result<Address, SignatureError> {
    if signature.len() < RecoverableSignature::LENGTH {
        return Err(SignatureError::InvalidFormat);
    }

    let recovery_id = parse_recovery_id(signature[64])?;
    let sig = Signature::from_slice(&signature[..64]).map_err(|_| SignatureError::InvalidFormat)?;

    let digest = keccak256(message);
    let recovered_key = VerifyingKey::recover_from_prehash(&digest, &sig, recovery_id)
        .map_err(|_| SignatureError::RecoveryFailed)?;

    Ok(address_from_pubkey(&recovered_key))
}

/// Recover the signer of `keccak256(message)`, or `None` if the signature is
/// shorter than 65 bytes or cannot be recovered.
pub fn recover_address(message: &[u8], signature: &[u8]) -> Option<Address> {
    try_recover_address(message, signature).ok()
}

/// Whether `signature` over `message` recovers to `expected`.
pub fn recover_and_compare(message: &[u8], signature: &[u8], expected: &Address) -> bool {
    recover_address(message, signature).is_some_and(|recovered| recovered.ct_matches(expected))
}

/// Identity of a signature independent of how it was spelled on the wire:
/// `r ‖ s` with `s` normalized to the lower half of the curve order.
///
/// `v` is not part of it; 0/1 and 27/28 map to the same bytes.
pub fn signature_fingerprint(signature: &[u8]) -> Result<[u8; 64], SignatureError> {
    if signature.len() < RecoverableSignature::LENGTH {
        return Err(SignatureError::InvalidFormat);
    }

    let sig = Signature::from_slice(&signature[..64]).map_err(|_| SignatureError::InvalidFormat)?;
    let sig = sig.normalize_s().unwrap_or(sig);

    let mut fingerprint = [0u8; 64];
    fingerprint.copy_from_slice(&sig.to_bytes());
    Ok(fingerprint)
}

/// Parse recovery ID from v value.
///
/// Accepts both raw (0/1) and Ethereum-offset (27/28) values.
fn parse_recovery_id(v: u8) -> Result<RecoveryId, SignatureError> {
    let id = match v {
        0 | 27 => 0,
        1 | 28 => 1,
        _ => return Err(SignatureError::InvalidRecoveryId(v)),
    };

    RecoveryId::from_byte(id).ok_or(SignatureError::InvalidRecoveryId(v))
}
