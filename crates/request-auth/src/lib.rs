//! # Request Auth - Signed Request Authentication
//!
//! Authenticates HTTP and WebSocket requests by a recoverable secp256k1
//! signature over a canonical request string. The client proves control of
//! an address without ever sending a public key.
//!
//! ## Architecture
//!
//! - **Domain Layer** (`domain/`): keccak256, sign/recover, hex helpers and
//!   the canonical signing string
//! - **Verifier** (`verifier.rs`): reads auth fields from a request and
//!   checks signer and timestamp
//! - **Client** (`client.rs`): signs outgoing requests
//!
//! ## Security Notes
//!
//! - Freshness is enforced by a symmetric timestamp window (default 180s)
//! - Within the window a captured request can be replayed unless
//!   `reject_replays` is enabled
//! - The body is hashed exactly as received, never re-serialized

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod client;
pub mod domain;
pub mod replay;
pub mod verifier;

// Re-export public API
pub use client::{sign_request, SignRequestError, SignedHeaders};
pub use domain::ecdsa::{
    address_from_pubkey, keccak256, private_key_to_address, recover_address, recover_and_compare,
    sign, signature_fingerprint, signing_key_from_hex, try_recover_address,
};
pub use domain::encoding::{
    checksum_encode_address, checksum_validate_address, data_decoder, data_encoder, parse_int,
    validate_address, validate_decimal_string, validate_hex_string, validate_int_string,
    validate_signature,
};
pub use domain::entities::{Address, RecoverableSignature};
pub use domain::errors::{AuthError, EncodingError, SignatureError};
pub use domain::signing_string::{
    body_hash, build_signing_string, to_canonical_json, CanonicalJsonFormatter, RequestBody,
};
pub use k256::ecdsa::SigningKey;
pub use replay::ReplayGuard;
pub use verifier::{
    unix_now, AuthField, HeaderScheme, MapSource, RequestSource, RequestVerifier, VerifierConfig,
    DEFAULT_TIMESTAMP_EXPIRY,
};
