//! # Authentication Errors
//!
//! Error types for encoding, signature and request verification failures.

use thiserror::Error;

/// Errors decoding hex strings and addresses.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncodingError {
    /// The input contained non-hex characters.
    #[error("invalid hex data: {0}")]
    InvalidHex(String),

    /// The decoded data had the wrong length.
    #[error("expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// The input does not look like a `0x`-prefixed address.
    #[error("invalid address: {0:?}")]
    InvalidAddress(String),

    /// A JSON body could not be serialized for hashing.
    #[error("cannot serialize body: {0}")]
    Json(String),
}

/// Errors producing or recovering signatures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignatureError {
    /// Signature is shorter than 65 bytes or has out-of-range scalars.
    #[error("Invalid signature format")]
    InvalidFormat,

    /// Invalid recovery ID (v must be 0, 1, 27, or 28)
    #[error("Invalid recovery ID: {0}")]
    InvalidRecoveryId(u8),

    /// Failed to recover public key from signature
    #[error("Failed to recover public key")]
    RecoveryFailed,

    /// The private key bytes are not a valid secp256k1 scalar.
    #[error("Invalid private key")]
    InvalidPrivateKey,

    /// Signing itself failed.
    #[error("Signing failed")]
    SigningFailed,
}

/// Reasons a signed request is rejected.
///
/// Every variant maps to an HTTP 400 with an `{"errors": [{id, message}]}`
/// body; [`AuthError::id`] gives the error id and `Display` gives the message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    /// One of the three auth fields is absent from headers and query args.
    #[error("Missing {0}")]
    MissingArgument(String),

    /// Some, but not all, auth headers are present.
    #[error("Missing headers required for authentication")]
    PartialAuthHeaders,

    /// The timestamp is not an integer.
    #[error("Given {0} is invalid")]
    InvalidTimestamp(String),

    /// The address is not `0x` + 40 hex characters.
    #[error("Invalid {0}")]
    InvalidAddress(String),

    /// Malformed signature, or it does not recover to the claimed address.
    #[error("Invalid {0}")]
    InvalidSignature(String),

    /// The timestamp is outside the accepted window.
    #[error("The difference between the timestamp and the current time is too large")]
    TimestampExpired,

    /// The exact signature was already accepted inside the window.
    #[error("The given signature has already been used")]
    ReplayedRequest,

    /// The body could not be hashed.
    #[error("Cannot hash request body")]
    Body(#[from] EncodingError),
}

impl AuthError {
    /// Error id reported to clients.
    #[must_use]
    pub fn id(&self) -> &'static str {
        match self {
            Self::MissingArgument(_) | Self::PartialAuthHeaders | Self::Body(_) => "bad_arguments",
            Self::InvalidTimestamp(_) | Self::TimestampExpired => "invalid_timestamp",
            Self::InvalidAddress(_) => "invalid_id_address",
            Self::InvalidSignature(_) | Self::ReplayedRequest => "invalid_signature",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_ids() {
        assert_eq!(
            AuthError::MissingArgument("Dgas-ID-Address".into()).id(),
            "bad_arguments"
        );
        assert_eq!(AuthError::PartialAuthHeaders.id(), "bad_arguments");
        assert_eq!(
            AuthError::InvalidTimestamp("Dgas-Timestamp".into()).id(),
            "invalid_timestamp"
        );
        assert_eq!(AuthError::TimestampExpired.id(), "invalid_timestamp");
        assert_eq!(
            AuthError::InvalidAddress("Dgas-ID-Address".into()).id(),
            "invalid_id_address"
        );
        assert_eq!(
            AuthError::InvalidSignature("Dgas-Signature".into()).id(),
            "invalid_signature"
        );
    }

    #[test]
    fn test_auth_error_messages() {
        assert_eq!(
            AuthError::MissingArgument("Dgas-Signature".into()).to_string(),
            "Missing Dgas-Signature"
        );
        assert_eq!(
            AuthError::InvalidTimestamp("Dgas-Timestamp".into()).to_string(),
            "Given Dgas-Timestamp is invalid"
        );
        assert_eq!(
            AuthError::InvalidAddress("Dgas-ID-Address".into()).to_string(),
            "Invalid Dgas-ID-Address"
        );
    }
}
