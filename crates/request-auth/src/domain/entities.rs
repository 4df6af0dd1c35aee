//! # Domain Entities
//!
//! Addresses and recoverable signatures.

use super::encoding::{checksum_encode_address, data_decoder, data_encoder, validate_address};
use super::errors::EncodingError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use subtle::ConstantTimeEq;

/// Ethereum-style address (last 20 bytes of keccak256(pubkey)).
///
/// Displays as `0x`-prefixed lowercase hex. Parsing accepts any case, so
/// checksum-cased and lower-cased forms of the same address compare equal.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address([u8; 20]);

impl Address {
    /// Wrap raw address bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// EIP-55 checksum-cased form.
    #[must_use]
    pub fn to_checksum(&self) -> String {
        checksum_encode_address(&self.0)
    }

    /// Compare in constant time.
    #[must_use]
    pub fn ct_matches(&self, other: &Address) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

impl FromStr for Address {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if !validate_address(s) {
            return Err(EncodingError::InvalidAddress(s.to_string()));
        }
        let bytes = data_decoder(s)?;
        let bytes: [u8; 20] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| EncodingError::InvalidLength {
                expected: 20,
                actual: bytes.len(),
            })?;
        Ok(Self(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&data_encoder(&self.0, None))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({self})")
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// 65-byte recoverable ECDSA signature: `r ‖ s ‖ v`.
///
/// `v` is the recovery id, 0 or 1 (27 and 28 are accepted when recovering).
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct RecoverableSignature([u8; 65]);

impl RecoverableSignature {
    /// Signature length in bytes.
    pub const LENGTH: usize = 65;

    /// Wrap raw signature bytes.
    #[must_use]
    pub const fn new(bytes: [u8; 65]) -> Self {
        Self(bytes)
    }

    /// Build from a slice; fails unless it is exactly 65 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, EncodingError> {
        let bytes: [u8; 65] = bytes.try_into().map_err(|_| EncodingError::InvalidLength {
            expected: Self::LENGTH,
            actual: bytes.len(),
        })?;
        Ok(Self(bytes))
    }

    /// Raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 65] {
        &self.0
    }

    /// Recovery id byte.
    #[must_use]
    pub const fn v(&self) -> u8 {
        self.0[64]
    }
}

impl FromStr for RecoverableSignature {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_slice(&data_decoder(s)?)
    }
}

impl fmt::Display for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&data_encoder(&self.0, None))
    }
}

impl fmt::Debug for RecoverableSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecoverableSignature({self})")
    }
}
