//! # Hex and Integer Encoding Helpers
//!
//! String-level validation and conversion used when reading auth fields off
//! a request. All validators are shape checks only; they never decode.

use super::ecdsa::keccak256;
use super::errors::EncodingError;

fn strip_hex_prefix(value: &str) -> Option<&str> {
    value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
}

fn is_hex_digits(value: &str) -> bool {
    !value.is_empty() && value.bytes().all(|b| b.is_ascii_hexdigit())
}

fn is_plain_integer(value: &str) -> bool {
    let digits = value.strip_prefix('-').unwrap_or(value);
    match digits.as_bytes() {
        [b'0'] => true,
        [first, rest @ ..] => {
            (b'1'..=b'9').contains(first) && rest.iter().all(u8::is_ascii_digit)
        }
        [] => false,
    }
}

/// `0x`-prefixed, non-empty hex string.
///
/// Hex strings must carry the prefix so numbers encoded as strings are never
/// ambiguous.
#[must_use]
pub fn validate_hex_string(value: &str) -> bool {
    strip_hex_prefix(value).is_some_and(is_hex_digits)
}

/// `0x` followed by exactly 40 hex characters.
#[must_use]
pub fn validate_address(value: &str) -> bool {
    strip_hex_prefix(value).is_some_and(|digits| digits.len() == 40 && is_hex_digits(digits))
}

/// `0x` followed by 130 hex characters (a 65-byte signature).
#[must_use]
pub fn validate_signature(value: &str) -> bool {
    validate_hex_string(value) && value.len() == 132
}

/// Decimal integer without leading zeros, optionally negative.
#[must_use]
pub fn validate_int_string(value: &str) -> bool {
    is_plain_integer(value)
}

/// Decimal number with a fractional part, e.g. `-12.5`.
#[must_use]
pub fn validate_decimal_string(value: &str) -> bool {
    match value.split_once('.') {
        Some((whole, fraction)) => {
            is_plain_integer(whole)
                && !fraction.is_empty()
                && fraction.bytes().all(|b| b.is_ascii_digit())
        }
        None => false,
    }
}

/// Lenient integer parsing for values that arrive as strings.
///
/// Accepts `0x` hex, plain decimal integers and decimal fractions (truncated
/// towards zero). Returns `None` for anything else, including decimal
/// integers with leading zeros and values that overflow `i64`.
#[must_use]
pub fn parse_int(value: &str) -> Option<i64> {
    if validate_hex_string(value) {
        return strip_hex_prefix(value).and_then(|digits| i64::from_str_radix(digits, 16).ok());
    }
    if validate_int_string(value) {
        return value.parse().ok();
    }
    if validate_decimal_string(value) {
        let (whole, _) = value.split_once('.')?;
        let truncated: i64 = whole.parse().ok()?;
        // "-0.5" truncates to 0, same as the whole part
        return Some(truncated);
    }
    None
}

/// Decode hex data. The `0x` prefix is optional and odd-length input is
/// left-padded with a zero nibble.
pub fn data_decoder(data: &str) -> Result<Vec<u8>, EncodingError> {
    let digits = strip_hex_prefix(data).unwrap_or(data);

    let decoded = if digits.len() % 2 == 0 {
        hex::decode(digits)
    } else {
        hex::decode(format!("0{digits}"))
    };

    decoded.map_err(|e| EncodingError::InvalidHex(e.to_string()))
}

/// Encode bytes as `0x`-prefixed lowercase hex, left-padded with zeros to
/// `length` bytes when given.
#[must_use]
pub fn data_encoder(data: &[u8], length: Option<usize>) -> String {
    let digits = hex::encode(data);
    match length {
        Some(length) => format!("0x{digits:0>width$}", width = length * 2),
        None => format!("0x{digits}"),
    }
}

/// EIP-55 mixed-case checksum encoding of a 20-byte address.
#[must_use]
pub fn checksum_encode_address(address: &[u8; 20]) -> String {
    let lower = hex::encode(address);
    let hash = keccak256(lower.as_bytes());

    let mut encoded = String::with_capacity(42);
    encoded.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = if i % 2 == 0 {
            hash[i / 2] >> 4
        } else {
            hash[i / 2] & 0x0f
        };
        if nibble >= 8 {
            encoded.push(c.to_ascii_uppercase());
        } else {
            encoded.push(c);
        }
    }
    encoded
}

/// Whether `address` is exactly its own EIP-55 checksum encoding.
pub fn checksum_validate_address(address: &str) -> Result<bool, EncodingError> {
    let bytes = data_decoder(address)?;
    let bytes: [u8; 20] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| EncodingError::InvalidLength {
            expected: 20,
            actual: bytes.len(),
        })?;

    Ok(checksum_encode_address(&bytes) == address)
}
