//! # Canonical Signing String
//!
//! The exact bytes a client signs and a server rebuilds:
//!
//! ```text
//! {VERB}\n{PATH}\n{TIMESTAMP}\n{BASE64(KECCAK256(BODY))}
//! ```
//!
//! The hash is empty when there is no body. Raw and text bodies are hashed as
//! transmitted. JSON bodies are serialized first with [`CanonicalJsonFormatter`]
//! (`", "` and `": "` separators, non-ASCII as `\uXXXX`) so that every client
//! library produces identical bytes.

use super::ecdsa::keccak256;
use super::errors::EncodingError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::Serialize;
use serde_json::ser::Formatter;
use std::io;

/// A request body as it enters the signing string.
#[derive(Debug, Clone, Copy)]
pub enum RequestBody<'a> {
    /// No body.
    Empty,
    /// Bytes exactly as sent on the wire.
    Raw(&'a [u8]),
    /// Text, hashed as UTF-8.
    Text(&'a str),
    /// A JSON value, serialized before hashing.
    Json(&'a serde_json::Value),
}

impl<'a> From<&'a [u8]> for RequestBody<'a> {
    fn from(bytes: &'a [u8]) -> Self {
        Self::Raw(bytes)
    }
}

impl<'a> From<&'a str> for RequestBody<'a> {
    fn from(text: &'a str) -> Self {
        Self::Text(text)
    }
}

impl<'a> From<&'a serde_json::Value> for RequestBody<'a> {
    fn from(value: &'a serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// Base64 keccak256 of the body, or an empty string when there is none.
pub fn body_hash(body: RequestBody<'_>) -> Result<String, EncodingError> {
    let bytes: Vec<u8> = match body {
        RequestBody::Empty => return Ok(String::new()),
        RequestBody::Raw(bytes) => bytes.to_vec(),
        RequestBody::Text(text) => text.as_bytes().to_vec(),
        RequestBody::Json(value) => to_canonical_json(value)?,
    };

    if bytes.is_empty() {
        return Ok(String::new());
    }
    Ok(STANDARD.encode(keccak256(&bytes)))
}

/// Build the canonical signing string.
///
/// The method is upper-cased; the path is used verbatim and must be the path
/// the server observes (no scheme, host or query string).
pub fn build_signing_string(
    method: &str,
    path: &str,
    timestamp: i64,
    body: RequestBody<'_>,
) -> Result<Vec<u8>, EncodingError> {
    let hash = body_hash(body)?;
    Ok(format!(
        "{}\n{}\n{}\n{}",
        method.to_uppercase(),
        path,
        timestamp,
        hash
    )
    .into_bytes())
}

/// Serialize a JSON value with `", "` and `": "` separators and non-ASCII
/// characters escaped as `\uXXXX`.
pub fn to_canonical_json<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, EncodingError> {
    let mut out = Vec::new();
    let mut serializer = serde_json::Serializer::with_formatter(&mut out, CanonicalJsonFormatter);
    value
        .serialize(&mut serializer)
        .map_err(|e| EncodingError::Json(e.to_string()))?;
    Ok(out)
}

/// `serde_json` formatter with spaced separators and ASCII-only output.
#[derive(Debug, Clone, Copy, Default)]
pub struct CanonicalJsonFormatter;

impl Formatter for CanonicalJsonFormatter {
    fn begin_array_value<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        first: bool,
    ) -> io::Result<()> {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W: ?Sized + io::Write>(&mut self, writer: &mut W) -> io::Result<()> {
        writer.write_all(b": ")
    }

    fn write_string_fragment<W: ?Sized + io::Write>(
        &mut self,
        writer: &mut W,
        fragment: &str,
    ) -> io::Result<()> {
        let mut start = 0;
        for (i, c) in fragment.char_indices() {
            if c.is_ascii() {
                continue;
            }
            writer.write_all(&fragment.as_bytes()[start..i])?;
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                write!(writer, "\\u{unit:04x}")?;
            }
            start = i + c.len_utf8();
        }
        writer.write_all(&fragment.as_bytes()[start..])
    }
}
