//! # Client-Side Signing
//!
//! Produces the signature and auth headers a client attaches to a request.

use crate::domain::ecdsa::{private_key_to_address, sign};
use crate::domain::entities::{Address, RecoverableSignature};
use crate::domain::errors::{EncodingError, SignatureError};
use crate::domain::signing_string::{build_signing_string, RequestBody};
use crate::verifier::{AuthField, HeaderScheme};
use k256::ecdsa::SigningKey;
use thiserror::Error;

/// Errors signing a request.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignRequestError {
    #[error(transparent)]
    Body(#[from] EncodingError),

    #[error(transparent)]
    Signature(#[from] SignatureError),
}

/// Sign the canonical string for a request.
pub fn sign_request(
    private_key: &SigningKey,
    method: &str,
    path: &str,
    timestamp: i64,
    body: RequestBody<'_>,
) -> Result<RecoverableSignature, SignRequestError> {
    let message = build_signing_string(method, path, timestamp, body)?;
    Ok(sign(private_key, &message)?)
}

/// The three auth values for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub address: Address,
    pub signature: RecoverableSignature,
    pub timestamp: i64,
}

impl SignedHeaders {
    /// Sign a request and collect its auth values.
    pub fn new(
        private_key: &SigningKey,
        method: &str,
        path: &str,
        timestamp: i64,
        body: RequestBody<'_>,
    ) -> Result<Self, SignRequestError> {
        Ok(Self {
            address: private_key_to_address(private_key),
            signature: sign_request(private_key, method, path, timestamp, body)?,
            timestamp,
        })
    }

    fn value(&self, field: AuthField) -> String {
        match field {
            AuthField::IdAddress => self.address.to_string(),
            AuthField::Signature => self.signature.to_string(),
            AuthField::Timestamp => self.timestamp.to_string(),
        }
    }

    /// `(header name, value)` pairs under the given prefix.
    pub fn iter(&self, prefix: &str) -> impl Iterator<Item = (String, String)> + '_ {
        let scheme = HeaderScheme::new(prefix);
        AuthField::ALL
            .into_iter()
            .map(move |field| (scheme.header_name(field), self.value(field)))
    }

    /// `(query arg name, value)` pairs under the given prefix, for
    /// transports that cannot set headers (e.g. browser WebSockets).
    pub fn query_args(&self, prefix: &str) -> impl Iterator<Item = (String, String)> + '_ {
        let scheme = HeaderScheme::new(prefix);
        AuthField::ALL
            .into_iter()
            .map(move |field| (scheme.query_name(field), self.value(field)))
    }
}
