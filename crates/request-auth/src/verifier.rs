//! # Request Verifier
//!
//! Stateless, single-pass verification of a signed request.
//!
//! ## Verification order
//!
//! 1. Extract address, signature and timestamp (headers before query args,
//!    canonical scheme before legacy schemes)
//! 2. Parse the timestamp
//! 3. Shape-check the address and the signature
//! 4. Rebuild the signing string over the raw body and recover the signer
//! 5. Check the timestamp window
//! 6. Optionally reject a replayed signature

use crate::domain::ecdsa::{recover_and_compare, signature_fingerprint};
use crate::domain::encoding::{data_decoder, parse_int, validate_address, validate_signature};
use crate::domain::entities::Address;
use crate::domain::errors::AuthError;
use crate::domain::signing_string::{build_signing_string, RequestBody};
use crate::replay::ReplayGuard;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Default accepted clock difference in seconds.
pub const DEFAULT_TIMESTAMP_EXPIRY: u64 = 180;

/// Where auth fields are read from.
///
/// Header lookups must be case-insensitive, as HTTP header names are.
pub trait RequestSource {
    /// Header value, if present.
    fn header(&self, name: &str) -> Option<&str>;

    /// Query argument value, if present.
    fn query_arg(&self, name: &str) -> Option<&str>;
}

/// The three auth fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthField {
    IdAddress,
    Signature,
    Timestamp,
}

impl AuthField {
    /// All fields, in extraction order.
    pub const ALL: [AuthField; 3] = [Self::IdAddress, Self::Signature, Self::Timestamp];

    fn header_suffix(self) -> &'static str {
        match self {
            Self::IdAddress => "ID-Address",
            Self::Signature => "Signature",
            Self::Timestamp => "Timestamp",
        }
    }

    fn query_suffix(self) -> &'static str {
        match self {
            Self::IdAddress => "IdAddress",
            Self::Signature => "Signature",
            Self::Timestamp => "Timestamp",
        }
    }
}

/// A header naming scheme derived from a prefix.
///
/// Prefix `Dgas` gives `Dgas-ID-Address` / `dgasIdAddress`, and so on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderScheme {
    prefix: String,
    query_prefix: String,
}

impl HeaderScheme {
    /// Scheme for a prefix.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let query_prefix = prefix.to_ascii_lowercase();
        Self {
            prefix,
            query_prefix,
        }
    }

    /// Header name for a field.
    #[must_use]
    pub fn header_name(&self, field: AuthField) -> String {
        format!("{}-{}", self.prefix, field.header_suffix())
    }

    /// Query argument name for a field.
    #[must_use]
    pub fn query_name(&self, field: AuthField) -> String {
        format!("{}{}", self.query_prefix, field.query_suffix())
    }

    fn lookup<'a, S: RequestSource + ?Sized>(
        &self,
        source: &'a S,
        field: AuthField,
    ) -> Option<&'a str> {
        source
            .header(&self.header_name(field))
            .or_else(|| source.query_arg(&self.query_name(field)).filter(|v| !v.is_empty()))
    }

    fn present_count<S: RequestSource + ?Sized>(&self, source: &S) -> usize {
        AuthField::ALL
            .iter()
            .filter(|field| self.lookup(source, **field).is_some())
            .count()
    }
}

/// Verifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Maximum accepted `|now - timestamp|` in seconds.
    pub timestamp_expiry: u64,
    /// Canonical header prefix.
    pub header_prefix: String,
    /// Deprecated prefixes still accepted as aliases.
    pub legacy_prefixes: Vec<String>,
    /// Reject a signature seen before within the window.
    pub reject_replays: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            timestamp_expiry: DEFAULT_TIMESTAMP_EXPIRY,
            header_prefix: "Dgas".to_string(),
            legacy_prefixes: vec!["Token".to_string()],
            reject_replays: false,
        }
    }
}

/// Verifies signed requests.
pub struct RequestVerifier {
    canonical: HeaderScheme,
    legacy: Vec<HeaderScheme>,
    timestamp_expiry: u64,
    replay_guard: Option<ReplayGuard>,
}

impl RequestVerifier {
    /// Build a verifier from configuration.
    #[must_use]
    pub fn new(config: &VerifierConfig) -> Self {
        Self {
            canonical: HeaderScheme::new(config.header_prefix.as_str()),
            legacy: config
                .legacy_prefixes
                .iter()
                .map(|prefix| HeaderScheme::new(prefix.as_str()))
                .collect(),
            timestamp_expiry: config.timestamp_expiry,
            replay_guard: config
                .reject_replays
                .then(|| ReplayGuard::new(config.timestamp_expiry)),
        }
    }

    /// The canonical scheme, used in error messages.
    #[must_use]
    pub fn canonical_scheme(&self) -> &HeaderScheme {
        &self.canonical
    }

    fn schemes(&self) -> impl Iterator<Item = &HeaderScheme> {
        std::iter::once(&self.canonical).chain(self.legacy.iter())
    }

    /// Accepted clock difference in seconds.
    #[must_use]
    pub fn timestamp_expiry(&self) -> u64 {
        self.timestamp_expiry
    }

    fn extract<'a, S: RequestSource + ?Sized>(
        &self,
        source: &'a S,
        field: AuthField,
    ) -> Result<&'a str, AuthError> {
        self.schemes()
            .find_map(|scheme| scheme.lookup(source, field))
            .ok_or_else(|| AuthError::MissingArgument(self.canonical_scheme().header_name(field)))
    }

    /// Verify a request and return the signer's address.
    ///
    /// `body` must be the raw bytes as received; they are hashed as-is.
    pub fn verify_request<S: RequestSource + ?Sized>(
        &self,
        source: &S,
        method: &str,
        path: &str,
        body: &[u8],
        now: i64,
    ) -> Result<Address, AuthError> {
        let canonical = self.canonical_scheme();

        let address = self.extract(source, AuthField::IdAddress)?;
        let signature = self.extract(source, AuthField::Signature)?;
        let timestamp = self.extract(source, AuthField::Timestamp)?;

        let timestamp = parse_int(timestamp).ok_or_else(|| {
            AuthError::InvalidTimestamp(canonical.header_name(AuthField::Timestamp))
        })?;

        let invalid_address =
            || AuthError::InvalidAddress(canonical.header_name(AuthField::IdAddress));
        let invalid_signature =
            || AuthError::InvalidSignature(canonical.header_name(AuthField::Signature));

        if !validate_address(address) {
            return Err(invalid_address());
        }
        let expected: Address = address.parse().map_err(|_| invalid_address())?;

        if !validate_signature(signature) {
            return Err(invalid_signature());
        }
        let signature = data_decoder(signature).map_err(|_| invalid_signature())?;

        let message = build_signing_string(method, path, timestamp, RequestBody::Raw(body))?;

        if !recover_and_compare(&message, &signature, &expected) {
            debug!(address = %expected, path, "Signature does not recover to claimed address");
            return Err(invalid_signature());
        }

        if now.abs_diff(timestamp) > self.timestamp_expiry {
            return Err(AuthError::TimestampExpired);
        }

        if let Some(guard) = &self.replay_guard {
            let fingerprint = signature_fingerprint(&signature).map_err(|_| invalid_signature())?;
            if !guard.check_and_record(&fingerprint, timestamp, now) {
                return Err(AuthError::ReplayedRequest);
            }
        }

        Ok(expected)
    }

    /// [`Self::verify_request`] against the system clock.
    pub fn verify_request_now<S: RequestSource + ?Sized>(
        &self,
        source: &S,
        method: &str,
        path: &str,
        body: &[u8],
    ) -> Result<Address, AuthError> {
        self.verify_request(source, method, path, body, unix_now())
    }

    /// Whether the request carries a complete set of auth fields.
    ///
    /// Returns `true` if any scheme has all three fields and `false` if no
    /// field is present at all. A partial set is an error when
    /// `raise_if_partial` is set, `false` otherwise.
    pub fn is_request_signed<S: RequestSource + ?Sized>(
        &self,
        source: &S,
        raise_if_partial: bool,
    ) -> Result<bool, AuthError> {
        let counts: Vec<usize> = self
            .schemes()
            .map(|scheme| scheme.present_count(source))
            .collect();

        if counts.iter().any(|&count| count == AuthField::ALL.len()) {
            return Ok(true);
        }
        if counts.iter().all(|&count| count == 0) {
            return Ok(false);
        }
        if raise_if_partial {
            return Err(AuthError::PartialAuthHeaders);
        }
        Ok(false)
    }
}

impl Default for RequestVerifier {
    fn default() -> Self {
        Self::new(&VerifierConfig::default())
    }
}

/// Current unix time in seconds.
#[must_use]
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// In-memory [`RequestSource`] with case-insensitive headers.
#[derive(Debug, Clone, Default)]
pub struct MapSource {
    headers: HashMap<String, String>,
    query: HashMap<String, String>,
}

impl MapSource {
    /// Empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Add a query argument.
    #[must_use]
    pub fn with_query_arg(mut self, name: &str, value: impl Into<String>) -> Self {
        self.query.insert(name.to_string(), value.into());
        self
    }
}

impl RequestSource for MapSource {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    fn query_arg(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::client::SignedHeaders;
    use crate::domain::ecdsa::private_key_to_address;
    use k256::ecdsa::SigningKey;
    use proptest::prelude::*;

    fn arb_key() -> impl Strategy<Value = SigningKey> {
        any::<[u8; 32]>().prop_filter_map("scalar out of range", |bytes| {
            SigningKey::from_slice(&bytes).ok()
        })
    }

    fn arb_method() -> impl Strategy<Value = &'static str> {
        prop::sample::select(vec!["GET", "POST", "PUT", "DELETE", "PATCH"])
    }

    fn source_for(headers: &SignedHeaders) -> MapSource {
        headers
            .iter("Dgas")
            .fold(MapSource::new(), |source, (name, value)| {
                source.with_header(&name, value)
            })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn proptest_signed_request_verifies(
            key in arb_key(),
            method in arb_method(),
            path in "/[a-z0-9/]{0,24}",
            timestamp in 0i64..4_000_000_000,
            body in prop::collection::vec(any::<u8>(), 0..128),
        ) {
            let headers = SignedHeaders::new(&key, method, &path, timestamp, RequestBody::Raw(&body))
                .expect("sign");
            let verifier = RequestVerifier::default();

            let address = verifier
                .verify_request(&source_for(&headers), method, &path, &body, timestamp)
                .expect("verify");
            prop_assert_eq!(address, private_key_to_address(&key));
        }

        #[test]
        fn proptest_tampered_body_rejected(
            key in arb_key(),
            body in prop::collection::vec(any::<u8>(), 1..128),
            index in any::<prop::sample::Index>(),
            flip in 1u8..=255,
        ) {
            let headers = SignedHeaders::new(&key, "POST", "/v1/x", 1000, RequestBody::Raw(&body))
                .expect("sign");
            let mut tampered = body.clone();
            let i = index.index(tampered.len());
            tampered[i] ^= flip;

            let result = RequestVerifier::default()
                .verify_request(&source_for(&headers), "POST", "/v1/x", &tampered, 1000);
            prop_assert_eq!(result.map_err(|e| e.id()), Err("invalid_signature"));
        }

        #[test]
        fn proptest_tampered_timestamp_rejected(
            key in arb_key(),
            timestamp in 0i64..4_000_000_000,
            delta in 1i64..100,
        ) {
            let headers = SignedHeaders::new(&key, "GET", "/", timestamp, RequestBody::Empty)
                .expect("sign");
            let source = source_for(&headers)
                .with_header("Dgas-Timestamp", (timestamp + delta).to_string());

            let result = RequestVerifier::default()
                .verify_request(&source, "GET", "/", b"", timestamp);
            prop_assert_eq!(result.map_err(|e| e.id()), Err("invalid_signature"));
        }

        #[test]
        fn proptest_short_signature_never_recovers(
            signature in prop::collection::vec(any::<u8>(), 0..65),
            message in prop::collection::vec(any::<u8>(), 0..64),
        ) {
            prop_assert!(crate::domain::ecdsa::recover_address(&message, &signature).is_none());
        }
    }
}
