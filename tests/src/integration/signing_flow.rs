//! # Signing Flow
//!
//! A client signs with `SignedHeaders`, the server verifies the received
//! headers and raw body with `RequestVerifier`.

#[cfg(test)]
mod tests {
    use k256::ecdsa::SigningKey;
    use request_auth::{
        private_key_to_address, signing_key_from_hex, to_canonical_json, AuthError, MapSource,
        RequestBody, RequestVerifier, SignedHeaders, VerifierConfig,
    };
    use serde_json::json;

    // =============================================================================
    // TEST FIXTURES
    // =============================================================================

    const TEST_PRIVATE_KEY: &str =
        "0xe8f32e723decf4051aefac8e2c93c9c5b214313817cdb01a1494b917c8436b35";
    const TEST_ADDRESS: &str = "0x056db290f8ba3250ca64a45d16284d04bc6f5fbf";
    const NOW: i64 = 1_700_000_000;

    fn key() -> SigningKey {
        signing_key_from_hex(TEST_PRIVATE_KEY).unwrap()
    }

    /// What the server sees: the auth headers under `prefix`.
    fn received(headers: &SignedHeaders, prefix: &str) -> MapSource {
        headers
            .iter(prefix)
            .fold(MapSource::new(), |source, (name, value)| {
                source.with_header(&name, value)
            })
    }

    // =============================================================================
    // ROUND TRIPS
    // =============================================================================

    #[test]
    fn test_signed_get_verifies() {
        let headers = SignedHeaders::new(&key(), "GET", "/v1/user", NOW, RequestBody::Empty).unwrap();

        let address = RequestVerifier::default()
            .verify_request(&received(&headers, "Dgas"), "GET", "/v1/user", b"", NOW)
            .unwrap();
        assert_eq!(address.to_string(), TEST_ADDRESS);
    }

    #[test]
    fn test_json_body_signed_as_value_verifies_as_bytes() {
        let body = json!({"username": "dgas", "note": "caf\u{e9}", "count": 2});
        let headers =
            SignedHeaders::new(&key(), "PUT", "/v1/user", NOW, RequestBody::Json(&body)).unwrap();

        // The client sends the same serialization it signed.
        let wire = to_canonical_json(&body).unwrap();
        let address = RequestVerifier::default()
            .verify_request(&received(&headers, "Dgas"), "PUT", "/v1/user", &wire, NOW)
            .unwrap();
        assert_eq!(address, private_key_to_address(&key()));
    }

    #[test]
    fn test_legacy_prefix_and_query_args() {
        let headers = SignedHeaders::new(&key(), "GET", "/v1/ws", NOW, RequestBody::Empty).unwrap();
        let verifier = RequestVerifier::default();

        let legacy = received(&headers, "Token");
        assert!(verifier.verify_request(&legacy, "GET", "/v1/ws", b"", NOW).is_ok());

        let query = headers
            .query_args("Dgas")
            .fold(MapSource::new(), |source, (name, value)| {
                source.with_query_arg(&name, value)
            });
        assert!(verifier.verify_request(&query, "GET", "/v1/ws", b"", NOW).is_ok());
    }

    #[test]
    fn test_custom_prefix_rejects_default_headers() {
        let config = VerifierConfig {
            header_prefix: "Acme".into(),
            legacy_prefixes: vec![],
            ..Default::default()
        };
        let verifier = RequestVerifier::new(&config);
        let headers = SignedHeaders::new(&key(), "GET", "/", NOW, RequestBody::Empty).unwrap();

        assert!(verifier
            .verify_request(&received(&headers, "Acme"), "GET", "/", b"", NOW)
            .is_ok());
        assert_eq!(
            verifier.verify_request(&received(&headers, "Dgas"), "GET", "/", b"", NOW),
            Err(AuthError::MissingArgument("Acme-ID-Address".into()))
        );
    }

    // =============================================================================
    // REJECTIONS
    // =============================================================================

    #[test]
    fn test_any_signed_component_change_rejected() {
        let headers =
            SignedHeaders::new(&key(), "POST", "/v1/tasks/ping", NOW, RequestBody::Raw(b"{}"))
                .unwrap();
        let source = received(&headers, "Dgas");
        let verifier = RequestVerifier::default();

        let cases: [(&str, &str, &[u8]); 3] = [
            ("PUT", "/v1/tasks/ping", b"{}"),
            ("POST", "/v1/tasks/pong", b"{}"),
            ("POST", "/v1/tasks/ping", b"{ }"),
        ];
        for (method, path, body) in cases {
            let err = verifier
                .verify_request(&source, method, path, body, NOW)
                .unwrap_err();
            assert_eq!(err.id(), "invalid_signature", "{method} {path}");
        }
    }

    #[test]
    fn test_timestamp_window_boundaries() {
        let verifier = RequestVerifier::default();
        let window = verifier.timestamp_expiry() as i64;
        let headers = SignedHeaders::new(&key(), "GET", "/", NOW, RequestBody::Empty).unwrap();
        let source = received(&headers, "Dgas");

        for now in [NOW + window - 1, NOW + window, NOW - window] {
            assert!(verifier.verify_request(&source, "GET", "/", b"", now).is_ok());
        }
        for now in [NOW + window + 1, NOW - window - 1] {
            assert_eq!(
                verifier.verify_request(&source, "GET", "/", b"", now),
                Err(AuthError::TimestampExpired)
            );
        }
    }

    #[test]
    fn test_bad_signature_reported_before_expiry() {
        let headers = SignedHeaders::new(&key(), "GET", "/", NOW, RequestBody::Empty).unwrap();
        let source = received(&headers, "Dgas");

        let err = RequestVerifier::default()
            .verify_request(&source, "GET", "/other", b"", NOW + 10_000)
            .unwrap_err();
        assert_eq!(err.id(), "invalid_signature");
    }

    #[test]
    fn test_replay_rejected_when_enabled() {
        let config = VerifierConfig {
            reject_replays: true,
            ..Default::default()
        };
        let verifier = RequestVerifier::new(&config);
        let headers = SignedHeaders::new(&key(), "GET", "/", NOW, RequestBody::Empty).unwrap();
        let source = received(&headers, "Dgas");

        assert!(verifier.verify_request(&source, "GET", "/", b"", NOW).is_ok());
        assert_eq!(
            verifier.verify_request(&source, "GET", "/", b"", NOW + 1),
            Err(AuthError::ReplayedRequest)
        );

        // Without the guard the same request verifies again.
        let lenient = RequestVerifier::default();
        assert!(lenient.verify_request(&source, "GET", "/", b"", NOW).is_ok());
        assert!(lenient.verify_request(&source, "GET", "/", b"", NOW).is_ok());
    }

    #[test]
    fn test_other_key_cannot_claim_address() {
        let impostor = SigningKey::random(&mut rand::thread_rng());
        let headers = SignedHeaders::new(&impostor, "GET", "/", NOW, RequestBody::Empty).unwrap();
        let source = received(&headers, "Dgas").with_header("Dgas-ID-Address", TEST_ADDRESS);

        let err = RequestVerifier::default()
            .verify_request(&source, "GET", "/", b"", NOW)
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidSignature("Dgas-Signature".into()));
    }
}
