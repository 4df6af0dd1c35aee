//! # Request Authentication Benchmarks
//!
//! | Operation | Target |
//! |-----------|--------|
//! | Sign request | < 1ms |
//! | Recover address | < 1ms |
//! | Verify request (headers + body) | < 1ms |
//! | Envelope encode/decode | < 10μs |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use k256::ecdsa::SigningKey;
use rand::Rng;
use request_auth::{
    build_signing_string, recover_address, sign_request, MapSource, RequestBody,
    RequestVerifier, SignedHeaders,
};
use serde_json::json;
use std::time::Duration;
use task_queue::{TaskEnvelope, TaskId};

const TIMESTAMP: i64 = 1_700_000_000;

fn random_body(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

// ============================================================================
// Signing and recovery
// ============================================================================

fn bench_signing(c: &mut Criterion) {
    let mut group = c.benchmark_group("request-auth-signing");
    group.measurement_time(Duration::from_secs(5));

    let key = SigningKey::random(&mut rand::thread_rng());
    let body = random_body(256);

    group.bench_function("sign_request", |b| {
        b.iter(|| {
            black_box(sign_request(
                &key,
                "POST",
                "/v1/tasks/ping",
                TIMESTAMP,
                RequestBody::Raw(&body),
            ))
        })
    });

    let message = build_signing_string("POST", "/v1/tasks/ping", TIMESTAMP, RequestBody::Raw(&body))
        .expect("signing string");
    let signature = sign_request(&key, "POST", "/v1/tasks/ping", TIMESTAMP, RequestBody::Raw(&body))
        .expect("sign");

    group.bench_function("recover_address", |b| {
        b.iter(|| black_box(recover_address(&message, signature.as_bytes())))
    });

    group.finish();
}

// ============================================================================
// Full request verification by body size
// ============================================================================

fn bench_verify_request(c: &mut Criterion) {
    let mut group = c.benchmark_group("request-auth-verify");
    group.measurement_time(Duration::from_secs(5));

    let key = SigningKey::random(&mut rand::thread_rng());
    let verifier = RequestVerifier::default();

    for size in [0usize, 1024, 64 * 1024] {
        let body = random_body(size);
        let headers = SignedHeaders::new(
            &key,
            "POST",
            "/v1/tasks/ping",
            TIMESTAMP,
            RequestBody::Raw(&body),
        )
        .expect("sign");
        let source = headers
            .iter("Dgas")
            .fold(MapSource::new(), |source, (name, value)| {
                source.with_header(&name, value)
            });

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::new("verify_request", size), &body, |b, body| {
            b.iter(|| {
                black_box(verifier.verify_request(&source, "POST", "/v1/tasks/ping", body, TIMESTAMP))
            })
        });
    }

    group.finish();
}

// ============================================================================
// Task envelopes
// ============================================================================

fn bench_envelope(c: &mut Criterion) {
    let mut group = c.benchmark_group("task-queue-envelope");

    let envelope = TaskEnvelope::call(
        TaskId::new(),
        "balance",
        vec![json!("0x056db290f8ba3250ca64a45d16284d04bc6f5fbf"), json!({"block": "latest"})],
    );
    let encoded = envelope.encode().expect("encode");

    group.bench_function("encode_call", |b| b.iter(|| black_box(envelope.encode())));
    group.bench_function("decode_call", |b| {
        b.iter(|| black_box(TaskEnvelope::decode(&encoded)))
    });

    group.finish();
}

criterion_group!(benches, bench_signing, bench_verify_request, bench_envelope);
criterion_main!(benches);
