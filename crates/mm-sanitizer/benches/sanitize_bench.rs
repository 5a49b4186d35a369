// SPDX-License-Identifier: MIT OR Apache-2.0
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mm_sanitizer::{body_digest, redact_text, sanitize_body};
use std::collections::HashSet;

fn bench_redact_text(c: &mut Criterion) {
    let text = "contact a@b.co or call +1 415 555 0100, card 4111 1111 1111 1111, \
                token eyJhbGciOiJIUzI1NiJ9.eyJzdWIiOiIxIn0.signature";
    c.bench_function("redact_text/mixed_pii", |b| {
        b.iter(|| redact_text(black_box(text)))
    });
}

fn bench_sanitize_json_body(c: &mut Criterion) {
    let body = br#"{"user":{"email":"a@b.co","password":"hunter2","tokens":["abc","def"]},"ok":true}"#;
    let sensitive_fields: HashSet<String> = ["password".to_string()].into_iter().collect();
    c.bench_function("sanitize_body/json", |b| {
        b.iter(|| sanitize_body(black_box(body), "application/json", &sensitive_fields))
    });
}

fn bench_body_digest(c: &mut Criterion) {
    let body = br#"{"z":1,"a":{"nested":true,"list":[1,2,3]},"m":"value"}"#;
    c.bench_function("body_digest/json", |b| b.iter(|| body_digest(black_box(body))));
}

criterion_group!(benches, bench_redact_text, bench_sanitize_json_body, bench_body_digest);
criterion_main!(benches);
