use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use secure_bridge::{MultiFormat, Request, Response, TokenAuthority, WireFormat};
use serde_json::json;

fn sample_requests() -> Vec<Request> {
    vec![
        Request::new("sum", "token", json!({"a": 5, "b": 3})),
        Request::new("echo", "token", json!({"text": "a".repeat(1024)})),
        Request::new(
            "batch",
            "token",
            json!({"items": (0..64).map(|i| json!({"id": i, "ok": i % 2 == 0})).collect::<Vec<_>>()}),
        ),
    ]
}

#[allow(clippy::unwrap_used)]
fn bench_request_formats(c: &mut Criterion) {
    for format in WireFormat::ALL {
        let mut group = c.benchmark_group(format!("request_{format}"));
        let requests = sample_requests();

        group.bench_function("serialize", |b| {
            b.iter_batched(
                || requests.clone(),
                |reqs| {
                    for r in reqs {
                        let _ = r.serialize_with_header(format).unwrap();
                    }
                },
                BatchSize::SmallInput,
            )
        });

        let blob = requests[2].serialize_with_header(format).unwrap();
        group.bench_function("deserialize", |b| {
            b.iter(|| {
                let _: (Request, WireFormat) = Request::deserialize_with_header(&blob).unwrap();
            })
        });

        let reply = Response::success(json!({"result": 8}))
            .serialize_with_header(format)
            .unwrap();
        group.bench_function("deserialize_response", |b| {
            b.iter(|| {
                let _ = Response::deserialize_with_header(&reply).unwrap();
            })
        });

        group.finish();
    }
}

#[allow(clippy::unwrap_used)]
fn bench_tokens(c: &mut Criterion) {
    let mut group = c.benchmark_group("token");
    let tokens = TokenAuthority::new(&Default::default()).unwrap();
    let token = tokens.issue_default().unwrap();

    group.bench_function("issue", |b| b.iter(|| tokens.issue_default().unwrap()));
    group.bench_function("validate", |b| b.iter(|| tokens.validate(&token).unwrap()));
    group.finish();
}

criterion_group!(benches, bench_request_formats, bench_tokens);
criterion_main!(benches);
