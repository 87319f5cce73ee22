//! Codec benchmarks for huddle-protocol.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use huddle_protocol::{codec, EnvelopeFactory};

fn bench_encode_request(c: &mut Criterion) {
    let factory = EnvelopeFactory::new("bench-peer");
    let envelope = factory.new_request(
        serde_json::json!({"sq": "e4", "piece": "pawn"}),
        "move",
        "other-peer",
    );

    let mut group = c.benchmark_group("encode");
    group.bench_function("request", |b| b.iter(|| codec::encode(black_box(&envelope))));
    group.finish();
}

fn bench_decode_request(c: &mut Criterion) {
    let factory = EnvelopeFactory::new("bench-peer");
    let envelope = factory.new_request(
        serde_json::json!({"sq": "e4", "piece": "pawn"}),
        "move",
        "other-peer",
    );
    let encoded = codec::encode(&envelope).unwrap();

    let mut group = c.benchmark_group("decode");
    group.throughput(Throughput::Bytes(encoded.len() as u64));
    group.bench_function("request", |b| b.iter(|| codec::decode(black_box(&encoded))));
    group.finish();
}

fn bench_roundtrip_ping(c: &mut Criterion) {
    let factory = EnvelopeFactory::new("bench-peer");
    let ping = factory.new_ping("ready");

    c.bench_function("roundtrip_ping", |b| {
        b.iter(|| {
            let encoded = codec::encode(black_box(&ping)).unwrap();
            codec::decode(black_box(&encoded)).unwrap()
        })
    });
}

criterion_group!(
    benches,
    bench_encode_request,
    bench_decode_request,
    bench_roundtrip_ping
);
criterion_main!(benches);
