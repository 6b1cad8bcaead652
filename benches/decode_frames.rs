/// Benchmarks for inbound frame decoding, the per-message hot path of every
/// streaming connection.
use std::io::Write as _;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use flate2::write::{DeflateEncoder, GzEncoder};
use serde_json::json;
use ws_streaming_client::codec::{Compression, Frame, FrameCodec, Outgoing};

const ORDER_BOOK: &str = r#"{
    "topic": "orderbook.50.BTCUSDT",
    "type": "delta",
    "ts": 1672304484978,
    "data": {
        "s": "BTCUSDT",
        "b": [["16493.50", "0.006"], ["16493.00", "0.100"], ["16492.50", "0.250"]],
        "a": [["16611.00", "0.029"], ["16612.00", "0.213"], ["16612.50", "0.001"]],
        "u": 18521288,
        "seq": 7961638724
    }
}"#;

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).expect("in-memory write");
    encoder.finish().expect("in-memory write")
}

fn deflate(data: &[u8]) -> Vec<u8> {
    let mut encoder = DeflateEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).expect("in-memory write");
    encoder.finish().expect("in-memory write")
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/decode");
    group.throughput(Throughput::Bytes(ORDER_BOOK.len() as u64));

    let plain = FrameCodec::new(Compression::None, false);
    group.bench_function("text", |b| {
        b.iter_batched(
            || Frame::Text(ORDER_BOOK.to_owned()),
            |frame| plain.decode(std::hint::black_box(frame)),
            BatchSize::SmallInput,
        );
    });

    group.bench_function("text/not_json", |b| {
        b.iter_batched(
            || Frame::Text("pong".to_owned()),
            |frame| plain.decode(std::hint::black_box(frame)),
            BatchSize::SmallInput,
        );
    });

    let gzipped = gzip(ORDER_BOOK.as_bytes());
    let codec = FrameCodec::new(Compression::Gzip, false);
    group.bench_function("binary/gzip", |b| {
        b.iter_batched(
            || Frame::Binary(gzipped.clone()),
            |frame| codec.decode(std::hint::black_box(frame)),
            BatchSize::SmallInput,
        );
    });

    let deflated = deflate(ORDER_BOOK.as_bytes());
    let codec = FrameCodec::new(Compression::Inflate, false);
    group.bench_function("binary/inflate", |b| {
        b.iter_batched(
            || Frame::Binary(deflated.clone()),
            |frame| codec.decode(std::hint::black_box(frame)),
            BatchSize::SmallInput,
        );
    });

    let encoded = STANDARD.encode(&deflated);
    let codec = FrameCodec::new(Compression::Inflate64, false);
    group.bench_function("text/inflate64", |b| {
        b.iter_batched(
            || Frame::Text(encoded.clone()),
            |frame| codec.decode(std::hint::black_box(frame)),
            BatchSize::SmallInput,
        );
    });

    group.finish();
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec/encode");
    let codec = FrameCodec::default();

    let subscribe = Outgoing::Json(json!({
        "op": "subscribe",
        "args": ["orderbook.50.BTCUSDT", "publicTrade.BTCUSDT", "tickers.BTCUSDT"],
        "req_id": "10001"
    }));
    group.bench_function("json", |b| {
        b.iter(|| codec.encode(std::hint::black_box(&subscribe)));
    });

    let ping = Outgoing::Text("ping".to_owned());
    group.bench_function("text", |b| {
        b.iter(|| codec.encode(std::hint::black_box(&ping)));
    });

    group.finish();
}

criterion_group!(codec_benches, bench_decode, bench_encode);
criterion_main!(codec_benches);
