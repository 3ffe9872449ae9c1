//! Performance benchmarks for the hybi13 processor.
//!
//! Run with: `cargo bench`

use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use hybi13::protocol::{
    FrameHeader, MaskingKey, OpCode, apply_mask, apply_mask_fast, compute_accept_key,
};
use hybi13::{Config, Message, Processor, Role};

// =============================================================================
// Masking
// =============================================================================

fn bench_masking(c: &mut Criterion) {
    let mut group = c.benchmark_group("masking");
    let key = [0x37, 0xfa, 0x21, 0x3d];

    for size in [64usize, 1024, 64 * 1024] {
        let mut data = vec![0xAB; size];
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_function(format!("bytewise_{}", size), |b| {
            b.iter(|| apply_mask(black_box(&mut data), black_box(key)))
        });
        group.bench_function(format!("word_{}", size), |b| {
            b.iter(|| apply_mask_fast(black_box(&mut data), black_box(key)))
        });
        group.bench_function(format!("rotating_17_byte_chunks_{}", size), |b| {
            b.iter(|| {
                let mut rotating = MaskingKey::new(key);
                for chunk in data.chunks_mut(17) {
                    rotating.apply(black_box(chunk));
                }
            })
        });
    }

    group.finish();
}

// =============================================================================
// Header codec
// =============================================================================

fn bench_header(c: &mut Criterion) {
    let mut group = c.benchmark_group("header");

    let small = FrameHeader::new(true, OpCode::Text, 10).to_bytes();
    let large = FrameHeader::new(true, OpCode::Binary, 1 << 20)
        .with_mask([1, 2, 3, 4])
        .to_bytes();

    group.bench_function("decode_small", |b| b.iter(|| FrameHeader::decode(black_box(&small))));
    group.bench_function("decode_64bit_masked", |b| {
        b.iter(|| FrameHeader::decode(black_box(&large)))
    });
    group.bench_function("encode_64bit_masked", |b| {
        let header = FrameHeader::new(true, OpCode::Binary, 1 << 20).with_mask([1, 2, 3, 4]);
        b.iter(|| black_box(header).to_bytes())
    });

    group.finish();
}

// =============================================================================
// Processor throughput
// =============================================================================

fn client_wire(message: &Message, count: usize) -> Vec<u8> {
    let mut tx = Processor::new(Role::Client, Config::new(), || 0x5151_5151_u32);
    let mut wire = Vec::new();
    for _ in 0..count {
        wire.extend(tx.prepare_data_frame(message).unwrap().to_vec());
    }
    wire
}

fn consume_all(rx: &mut Processor, mut wire: &[u8]) -> usize {
    let mut messages = 0;
    while !wire.is_empty() {
        let used = rx.consume(wire).unwrap();
        wire = &wire[used..];
        if rx.get_message().is_some() {
            messages += 1;
        }
    }
    messages
}

fn bench_consume(c: &mut Criterion) {
    let mut group = c.benchmark_group("consume");

    let cases = [
        ("small_text", Message::text("hello world"), 1000),
        ("binary_4k", Message::binary(vec![0x42; 4096]), 100),
        ("binary_1m", Message::binary(vec![0x42; 1 << 20]), 1),
    ];
    for (name, message, count) in cases {
        let wire = client_wire(&message, count);
        group.throughput(Throughput::Bytes(wire.len() as u64));
        group.bench_function(name, |b| {
            b.iter(|| {
                let mut rx = Processor::new(Role::Server, Config::new(), || 0_u32);
                consume_all(&mut rx, black_box(&wire))
            })
        });
    }

    group.finish();
}

fn bench_prepare(c: &mut Criterion) {
    let mut group = c.benchmark_group("prepare");
    let message = Message::binary(vec![0x42; 4096]);
    group.throughput(Throughput::Bytes(4096));

    group.bench_function("server_4k", |b| {
        let mut p = Processor::new(Role::Server, Config::new(), || 0_u32);
        b.iter(|| p.prepare_data_frame(black_box(&message)).unwrap())
    });
    group.bench_function("client_4k", |b| {
        let mut p = Processor::new(Role::Client, Config::new(), || 0x1234_5678_u32);
        b.iter(|| p.prepare_data_frame(black_box(&message)).unwrap())
    });

    group.finish();
}

// =============================================================================
// Compression
// =============================================================================

#[cfg(feature = "compression")]
fn bench_deflate(c: &mut Criterion) {
    use hybi13::DeflateConfig;
    use hybi13::extensions::deflate::PerMessageDeflate;
    use hybi13::extensions::{Extension, ExtensionOffer};

    let mut group = c.benchmark_group("deflate");
    let text: Vec<u8> = "The quick brown fox jumps over the lazy dog. "
        .repeat(100)
        .into_bytes();
    group.throughput(Throughput::Bytes(text.len() as u64));

    let mut client = PerMessageDeflate::new(Role::Client, DeflateConfig::new(), usize::MAX);
    let mut server = PerMessageDeflate::new(Role::Server, DeflateConfig::new(), usize::MAX);
    let response = server.negotiate(&[]).unwrap();
    let accepted = ExtensionOffer::parse_header(&response).unwrap();
    client.configure(&accepted[0].params).unwrap();

    group.bench_function("compress_4500", |b| {
        let mut out = Vec::with_capacity(text.len());
        b.iter(|| {
            out.clear();
            client.compress(black_box(&text), &mut out).unwrap();
        })
    });

    let mut fresh = PerMessageDeflate::new(Role::Client, DeflateConfig::new(), usize::MAX);
    fresh.configure(&accepted[0].params).unwrap();
    let mut compressed = Vec::new();
    fresh.compress(&text, &mut compressed).unwrap();

    group.bench_function("decompress_4500", |b| {
        let mut inflater = PerMessageDeflate::new(
            Role::Server,
            DeflateConfig::new().client_no_context_takeover(true),
            usize::MAX,
        );
        inflater.negotiate(&[]).unwrap();
        let mut out = Vec::with_capacity(text.len());
        b.iter(|| {
            out.clear();
            inflater.decompress(black_box(&compressed), true, &mut out).unwrap();
        })
    });

    group.finish();
}

#[cfg(not(feature = "compression"))]
fn bench_deflate(_c: &mut Criterion) {}

// =============================================================================
// Handshake
// =============================================================================

fn bench_handshake(c: &mut Criterion) {
    let mut group = c.benchmark_group("handshake");

    group.bench_function("accept_key", |b| {
        b.iter(|| compute_accept_key(black_box("dGhlIHNhbXBsZSBub25jZQ==")))
    });
    group.bench_function("client_request", |b| {
        let mut p = Processor::new(Role::Client, Config::client(), || 0x0bad_cafe_u32);
        b.iter(|| {
            p.client_handshake_request(black_box("ws://example.com:8080/chat"), &["chat"])
                .unwrap()
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_masking,
    bench_header,
    bench_consume,
    bench_prepare,
    bench_deflate,
    bench_handshake,
);
criterion_main!(benches);
