use bytes::BytesMut;
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use secure_bridge::core::codec::PacketCodec;
use secure_bridge::core::packet::Packet;
use secure_bridge::utils::crypto::Crypto;
use tokio_util::codec::{Decoder, Encoder};

#[allow(clippy::unwrap_used)]
fn bench_packet_encode_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("packet_encode_decode");
    let payload_sizes = [64usize, 4096, 65536, 1024 * 1024];

    for &size in &payload_sizes {
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("encode_{size}b"), |b| {
            b.iter_batched(
                || Packet::new(vec![0u8; size]),
                |packet| {
                    let mut buf = BytesMut::with_capacity(size + 32);
                    PacketCodec::default().encode(packet, &mut buf).unwrap();
                },
                BatchSize::SmallInput,
            )
        });

        let mut encoded = BytesMut::new();
        PacketCodec::default()
            .encode(Packet::new(vec![0u8; size]), &mut encoded)
            .unwrap();
        group.bench_function(format!("decode_{size}b"), |b| {
            b.iter_batched(
                || encoded.clone(),
                |mut buf| {
                    let decoded = PacketCodec::default().decode(&mut buf).unwrap();
                    assert!(decoded.is_some());
                },
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

#[allow(clippy::unwrap_used)]
fn bench_frame_encryption(c: &mut Criterion) {
    let mut group = c.benchmark_group("frame_encryption");
    let crypto = Crypto::new(&[7u8; 32]);

    for &size in &[64usize, 4096, 65536] {
        let plaintext = vec![0x5au8; size];
        let nonce = Crypto::sequence_nonce(0);
        let ciphertext = crypto.encrypt(&plaintext, &nonce).unwrap();

        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("seal_{size}b"), |b| {
            b.iter(|| crypto.encrypt(&plaintext, &nonce).unwrap())
        });
        group.bench_function(format!("open_{size}b"), |b| {
            b.iter(|| crypto.decrypt(&ciphertext, &nonce).unwrap())
        });
    }

    group.finish();
}

criterion_group!(benches, bench_packet_encode_decode, bench_frame_encryption);
criterion_main!(benches);
