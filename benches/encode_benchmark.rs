//! Benchmarks for frame encoding and decoding.
//!
//! Measures the decision engine over frames of varying temporal churn,
//! plus the decoder replaying the resulting streams.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};

use rvc::{Block, FrameDecoder, FrameEncoder, Palette, Rgb};

fn test_palette() -> Palette {
    let colors = (0..64)
        .map(|i| {
            let v = (i * 4) as u8;
            Rgb::new(v, 255 - v, v / 2)
        })
        .collect();
    Palette::new(colors).unwrap()
}

/// Generate a frame where `churn` is the fraction of noisy blocks; the
/// rest are flat fills that collapse into cheap runs.
fn generate_frame(blocks: usize, churn: f64, seed: u64) -> Vec<Block> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..blocks)
        .map(|i| {
            if rng.gen::<f64>() < churn {
                let mut block = [0u8; 16];
                for px in block.iter_mut() {
                    *px = rng.gen_range(0..64);
                }
                block
            } else {
                [(i % 64) as u8; 16]
            }
        })
        .collect()
}

fn encode_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Frame Encoding");
    // 80x60 blocks = one 320x240 frame.
    let blocks = 80 * 60;
    group.throughput(Throughput::Elements(blocks as u64));

    for churn in [0.05, 0.3, 0.9] {
        let frame = generate_frame(blocks, churn, 42);
        group.bench_with_input(
            BenchmarkId::new("churn", churn),
            &frame,
            |b, frame| {
                b.iter(|| {
                    let mut encoder = FrameEncoder::with_seed(test_palette(), 0.01, 7);
                    encoder.encode(black_box(frame)).unwrap();
                    black_box(encoder.pack().unwrap())
                });
            },
        );
    }
    group.finish();
}

fn decode_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("Frame Decoding");
    let blocks = 80 * 60;
    group.throughput(Throughput::Elements(blocks as u64));

    for churn in [0.05, 0.9] {
        let frame = generate_frame(blocks, churn, 42);
        let mut encoder = FrameEncoder::with_seed(test_palette(), 0.01, 7);
        encoder.encode(&frame).unwrap();
        let bytes = encoder.pack().unwrap();
        group.bench_with_input(BenchmarkId::new("churn", churn), &bytes, |b, bytes| {
            b.iter(|| {
                let mut decoder = FrameDecoder::new();
                black_box(decoder.decode(black_box(bytes), blocks, None).unwrap())
            });
        });
    }
    group.finish();
}

criterion_group!(benches, encode_benchmark, decode_benchmark);
criterion_main!(benches);
