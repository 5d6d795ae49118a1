use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sift_core::memory::{MemorySink, SliceSource};
use sift_core::{Carver, ScanConfig, SignatureTable};

const IMAGE_SIZE: usize = 16 * 1024 * 1024;

// Simple xorshift for reproducible data.
struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.state = x;
        x
    }
}

/// Random bytes with a small JPEG planted every 256 KiB.
fn make_image(size: usize) -> Vec<u8> {
    let mut rng = XorShift64 {
        state: 0x5eed_cafe,
    };
    let mut data: Vec<u8> = (0..size).map(|_| rng.next_u64() as u8).collect();
    let jpeg = [0xFF, 0xD8, 0xFF, 0xE0, 0x10, 0x20, 0x30, 0xFF, 0xD9];
    for at in (4096..size.saturating_sub(jpeg.len())).step_by(256 * 1024) {
        data[at..at + jpeg.len()].copy_from_slice(&jpeg);
    }
    data
}

fn bench_scan(c: &mut Criterion) {
    let data = make_image(IMAGE_SIZE);
    let mut group = c.benchmark_group("scan");
    group.throughput(Throughput::Bytes(data.len() as u64));
    group.sample_size(10);

    for chunk in [64 * 1024, 1024 * 1024, 8 * 1024 * 1024] {
        let carver = Carver::new(
            SignatureTable::default(),
            ScanConfig::default().with_chunk_size(chunk),
        )
        .unwrap();

        group.bench_with_input(BenchmarkId::new("default_table", chunk), &data, |b, data| {
            b.iter(|| {
                let sink = MemorySink::new();
                let report = carver
                    .scan(&mut SliceSource::new(data.as_slice()), &sink)
                    .unwrap();
                black_box(report.extracted.len())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_scan);
criterion_main!(benches);
