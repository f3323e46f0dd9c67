use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use scratch_space::{ScratchSpace, TempDirectory, TempSpaceConfig, TempSpaceRegistry};
use std::sync::Arc;
use tempfile::TempDir;

fn registry(dir: &TempDir, cache_limit: u64, block: u64) -> Arc<TempSpaceRegistry> {
    TempSpaceRegistry::new(
        TempSpaceConfig::new(vec![TempDirectory::new(dir.path())], cache_limit).min_block_size(block),
    )
    .unwrap()
}

fn bench_sequential_io(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut group = c.benchmark_group("sequential_io");
    let total = 4 * 1024 * 1024u64;
    group.throughput(Throughput::Bytes(total));

    // Fully in memory vs. fully spilled
    for (name, cache_limit) in [("memory", u64::MAX), ("file", 0)] {
        let mut space = ScratchSpace::new(registry(&dir, cache_limit, 1024 * 1024)).unwrap();
        space.extend(total).unwrap();
        let chunk = vec![0xABu8; 64 * 1024];

        group.bench_function(BenchmarkId::new("write", name), |b| {
            b.iter(|| {
                let mut offset = 0;
                while offset < total {
                    space.write(offset, &chunk).unwrap();
                    offset += chunk.len() as u64;
                }
            });
        });

        let mut buf = vec![0u8; 64 * 1024];
        group.bench_function(BenchmarkId::new("read", name), |b| {
            b.iter(|| {
                let mut offset = 0;
                while offset < total {
                    space.read(offset, &mut buf).unwrap();
                    offset += buf.len() as u64;
                }
                black_box(&buf);
            });
        });
    }
    group.finish();
}

fn bench_growth(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut group = c.benchmark_group("growth");

    // Spill point at half the final size
    for block in [4 * 1024u64, 64 * 1024, 1024 * 1024] {
        group.bench_with_input(BenchmarkId::new("extend_8mb", block), &block, |b, &block| {
            b.iter(|| {
                let mut space =
                    ScratchSpace::new(registry(&dir, 4 * 1024 * 1024, block)).unwrap();
                for _ in 0..256 {
                    space.extend(32 * 1024).unwrap();
                }
                black_box(space.block_count());
            });
        });
    }
    group.finish();
}

fn bench_allocator_churn(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let mut group = c.benchmark_group("allocator");

    group.bench_function("allocate_release_churn", |b| {
        b.iter(|| {
            let mut space = ScratchSpace::new(registry(&dir, u64::MAX, 64 * 1024)).unwrap();
            let mut live = Vec::new();
            for i in 0..1000u64 {
                let size = 64 + (i * 37) % 4096;
                live.push((space.allocate_space(size).unwrap(), size));
                if i % 3 == 0 {
                    let (offset, size) = live.swap_remove((i as usize * 7) % live.len());
                    space.release_space(offset, size).unwrap();
                }
            }
            black_box(space.stats());
        });
    });

    group.bench_function("allocate_batch_64", |b| {
        b.iter(|| {
            let mut space = ScratchSpace::new(registry(&dir, u64::MAX, 64 * 1024)).unwrap();
            let holes: Vec<u64> = (0..64).map(|_| space.allocate_space(4096).unwrap()).collect();
            for offset in holes.iter().step_by(2) {
                space.release_space(*offset, 4096).unwrap();
            }
            black_box(space.allocate_batch(64, 1024, 4096).unwrap());
        });
    });

    group.finish();
}

criterion_group!(benches, bench_sequential_io, bench_growth, bench_allocator_churn);
criterion_main!(benches);
