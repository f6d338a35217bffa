//! Frame Registry Benchmarks
//!
//! # Benchmark Categories
//!
//! 1. **Lookup**: hit and miss cost against indexes of growing size
//! 2. **Snapshot**: cost of taking a snapshot with nothing to reclaim
//! 3. **Registration**: full index rebuild as the table list grows
//! 4. **Decode**: walking a table descriptor by descriptor

use std::hint::black_box;

use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use frametable::{DescriptorSpec, FrameRegistry, FrameTable, FrameTableWriter, MajorCycles};

// =============================================================================
// Benchmark Helpers
// =============================================================================

/// Leaked table of `n` descriptors spaced like real call sites.
fn make_table(base: usize, n: usize) -> FrameTable<'static> {
    let mut writer = FrameTableWriter::new();
    for i in 0..n {
        let spec = DescriptorSpec::new(base + i * 24, 48).with_live(&[8, 16, 32]);
        let spec = if i % 4 == 0 {
            spec.with_alloc_lengths(&[2, 3]).with_debug_info(&[1, 2])
        } else {
            spec
        };
        writer.push(spec);
    }
    writer.finish().leak()
}

// =============================================================================
// Lookup Benchmarks
// =============================================================================

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    for n in [64usize, 4096, 65536] {
        let registry = FrameRegistry::initialize(&[make_table(0x10_0000, n)], MajorCycles::new());
        let snapshot = registry.current_snapshot();
        let addrs: Vec<usize> = (0..n).map(|i| 0x10_0000 + i * 24).collect();

        group.throughput(Throughput::Elements(addrs.len() as u64));
        group.bench_with_input(BenchmarkId::new("hit", n), &addrs, |b, addrs| {
            b.iter(|| {
                for &addr in addrs {
                    black_box(snapshot.lookup(black_box(addr)));
                }
            })
        });

        let misses: Vec<usize> = addrs.iter().map(|a| a + 8).collect();
        group.bench_with_input(BenchmarkId::new("miss", n), &misses, |b, misses| {
            b.iter(|| {
                for &addr in misses {
                    black_box(snapshot.lookup(black_box(addr)));
                }
            })
        });
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let registry = FrameRegistry::initialize(&[make_table(0x10_0000, 1024)], MajorCycles::new());

    c.bench_function("current_snapshot", |b| {
        b.iter(|| black_box(registry.current_snapshot()))
    });

    c.bench_function("find", |b| {
        b.iter(|| black_box(registry.find(black_box(0x10_0000 + 24 * 512))))
    });
}

// =============================================================================
// Registration Benchmarks
// =============================================================================

fn bench_register(c: &mut Criterion) {
    let mut group = c.benchmark_group("register");
    group.sample_size(20);

    for existing in [0usize, 16, 128] {
        let tables: Vec<_> = (0..existing)
            .map(|t| make_table(0x100_0000 * (t + 1), 256))
            .collect();
        let extra = make_table(0x10_0000, 256);

        group.bench_with_input(
            BenchmarkId::from_parameter(existing),
            &tables,
            |b, tables| {
                b.iter_batched(
                    || FrameRegistry::initialize(tables, MajorCycles::new()),
                    |registry| {
                        registry.register(extra);
                        registry
                    },
                    BatchSize::SmallInput,
                )
            },
        );
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let table = make_table(0x10_0000, 4096);

    c.bench_function("walk_4096", |b| {
        b.iter(|| {
            let mut live = 0usize;
            for d in black_box(table).descriptors() {
                live += d.live_count();
            }
            black_box(live)
        })
    });
}

criterion_group!(
    benches,
    bench_lookup,
    bench_snapshot,
    bench_register,
    bench_decode
);
criterion_main!(benches);
