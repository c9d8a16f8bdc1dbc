//! Criterion benchmarks for edge thresholding and head aggregation.
//!
//! Run with:
//!   cargo bench
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use exbert::attention::{AttentionModel, AttentionTensor, BadTokens};
use exbert::edges::{row_to_edges, to_edges, AxisExtents};

/// Softmax-like rows from a fixed LCG so runs are comparable.
fn make_tensor(n_heads: usize, n_tokens: usize, seed: u64) -> AttentionTensor {
    let mut state = seed;
    let mut next = move || {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        ((state >> 33) as f32) / (u32::MAX >> 1) as f32
    };
    let heads = (0..n_heads)
        .map(|_| {
            (0..n_tokens)
                .map(|_| {
                    let raw: Vec<f32> = (0..n_tokens).map(|_| next().powi(4)).collect();
                    let sum: f32 = raw.iter().sum::<f32>().max(f32::EPSILON);
                    raw.into_iter().map(|v| v / sum).collect()
                })
                .collect()
        })
        .collect();
    AttentionTensor::from_nested(heads).expect("square tensor")
}

fn bench_row_to_edges(c: &mut Criterion) {
    let mut group = c.benchmark_group("row_to_edges");

    for n in [16, 64, 256].iter() {
        let tensor = make_tensor(1, *n, 7);
        let row = tensor.head(0).row(0).to_vec();
        group.throughput(Throughput::Elements(*n as u64));

        for fraction in [0.3f32, 0.7, 1.0] {
            group.bench_with_input(
                BenchmarkId::new(format!("f{}", (fraction * 10.0) as u32), n),
                &row,
                |b, row| b.iter(|| black_box(row_to_edges(0, row, fraction))),
            );
        }
    }

    group.finish();
}

fn bench_matrix(c: &mut Criterion) {
    let mut group = c.benchmark_group("matrix");

    for n in [32, 128].iter() {
        let model = AttentionModel::new(make_tensor(12, *n, 42), BadTokens::default(), false);
        let heads: Vec<usize> = (0..12).collect();
        group.throughput(Throughput::Elements((*n * *n) as u64));

        group.bench_with_input(BenchmarkId::new("by_heads", n), &heads, |b, heads| {
            b.iter(|| black_box(model.by_heads(heads)))
        });

        let summed = model.by_heads(&heads);
        group.bench_with_input(BenchmarkId::new("to_edges", n), &summed, |b, m| {
            b.iter(|| black_box(to_edges(m, 0.7)))
        });

        group.bench_function(BenchmarkId::new("extents", n), |b| {
            b.iter(|| black_box(AxisExtents::of_tensor(model.active())))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_row_to_edges, bench_matrix);

criterion_main!(benches);
