use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::Value;
use xgbridge::validation::FeatureMatrix;

const COLUMNS: usize = 32;

fn rows(count: usize) -> Vec<Vec<f64>> {
    (0..count)
        .map(|row| {
            (0..COLUMNS)
                .map(|column| (row * COLUMNS + column) as f64 * 0.25)
                .collect()
        })
        .collect()
}

fn bench_from_rows(c: &mut Criterion) {
    let mut group = c.benchmark_group("feature_matrix_from_rows");
    for count in [100usize, 10_000] {
        let input = rows(count);
        group.bench_with_input(BenchmarkId::from_parameter(count), &input, |b, input| {
            b.iter(|| FeatureMatrix::from_rows(black_box(input.as_slice())).map(|m| m.rows()))
        });
    }
    group.finish();
}

fn bench_from_json(c: &mut Criterion) {
    let mut group = c.benchmark_group("feature_matrix_from_json");
    for count in [100usize, 10_000] {
        let input: Value = serde_json::to_value(rows(count)).unwrap_or(Value::Null);
        group.bench_with_input(BenchmarkId::from_parameter(count), &input, |b, input| {
            b.iter(|| FeatureMatrix::from_json(black_box(input)).map(|m| m.rows()))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_from_rows, bench_from_json);
criterion_main!(benches);
