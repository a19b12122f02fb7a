//! Benchmarks for the running-mean aggregation and plot planning
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use quarky_rs::backend::{linspace, Aggregator};
use quarky_rs::sinks::plan_plots;
use quarky_rs::types::{Batch, ChannelData, Measurement, X_AXIS};

fn sweep_measurement(points: usize, set: usize) -> Measurement {
    let x = linspace(0.0, 10.0, points);
    let avgi: Vec<f64> = x.iter().map(|x| (x + set as f64 * 0.01).sin()).collect();
    let avgq: Vec<f64> = x.iter().map(|x| (x + set as f64 * 0.01).cos()).collect();
    Measurement::new()
        .with_channel("avgi", ChannelData::from_vec(avgi))
        .with_channel("avgq", ChannelData::from_vec(avgq))
        .with_axis(X_AXIS, ChannelData::from_vec(x))
}

fn bench_aggregator_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("aggregator_update");

    for points in [101usize, 1_001, 10_001] {
        let batches: Vec<Measurement> = (0..16).map(|set| sweep_measurement(points, set)).collect();
        group.throughput(Throughput::Elements((points * 2 * batches.len()) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(points), &batches, |b, batches| {
            b.iter(|| {
                let mut aggregator = Aggregator::new();
                for (set, measurement) in batches.iter().enumerate() {
                    let snapshot = aggregator
                        .update(Batch::new(set, measurement.clone()))
                        .unwrap();
                    black_box(snapshot);
                }
            });
        });
    }

    group.finish();
}

fn bench_plan_plots(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan_plots");

    for points in [101usize, 10_001] {
        let mut aggregator = Aggregator::new();
        let snapshot = aggregator
            .update(Batch::new(0, sweep_measurement(points, 0)))
            .unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(points), &snapshot, |b, snapshot| {
            b.iter(|| black_box(plan_plots(black_box(snapshot))));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_aggregator_update, bench_plan_plots);
criterion_main!(benches);
