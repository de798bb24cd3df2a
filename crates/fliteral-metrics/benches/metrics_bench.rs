// Criterion benchmarks for fliteral-metrics
//
// Run benchmarks with:
//   cargo bench -p fliteral-metrics

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use fliteral_metrics::{MetricsConfig, MetricsSink, RequestMetricsCollector, RequestRecord};
use std::time::Duration;

fn record(path: &str, millis: u64) -> RequestRecord {
    RequestRecord::new(path, Duration::from_millis(millis), false, 200)
}

fn bench_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("record");
    let collector = RequestMetricsCollector::new();
    let single = record("/helloworld", 3);

    group.bench_function("single_path", |b| {
        b.iter(|| collector.record(black_box(&single)));
    });

    let records: Vec<_> = (0..5).map(|i| record(&format!("/fn{}", i), i)).collect();
    group.bench_function("five_paths", |b| {
        b.iter(|| {
            for r in &records {
                let _ = collector.record(black_box(r));
            }
        });
    });

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for path_count in [10usize, 100, 1000] {
        let collector = RequestMetricsCollector::with_config(MetricsConfig {
            max_paths: path_count,
            path_ttl_secs: 3600,
        });
        for i in 0..path_count * 10 {
            let _ = collector.record(&record(&format!("/fn{}", i % path_count), (i % 50) as u64));
        }

        group.bench_with_input(BenchmarkId::from_parameter(path_count), &collector, |b, collector| {
            b.iter(|| collector.snapshot());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_record, bench_snapshot);
criterion_main!(benches);
