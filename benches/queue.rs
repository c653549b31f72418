//! Work queue benchmarks
//!
//! Measures enqueue/dequeue throughput with and without a subscribed
//! listener, and report correlation overhead.
//!
//! Run with: cargo bench --bench queue

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use symbol_indexer::{
    EnqueueListener, IndexReport, PackageIdentity, ReportPromise, WorkQueue,
};

const BATCH_SIZES: &[usize] = &[10, 100, 1000];

struct CountingListener(AtomicUsize);

impl EnqueueListener for CountingListener {
    fn on_enqueue(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

fn package_paths(count: usize) -> Vec<PathBuf> {
    (0..count)
        .map(|n| PathBuf::from(format!("/srv/upload/Package{}.1.0.{}.symbols.nupkg", n, n)))
        .collect()
}

fn bench_enqueue_dequeue(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue_dequeue");

    for &size in BATCH_SIZES {
        let paths = package_paths(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &paths, |b, paths| {
            let queue = WorkQueue::new();
            b.iter(|| {
                for path in paths {
                    queue.enqueue(path, None).unwrap();
                }
                while let Some(entry) = queue.dequeue() {
                    black_box(entry);
                }
            });
        });
    }

    group.finish();
}

fn bench_enqueue_with_listener(c: &mut Criterion) {
    let mut group = c.benchmark_group("enqueue_with_listener");

    for &size in BATCH_SIZES {
        let paths = package_paths(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &paths, |b, paths| {
            let queue = WorkQueue::new();
            let listener = Arc::new(CountingListener(AtomicUsize::new(0)));
            let weak: Weak<dyn EnqueueListener> = Arc::downgrade(&listener) as Weak<dyn EnqueueListener>;
            queue.subscribe(weak);
            b.iter(|| {
                for path in paths {
                    queue.enqueue(path, None).unwrap();
                }
                while let Some(entry) = queue.dequeue() {
                    black_box(entry);
                }
            });
            black_box(listener.0.load(Ordering::Relaxed));
        });
    }

    group.finish();
}

fn bench_report_correlation(c: &mut Criterion) {
    let identity = PackageIdentity::new("Nuclei", "0.8.1.0");

    c.bench_function("resolve_promise_via_sink", |b| {
        b.iter(|| {
            let promise = ReportPromise::new();
            let sink = promise.sink();
            sink(IndexReport::succeeded(&identity));
            black_box(promise.is_resolved())
        });
    });
}

criterion_group!(
    benches,
    bench_enqueue_dequeue,
    bench_enqueue_with_listener,
    bench_report_correlation
);
criterion_main!(benches);
