//! Record formatting and dispatch benchmarks.
//!
//! Measures the work done on an instrumented thread: formatting a record,
//! tracker updates, and the enqueue onto the log writer.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;

use perf_issues::record::{Category, EventRecord, MemorySink, Payload, StackTrace};
use perf_issues::store::{LogStore, NoopUploader, StoreSettings};
use perf_issues::tracker::{CorrelationTracker, KeyAllocator};

fn bench_record_finalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("record_finalize");

    for depth in [8usize, 32, 128] {
        let trace = StackTrace::new((0..depth).map(|i| format!("frame_{i}(Source.rs:{i})")));
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(depth), &trace, |b, trace| {
            b.iter(|| {
                let record = EventRecord::new(Category::Thread, "thread run stalled")
                    .with_field("thread name", "bench")
                    .with_payload(Payload::Frames(trace.clone()));
                black_box(record.finalize().len())
            })
        });
    }

    group.finish();
}

fn bench_tracker_link_exit(c: &mut Criterion) {
    let mut group = c.benchmark_group("tracker_link_exit");
    let tracker = CorrelationTracker::new(Arc::new(MemorySink::new()));
    let keys = KeyAllocator::new();
    let pool = keys.pool();
    tracker.pool_created(pool, StackTrace::empty());
    // Keeps the pool alive between iterations.
    let anchor = keys.worker();
    tracker.worker_created(anchor, pool);
    tracker.worker_thread_resolved(anchor, Some(keys.thread()));

    group.throughput(Throughput::Elements(1));
    group.bench_function("pool_thread", |b| {
        b.iter(|| {
            let worker = keys.worker();
            let thread = keys.thread();
            tracker.worker_created(worker, pool);
            tracker.worker_thread_resolved(worker, Some(thread));
            tracker.thread_started(thread, "bench", StackTrace::empty());
            tracker.thread_exited(thread);
        })
    });

    group.finish();
}

fn bench_store_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_append");
    let dir = TempDir::new().unwrap();
    let store = LogStore::open(StoreSettings {
        dir: dir.path().join("perf_issues"),
        buffer_size: 1024 * 1024,
        max_cache_bytes: 0,
        uploader: Arc::new(NoopUploader),
    })
    .unwrap();
    let bytes = EventRecord::new(Category::FrameRate, "dropped frames")
        .with_payload(Payload::Text("x".repeat(512)))
        .finalize();

    group.throughput(Throughput::Bytes(bytes.len() as u64));
    group.bench_function("enqueue", |b| b.iter(|| store.append(Arc::clone(&bytes))));
    store.sync().unwrap();

    group.finish();
}

criterion_group!(
    benches,
    bench_record_finalize,
    bench_tracker_link_exit,
    bench_store_append
);
criterion_main!(benches);
