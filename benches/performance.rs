//! Performance benchmarks for the story store.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use storychain::{FileLedger, FileLedgerConfig, MemoryLedger, RecordStore, Workflow};
use tempfile::TempDir;

fn seeded_workflow(stories: usize) -> Workflow<MemoryLedger> {
    let store = RecordStore::new(MemoryLedger::new());
    store.initialize(b"0").unwrap();
    let workflow = Workflow::new(store);
    for i in 0..stories {
        workflow.add_record(&format!("story-{}", i)).unwrap();
    }
    workflow
}

/// Benchmark add_record against index size (duplicate check is a linear scan)
fn bench_add_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_record");

    for size in [10, 100, 1000, 5000] {
        group.bench_with_input(BenchmarkId::new("index_size", size), &size, |b, &size| {
            let workflow = seeded_workflow(size);
            let mut next = size;
            b.iter(|| {
                next += 1;
                black_box(workflow.add_record(&format!("story-{}", next)).unwrap());
            });
        });
    }

    group.finish();
}

/// Benchmark a full written -> approved lifecycle
fn bench_lifecycle(c: &mut Criterion) {
    let workflow = seeded_workflow(100);
    let mut next = 0usize;

    c.bench_function("lifecycle", |b| {
        b.iter(|| {
            next += 1;
            let name = format!("bench-{}", next);
            workflow.add_record(&name).unwrap();
            workflow.first_edit(&name).unwrap();
            black_box(workflow.approve(&name).unwrap());
        });
    });
}

/// Benchmark durable transitions on the file ledger
fn bench_file_ledger_transitions(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let ledger = FileLedger::open(FileLedgerConfig {
        path: dir.path().join("ledger"),
        sync_writes: false,
        create_if_missing: true,
    })
    .unwrap();
    let store = RecordStore::new(ledger);
    store.initialize(b"0").unwrap();
    let workflow = Workflow::new(store);
    let mut next = 0usize;

    c.bench_function("file_ledger_add_record", |b| {
        b.iter(|| {
            next += 1;
            black_box(workflow.add_record(&format!("story-{}", next)).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_add_record,
    bench_lifecycle,
    bench_file_ledger_transitions,
);
criterion_main!(benches);
