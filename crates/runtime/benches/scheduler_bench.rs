//! Scheduler benchmarks
//!
//! Measures the registration paths of both engines and the keyed heap that
//! backs the heap engine. Nothing here waits for timers to fire; deadlines are
//! far enough out that the control loops stay idle.
//!
//! Run with: `cargo bench --bench scheduler_bench -p tablecore-runtime`

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tablecore_runtime::collections::{HeapItem, KeyedMinHeap};
use tablecore_runtime::{
    DetachedExecutor, HeapScheduler, HeapSchedulerConfig, Scheduler, Task, WheelScheduler,
    WheelSchedulerConfig,
};
use tokio::runtime::Runtime;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct Deadline {
    at: u64,
    id: u64,
}

impl HeapItem for Deadline {
    type Key = u64;

    fn key(&self) -> u64 {
        self.id
    }
}

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .expect("failed to build benchmark runtime")
}

// ============================================================================
// KeyedMinHeap Benchmarks
// ============================================================================

fn bench_keyed_heap_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_heap_push_pop");

    for size in [100_u64, 1000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let mut heap = KeyedMinHeap::with_capacity(size as usize);
                for id in 0..size {
                    // Scatter deadlines so sifts do real work.
                    heap.push(Deadline { at: id.wrapping_mul(7919) % size, id });
                }
                while let Some(item) = heap.pop() {
                    black_box(item);
                }
            });
        });
    }

    group.finish();
}

fn bench_keyed_heap_remove(c: &mut Criterion) {
    let mut group = c.benchmark_group("keyed_heap_remove");

    for size in [1000_u64, 10_000] {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            let mut heap: KeyedMinHeap<Deadline> =
                (0..size).map(|id| Deadline { at: id.wrapping_mul(7919) % size, id }).collect();
            let mut counter = 0_u64;
            b.iter(|| {
                let id = counter % size;
                let removed = heap.remove(&id);
                if let Some(item) = removed {
                    heap.push(item);
                }
                counter = counter.wrapping_add(1);
            });
        });
    }

    group.finish();
}

// ============================================================================
// Scheduler Benchmarks
// ============================================================================

fn bench_heap_once_cancel(c: &mut Criterion) {
    let rt = runtime();
    let scheduler = {
        let _enter = rt.enter();
        HeapScheduler::new(HeapSchedulerConfig::default(), DetachedExecutor)
            .expect("failed to build heap scheduler")
    };

    c.bench_function("heap_once_cancel", |b| {
        b.iter(|| {
            let id = scheduler.once(Duration::from_secs(3600), Task::new(|| {}));
            rt.block_on(scheduler.cancel(black_box(id)))
        });
    });

    rt.block_on(scheduler.stop());
}

fn bench_wheel_once_cancel(c: &mut Criterion) {
    let rt = runtime();
    let scheduler = {
        let _enter = rt.enter();
        WheelScheduler::new(WheelSchedulerConfig::default(), DetachedExecutor)
            .expect("failed to build wheel scheduler")
    };

    c.bench_function("wheel_once_cancel", |b| {
        b.iter(|| {
            let id = scheduler.once(Duration::from_secs(3600), Task::new(|| {}));
            rt.block_on(scheduler.cancel(black_box(id)))
        });
    });

    rt.block_on(scheduler.stop());
}

fn bench_schedule_burst(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule_burst");
    let rt = runtime();

    for count in [1000_u64, 10_000] {
        group.throughput(Throughput::Elements(count));

        group.bench_with_input(BenchmarkId::new("heap", count), &count, |b, &count| {
            let _enter = rt.enter();
            let scheduler = HeapScheduler::new(HeapSchedulerConfig::default(), DetachedExecutor)
                .expect("failed to build heap scheduler");
            b.iter(|| {
                for i in 0..count {
                    scheduler.once(Duration::from_secs(60 + i % 600), Task::new(|| {}));
                }
                scheduler.cancel_all();
            });
        });

        group.bench_with_input(BenchmarkId::new("wheel", count), &count, |b, &count| {
            let _enter = rt.enter();
            let scheduler = WheelScheduler::new(WheelSchedulerConfig::default(), DetachedExecutor)
                .expect("failed to build wheel scheduler");
            b.iter(|| {
                for i in 0..count {
                    scheduler.once(Duration::from_secs(60 + i % 600), Task::new(|| {}));
                }
                scheduler.cancel_all();
            });
        });
    }

    group.finish();
}

criterion_group!(keyed_heap, bench_keyed_heap_push_pop, bench_keyed_heap_remove);

criterion_group!(schedulers, bench_heap_once_cancel, bench_wheel_once_cancel, bench_schedule_burst);

criterion_main!(keyed_heap, schedulers);
