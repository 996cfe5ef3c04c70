//! Throughput benchmarks for the hazard-pointer engine.

use std::sync::atomic::{AtomicPtr, Ordering};
use std::sync::Arc;
use std::thread;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use vigil::{cleanup, retire, Holder, RetiredObject};

#[repr(C)]
struct Node {
    retired: RetiredObject,
    value: usize,
}

impl Node {
    fn create(value: usize) -> *mut Self {
        Box::into_raw(Box::new(Self { retired: RetiredObject::new(), value }))
    }
}

unsafe fn reclaim_node(obj: *mut RetiredObject) {
    unsafe { drop(Box::from_raw(obj as *mut Node)) };
}

fn bench_holder_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("holder_churn");

    group.bench_function("single_thread", |b| {
        b.iter(|| {
            let holder = Holder::new();
            black_box(&holder);
        });
    });

    group.finish();
}

fn bench_protect(c: &mut Criterion) {
    let mut group = c.benchmark_group("protect");
    let shared = Arc::new(AtomicPtr::new(Node::create(42)));

    group.bench_function("single_thread", |b| {
        let holder = Holder::new();
        b.iter(|| {
            let ptr = holder.protect(&shared);
            black_box(ptr);
            holder.clear();
        });
    });

    for threads in [2, 4, 8].iter() {
        group.bench_with_input(
            BenchmarkId::new("concurrent", threads),
            threads,
            |b, &num_threads| {
                b.iter(|| {
                    let handles: Vec<_> = (0..num_threads)
                        .map(|_| {
                            let shared = shared.clone();
                            thread::spawn(move || {
                                let holder = Holder::new();
                                for _ in 0..1000 {
                                    let ptr = holder.protect(&shared);
                                    black_box(ptr);
                                    holder.clear();
                                }
                            })
                        })
                        .collect();

                    for handle in handles {
                        handle.join().unwrap();
                    }
                });
            },
        );
    }

    let old = shared.swap(std::ptr::null_mut(), Ordering::AcqRel);
    unsafe { retire(old as *mut RetiredObject, reclaim_node) };
    cleanup();

    group.finish();
}

fn bench_retire(c: &mut Criterion) {
    let mut group = c.benchmark_group("retire");

    for batch_size in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &size| {
                b.iter(|| {
                    for i in 0..size {
                        let node = Node::create(i);
                        unsafe { retire(node as *mut RetiredObject, reclaim_node) };
                    }
                });
                cleanup();
            },
        );
    }

    group.finish();
}

fn bench_exchange_retire(c: &mut Criterion) {
    let mut group = c.benchmark_group("exchange_retire");
    group.sample_size(20);

    for threads in [2, 4, 8].iter() {
        group.throughput(Throughput::Elements(10_000 * *threads as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(threads),
            threads,
            |b, &num_threads| {
                b.iter(|| {
                    let shared = Arc::new(AtomicPtr::new(Node::create(0)));
                    let handles: Vec<_> = (0..num_threads)
                        .map(|tid| {
                            let shared = shared.clone();
                            thread::spawn(move || {
                                for i in 0..10_000 {
                                    let node = Node::create(tid * 10_000 + i);
                                    let old = shared.swap(node, Ordering::AcqRel);
                                    if !old.is_null() {
                                        unsafe {
                                            retire(old as *mut RetiredObject, reclaim_node)
                                        };
                                    }
                                }
                            })
                        })
                        .collect();

                    for handle in handles {
                        handle.join().unwrap();
                    }

                    let old = shared.swap(std::ptr::null_mut(), Ordering::AcqRel);
                    if !old.is_null() {
                        unsafe { retire(old as *mut RetiredObject, reclaim_node) };
                    }
                    cleanup();
                });
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_holder_churn,
    bench_protect,
    bench_retire,
    bench_exchange_retire
);
criterion_main!(benches);
