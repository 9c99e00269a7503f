//! Cost of metered growth versus exact preallocation.

#![allow(
    missing_docs,
    reason = "benchmarks are not part of the public API documentation"
)]

use std::hint::black_box;
use std::rc::Rc;

use criterion::{Criterion, criterion_group, criterion_main};
use mem_quota::MemoryQuota;
use metered_vec::MeteredVec;
use raw_heap::SystemHeap;

const ELEMENTS: usize = 10_000;

fn entrypoint(c: &mut Criterion) {
    let mut group = c.benchmark_group("growth_overhead");

    group.bench_function("push_ladder", |b| {
        b.iter(|| {
            let quota = Rc::new(MemoryQuota::new());
            let mut values = MeteredVec::<u64>::new(quota);
            for i in 0..ELEMENTS {
                values.push(black_box(i as u64)).unwrap();
            }
            black_box(&values);
        });
    });

    group.bench_function("preallocated", |b| {
        b.iter(|| {
            let quota = Rc::new(MemoryQuota::new());
            let mut values = MeteredVec::<u64>::with_len(quota, ELEMENTS).unwrap();
            for i in 0..ELEMENTS {
                values[i] = black_box(i as u64);
            }
            black_box(&values);
        });
    });

    group.bench_function("push_ladder_system_heap", |b| {
        b.iter(|| {
            let quota = Rc::new(MemoryQuota::new());
            let mut values = MeteredVec::<u64, _>::new_in(quota, SystemHeap);
            for i in 0..ELEMENTS {
                values.push(black_box(i as u64)).unwrap();
            }
            black_box(&values);
        });
    });

    group.finish();
}

criterion_group!(benches, entrypoint);
criterion_main!(benches);
