// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::cell::Cell;
use std::rc::Rc;

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use understory_flow::{Observer, Pipeline, Runtime, Step};
use understory_flow_ops::{filter, map, of};

/// A source that emits zero and exposes its step so the consumer can feed it.
fn reentrant_counter() -> (Pipeline<u64>, Rc<Cell<Option<Step<u64>>>>) {
    let slot: Rc<Cell<Option<Step<u64>>>> = Rc::default();
    let s = slot.clone();
    let pipeline = Pipeline::source(move |step: Step<u64>| {
        s.set(Some(step.clone()));
        step.next(0);
        Ok(())
    });
    (pipeline, slot)
}

fn bench_sync_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync_chain");
    for &n in &[1_000_u64, 10_000] {
        group.throughput(Throughput::Elements(n));
        group.bench_function(format!("of_map_filter_n{}", n), |b| {
            b.iter_batched(
                Runtime::new,
                |rt| {
                    let pipeline = of(0..n)
                        .pipe(&map(|v: u64| v.wrapping_mul(31)))
                        .pipe(&filter(|v: &u64| v % 3 != 0));
                    let sum = Rc::new(Cell::new(0_u64));
                    let s = sum.clone();
                    rt.subscribe(&pipeline, Observer::new(move |v: u64| s.set(s.get() ^ v)));
                    black_box(sum.get());
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_reentrant(c: &mut Criterion) {
    let mut group = c.benchmark_group("reentrant");
    for &n in &[1_000_u64, 10_000] {
        group.throughput(Throughput::Elements(n));
        group.bench_function(format!("self_feeding_n{}", n), |b| {
            b.iter_batched(
                Runtime::new,
                |rt| {
                    let (pipeline, slot) = reentrant_counter();
                    let seen = Rc::new(Cell::new(0_u64));
                    let (s, slot_in) = (seen.clone(), slot.clone());
                    rt.subscribe(
                        &pipeline,
                        Observer::new(move |v: u64| {
                            s.set(v);
                            let step = slot_in.take();
                            if let Some(step) = &step {
                                if v + 1 < n {
                                    step.next(v + 1);
                                } else {
                                    step.complete();
                                }
                            }
                            slot_in.set(step);
                        }),
                    );
                    black_box(seen.get());
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_cascade(c: &mut Criterion) {
    let mut group = c.benchmark_group("cascade");
    for &depth in &[8_usize, 64] {
        group.bench_function(format!("cancel_depth{}", depth), |b| {
            b.iter_batched(
                || {
                    let rt = Runtime::new();
                    let mut pipeline = Pipeline::source(|step: Step<u32>| {
                        step.on_teardown(|| Ok(()));
                        Ok(())
                    });
                    for _ in 0..depth {
                        pipeline = pipeline.pipe(&map(|v: u32| v + 1));
                    }
                    let sub = rt.subscribe(&pipeline, Observer::default());
                    (rt, sub)
                },
                |(rt, sub)| {
                    sub.cancel();
                    black_box(rt.live_steps());
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_sync_chain, bench_reentrant, bench_cascade);
criterion_main!(benches);
