// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use std::cell::Cell;
use std::rc::Rc;

use criterion::{BatchSize, Criterion, Throughput, black_box, criterion_group, criterion_main};
use understory_flow::{Observer, Runtime, Subject, Subscription};

fn subject_with_listeners(n: usize) -> (Runtime, Subject<u64>, Vec<Subscription>, Rc<Cell<u64>>) {
    let rt = Runtime::new();
    let subject = Subject::new(&rt);
    let total = Rc::new(Cell::new(0_u64));
    let mut subs = Vec::with_capacity(n);
    for _ in 0..n {
        let t = total.clone();
        subs.push(subject.add_listener(Observer::new(move |v: u64| t.set(t.get().wrapping_add(v)))));
    }
    (rt, subject, subs, total)
}

fn bench_broadcast(c: &mut Criterion) {
    let mut group = c.benchmark_group("subject");
    for &listeners in &[1_usize, 16, 256] {
        group.throughput(Throughput::Elements(100 * listeners as u64));
        group.bench_function(format!("broadcast_100_to_{}", listeners), |b| {
            b.iter_batched(
                || subject_with_listeners(listeners),
                |(_rt, subject, _subs, total)| {
                    for v in 0..100 {
                        subject.next(v);
                    }
                    black_box(total.get());
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

fn bench_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("subject");
    for &listeners in &[16_usize, 256] {
        group.bench_function(format!("cancel_half_then_broadcast_{}", listeners), |b| {
            b.iter_batched(
                || subject_with_listeners(listeners),
                |(_rt, subject, subs, total)| {
                    for sub in subs.iter().step_by(2) {
                        sub.cancel();
                    }
                    subject.next(1);
                    black_box((subject.listener_count(), total.get()));
                },
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(benches, bench_broadcast, bench_churn);
criterion_main!(benches);
