// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Timers on a manually stepped clock.
//!
//! Merge a few timers, concatenate a delayed tail, and cancel one run early.
//!
//! Run:
//! - `cargo run -p understory_demos --example timers`

use tracing_subscriber::EnvFilter;
use understory_flow::{Observer, Runtime};
use understory_flow_ops::{ManualScheduler, concat, delay, merge_all, of, timer};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let runtime = Runtime::new();
    let clock = ManualScheduler::new();

    let ticks = of([timer(&clock, 30), timer(&clock, 10), timer(&clock, 20)]).pipe(&merge_all());
    let tail = of([7_u64, 8]).pipe(&delay(&clock, 5));
    let run = concat([ticks, tail]);

    runtime.subscribe(
        &run,
        Observer::new(|v: u64| println!("kept: {v}")).on_complete(|| println!("kept: done")),
    );
    let dropped = runtime.subscribe(&run, Observer::new(|v: u64| println!("dropped: {v}")));

    clock.advance(15);
    dropped.cancel();
    tracing::info!(pending = clock.pending(), "cancelled second run");

    while clock.pending() > 0 {
        clock.advance(5);
    }
    println!("live steps: {}", runtime.live_steps());
}
