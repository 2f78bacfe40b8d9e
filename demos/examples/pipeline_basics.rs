// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Pipeline basics.
//!
//! Build a pipeline from a source and a few operators, subscribe twice, and
//! watch each subscription get its own independent chain of steps.
//!
//! Run:
//! - `cargo run -p understory_demos --example pipeline_basics`
//! - `RUST_LOG=understory_flow=trace cargo run -p understory_demos --example pipeline_basics`

use tracing_subscriber::EnvFilter;
use understory_flow::{Observer, Runtime, RuntimeConfig, TraceFlags};
use understory_flow_ops::{filter, map, of, take};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let runtime = Runtime::with_config(RuntimeConfig::default().with_trace(TraceFlags::all()));

    let squares = of(1..=10_u32)
        .pipe(&filter(|v: &u32| v % 2 == 1))
        .pipe(&map(|v: u32| v * v))
        .pipe(&take(3));

    for label in ["first", "second"] {
        let sub = runtime.subscribe(
            &squares,
            Observer::new(move |v: u32| println!("{label}: {v}"))
                .on_complete(move || println!("{label}: done")),
        );
        println!("{label}: closed={}", sub.is_closed());
    }

    println!("live steps after both runs: {}", runtime.live_steps());
}
