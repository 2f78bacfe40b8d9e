// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_flow --heading-base-level=0

//! Understory Flow: deterministic, single-threaded event dispatch.
//!
//! Understory Flow is the delivery core for push-based pipelines: UI event
//! routing, editor command streams, simulation ticks, anything where handlers
//! react to events by emitting more events on the same thread.
//!
//! - Delivers every event in emit order, even when a handler re-emits
//!   synchronously, with constant stack depth.
//! - Accepts at most one terminal event per step and reports misuse instead
//!   of panicking.
//! - Tears pipelines down root-first, idempotently, from any step.
//! - Multicasts through [`Subject`] with causal join: a listener that joins
//!   mid-broadcast never sees the event that was in flight.
//!
//! ## Model
//!
//! - [`Pipeline`]: an inert description of how to produce values. Built from a
//!   source ([`Pipeline::source`]) and [`Operator`]s ([`Pipeline::pipe`]).
//! - [`Runtime::subscribe`]: materializes a pipeline into a chain of live
//!   [`Step`]s and starts it, returning a [`Subscription`].
//! - [`Step`]: one live node. [`Step::next`], [`Step::complete`] and
//!   [`Step::error`] hand an [`Iteration`] to its child through a per-step
//!   FIFO; whoever finds the FIFO empty drains it.
//! - [`Runtime::abandon`] / [`Subscription::cancel`]: the abandon cascade.
//!   Walks to the root, marks every step closed, then runs teardown callbacks
//!   root-most first.
//! - [`Reporter`]: where usage errors ([`UsageError`]) and failures with no
//!   live recipient ([`Origin`]) go. Defaults to [`TracingReporter`].
//!
//! Operators such as map, filter, concat, merge and timers live in the
//! `understory_flow_ops` crate, built only on the public surface here.
//!
//! ## Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use understory_flow::{Iteration, Observer, Operator, Pipeline, Runtime, Step};
//!
//! let runtime = Runtime::new();
//!
//! let numbers = Pipeline::source(|step: Step<u32>| {
//!     for v in 1..=4 {
//!         step.next(v);
//!     }
//!     step.complete();
//!     Ok(())
//! });
//! let squared = Operator::new(|out: Step<u32>| {
//!     move |it: Iteration<u32>, _: u64| {
//!         out.emit_raw(it.map(|v| v * v));
//!         Ok(())
//!     }
//! });
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let sink = seen.clone();
//! let sub = runtime.subscribe(
//!     &numbers.pipe(&squared),
//!     Observer::new(move |v| sink.borrow_mut().push(v)),
//! );
//!
//! assert_eq!(*seen.borrow(), [1, 4, 9, 16]);
//! assert!(sub.is_closed());
//! ```
//!
//! ## Multicast
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use understory_flow::{Observer, Runtime, Subject};
//!
//! let runtime = Runtime::new();
//! let clicks = Subject::<(i32, i32)>::new(&runtime);
//!
//! let log = Rc::new(RefCell::new(Vec::new()));
//! let l = log.clone();
//! let sub = clicks.add_listener(Observer::new(move |p| l.borrow_mut().push(p)));
//!
//! clicks.next((3, 4));
//! sub.cancel();
//! clicks.next((5, 6));
//! assert_eq!(*log.borrow(), [(3, 4)]);
//! ```
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod arena;
mod config;
mod error;
mod iteration;
mod observer;
mod pipeline;
mod report;
mod runtime;
mod step;
mod subject;
mod subscription;

pub mod testing;

pub use arena::{Lifecycle, StepId, Teardown};
pub use config::{RuntimeConfig, TraceFlags};
pub use error::{Origin, UsageError};
pub use iteration::{Failure, Iteration, IterationKind};
pub use observer::Observer;
pub use pipeline::{Operator, Pipeline};
pub use report::{Reporter, TracingReporter};
pub use runtime::Runtime;
pub use step::{Controller, Step};
pub use subject::Subject;
pub use subscription::Subscription;
