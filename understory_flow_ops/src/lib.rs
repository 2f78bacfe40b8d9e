// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

// After you edit the crate's doc comment, run this command, then check README.md for any missing links
// cargo rdme --workspace-project=understory_flow_ops --heading-base-level=0

//! Understory Flow Ops: sources and operators for [`understory_flow`].
//!
//! Everything here is built only on the public contract of the core crate:
//! [`Pipeline::source`](understory_flow::Pipeline::source),
//! [`Operator::new`](understory_flow::Operator::new), the emitting methods of
//! [`Step`](understory_flow::Step), and internal subscriptions cancelled from
//! teardown callbacks.
//!
//! - Sources: [`of`], [`from_iter`], [`empty`], [`fail`].
//! - Per-item: [`map`], [`try_map`], [`filter`], [`take`].
//! - Composition: [`concat`] (one after another), [`merge_all`] and
//!   [`flat_map`] (all at once).
//! - Deferred values: [`Deferred`], [`from_deferred`], [`settle_all`].
//! - Time: the [`Scheduler`] trait, the deterministic [`ManualScheduler`],
//!   [`timer`] and [`delay`].
//!
//! ## Example
//!
//! ```rust
//! use std::cell::RefCell;
//! use std::rc::Rc;
//! use understory_flow::{Observer, Runtime};
//! use understory_flow_ops::{ManualScheduler, concat, filter, map, of, timer};
//!
//! let runtime = Runtime::new();
//! let clock = ManualScheduler::new();
//!
//! let evens = of(1..=6_u64).pipe(&filter(|v: &u64| v % 2 == 0));
//! let later = timer(&clock, 10).pipe(&map(|tick: u64| tick * 100));
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let s = seen.clone();
//! runtime.subscribe(
//!     &concat([evens, later]),
//!     Observer::new(move |v| s.borrow_mut().push(v)),
//! );
//! assert_eq!(*seen.borrow(), [2, 4, 6]);
//!
//! clock.advance(10);
//! assert_eq!(*seen.borrow(), [2, 4, 6, 1000]);
//! ```
//!
//! This crate is `no_std` and uses `alloc`.

#![no_std]

extern crate alloc;

mod concat;
mod deferred;
mod merge;
mod source;
mod timer;
mod transform;

#[cfg(test)]
mod testing;

pub use concat::concat;
pub use deferred::{Deferred, from_deferred, settle_all};
pub use merge::{flat_map, merge_all};
pub use source::{empty, fail, from_iter, of};
pub use timer::{ManualScheduler, Scheduler, Task, TimerId, delay, timer};
pub use transform::{filter, map, take, try_map};
