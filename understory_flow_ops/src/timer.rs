// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Logical-time scheduling and timers.
//!
//! ## Overview
//!
//! Time is external to the runtime. A [`Scheduler`] runs callbacks after a
//! delay measured in ticks; whatever drives it (a frame loop, an event loop,
//! a test) decides what a tick means. Timer callbacks re-enter the runtime
//! through ordinary emissions.
//!
//! [`ManualScheduler`] is a deterministic implementation stepped explicitly
//! with [`ManualScheduler::advance`]. Tasks due at the same tick run in the
//! order they were scheduled.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, BTreeSet};
use alloc::rc::Rc;
use core::cell::RefCell;
use core::fmt;

use understory_flow::{Iteration, Operator, Pipeline, Step};

/// Work queued on a [`Scheduler`].
pub type Task = Box<dyn FnOnce()>;

/// Handle to a scheduled task. Orders by due tick, then scheduling order.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TimerId {
    due: u64,
    seq: u64,
}

impl TimerId {
    /// The tick the task is due at.
    pub fn due(&self) -> u64 {
        self.due
    }
}

/// Source of delayed callbacks.
pub trait Scheduler {
    /// Current tick.
    fn now(&self) -> u64;

    /// Run `task` once, `delay` ticks from now.
    fn schedule(&self, delay: u64, task: Task) -> TimerId;

    /// Drop a task that has not run yet. Returns false if it already ran or was cancelled.
    fn cancel(&self, id: TimerId) -> bool;
}

#[derive(Default)]
struct Queue {
    now: u64,
    next_seq: u64,
    tasks: BTreeMap<TimerId, Task>,
}

/// Deterministic scheduler driven by [`advance`](Self::advance).
///
/// Cloning is cheap and every clone shares the same queue.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    queue: Rc<RefCell<Queue>>,
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let queue = self.queue.borrow();
        f.debug_struct("ManualScheduler")
            .field("now", &queue.now)
            .field("pending", &queue.tasks.len())
            .finish()
    }
}

impl ManualScheduler {
    /// A scheduler at tick zero with nothing queued.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.borrow().tasks.len()
    }

    /// Move time forward by `ticks`, running every task that falls due.
    ///
    /// Tasks scheduled while advancing run too if they fall due before the
    /// target tick. Returns the number of tasks run.
    pub fn advance(&self, ticks: u64) -> usize {
        let target = self.queue.borrow().now.saturating_add(ticks);
        let mut ran = 0;
        loop {
            let due = {
                let mut queue = self.queue.borrow_mut();
                match queue.tasks.first_key_value() {
                    Some((id, _)) if id.due <= target => {
                        let id = *id;
                        queue.now = id.due;
                        queue.tasks.remove(&id)
                    }
                    _ => None,
                }
            };
            let Some(task) = due else { break };
            task();
            ran += 1;
        }
        self.queue.borrow_mut().now = target;
        ran
    }
}

impl Scheduler for ManualScheduler {
    fn now(&self) -> u64 {
        self.queue.borrow().now
    }

    fn schedule(&self, delay: u64, task: Task) -> TimerId {
        let mut queue = self.queue.borrow_mut();
        let id = TimerId {
            due: queue.now.saturating_add(delay),
            seq: queue.next_seq,
        };
        queue.next_seq += 1;
        queue.tasks.insert(id, task);
        id
    }

    fn cancel(&self, id: TimerId) -> bool {
        self.queue.borrow_mut().tasks.remove(&id).is_some()
    }
}

/// Emit the scheduler's tick `delay` ticks after subscription, then complete.
///
/// Cancelling before it fires removes the pending task from the scheduler.
pub fn timer<S>(scheduler: &S, delay: u64) -> Pipeline<u64>
where
    S: Scheduler + Clone + 'static,
{
    let scheduler = scheduler.clone();
    Pipeline::source(move |step: Step<u64>| {
        let fire = step.clone();
        let clock = scheduler.clone();
        let id = scheduler.schedule(
            delay,
            Box::new(move || {
                if fire.is_open() {
                    fire.next(clock.now());
                    fire.complete();
                }
            }),
        );
        let scheduler = scheduler.clone();
        step.on_teardown(move || {
            scheduler.cancel(id);
            Ok(())
        });
        Ok(())
    })
}

/// Shift every iteration `ticks` later, preserving order.
pub fn delay<T, S>(scheduler: &S, ticks: u64) -> Operator<T, T>
where
    T: 'static,
    S: Scheduler + Clone + 'static,
{
    let scheduler = scheduler.clone();
    Operator::new(move |out: Step<T>| {
        let scheduled: Rc<RefCell<BTreeSet<TimerId>>> = Rc::default();
        let (sched, pending) = (scheduler.clone(), scheduled.clone());
        out.on_teardown(move || {
            let ids = core::mem::take(&mut *pending.borrow_mut());
            for id in ids {
                sched.cancel(id);
            }
            Ok(())
        });
        let scheduler = scheduler.clone();
        move |it: Iteration<T>, _: u64| {
            let (fire, done) = (out.clone(), scheduled.clone());
            let slot: Rc<RefCell<Option<TimerId>>> = Rc::default();
            let own = slot.clone();
            let id = scheduler.schedule(
                ticks,
                Box::new(move || {
                    if let Some(id) = own.borrow_mut().take() {
                        done.borrow_mut().remove(&id);
                    }
                    if fire.is_open() {
                        fire.emit_raw(it);
                    }
                }),
            );
            *slot.borrow_mut() = Some(id);
            scheduled.borrow_mut().insert(id);
            Ok(())
        }
    })
}
