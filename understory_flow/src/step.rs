// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Steps and their dispatch queues.
//!
//! ## Overview
//!
//! A [`Step<T>`] is the emitting side of one node in a live pipeline: it emits
//! `T`s into the controller of its child. Every step owns a FIFO of pending
//! iterations, and whoever finds that FIFO empty when emitting becomes its
//! drain loop. A controller that synchronously emits again on the same step
//! only appends; the running loop picks the new iteration up after the current
//! delivery returns. Delivery is therefore strictly ordered, never nested, and
//! uses constant stack depth no matter how long a re-emission chain grows.
//!
//! ## Terminal iterations
//!
//! - Accepting `Complete`/`Error` moves the step to
//!   [`Closing`](crate::Lifecycle::Closing) before anything is delivered.
//! - When the terminal iteration reaches the head of the queue, the abandon
//!   cascade runs on this step first, and only then is the child invoked. The
//!   child therefore observes its upstream already released.
//!
//! ## Controller failures
//!
//! If the child's controller returns `Err`, this step is abandoned (its
//! remaining queue is discarded) and the failure is re-emitted by the child as
//! an error iteration when the child is still open and has a downstream.
//! Otherwise the failure goes to the runtime's
//! [`Reporter`](crate::report::Reporter).

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::rc::Rc;
use core::cell::{Cell, RefCell};
use core::fmt;

use crate::arena::{Lifecycle, StepId};
use crate::config::TraceFlags;
use crate::error::{Origin, UsageError};
use crate::iteration::{Failure, Iteration};
use crate::runtime::Runtime;

/// Callback receiving what a step's parent emits, with its sequence index.
///
/// Returning `Err` is a handler failure; see the [module docs](self).
pub type Controller<T> = Box<dyn FnMut(Iteration<T>, u64) -> Result<(), Failure>>;

/// The emitting handle of a live step.
///
/// Cloning is cheap and every clone refers to the same step.
pub struct Step<T> {
    runtime: Runtime,
    port: Rc<Port<T>>,
}

impl<T> Clone for Step<T> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            port: Rc::clone(&self.port),
        }
    }
}

impl<T> fmt::Debug for Step<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("id", &self.port.id)
            .field("state", &self.runtime.state(self.port.id))
            .field("pending", &self.port.queue.borrow().len())
            .field("next_index", &self.port.next_index.get())
            .finish()
    }
}

struct Pending<T> {
    // Taken while in flight; the node stays queued until delivery returns so
    // re-entrant emitters see a non-empty queue.
    iteration: Option<Iteration<T>>,
    index: u64,
}

struct Port<T> {
    id: StepId,
    queue: RefCell<VecDeque<Pending<T>>>,
    next_index: Cell<u64>,
    child: RefCell<Option<Rc<Inlet<T>>>>,
}

impl<T> Port<T> {
    /// Take the head iteration for delivery, leaving its node in place.
    fn take_head(&self) -> Option<(Iteration<T>, u64)> {
        let mut queue = self.queue.borrow_mut();
        let head = queue.front_mut()?;
        let iteration = head.iteration.take()?;
        Some((iteration, head.index))
    }

    fn pop_head(&self) {
        self.queue.borrow_mut().pop_front();
    }

    /// Discard everything still queued.
    fn abort(&self) -> VecDeque<Pending<T>> {
        core::mem::take(&mut *self.queue.borrow_mut())
    }
}

/// Receiving end of a step: its controller plus a way to fail downstream.
pub(crate) struct Inlet<T> {
    owner: StepId,
    controller: RefCell<Option<Controller<T>>>,
    fallback: Box<dyn Redirect>,
}

impl<T> Inlet<T> {
    /// Build the inlet of `owner`, fed by whatever `owner`'s parent emits.
    pub(crate) fn new<U: 'static>(owner: &Step<U>, controller: Option<Controller<T>>) -> Rc<Self> {
        Rc::new(Self {
            owner: owner.id(),
            controller: RefCell::new(controller),
            fallback: Box::new(owner.clone()),
        })
    }

    pub(crate) fn owner(&self) -> StepId {
        self.owner
    }

    fn invoke(&self, iteration: Iteration<T>, index: u64) -> Result<(), Failure> {
        let taken = self.controller.borrow_mut().take();
        let Some(mut controller) = taken else {
            return Ok(());
        };
        let outcome = controller(iteration, index);
        let mut slot = self.controller.borrow_mut();
        if slot.is_none() {
            *slot = Some(controller);
        }
        outcome
    }

    fn redirect(&self, runtime: &Runtime, failure: Failure) {
        if let Err(failure) = self.fallback.redirect(failure) {
            runtime.report_unhandled(Origin::Handler { step: self.owner }, &failure);
            runtime.abandon(self.owner);
        }
    }
}

/// Type-erased "emit this failure downstream of me".
trait Redirect {
    fn redirect(&self, failure: Failure) -> Result<(), Failure>;
}

impl<U: 'static> Redirect for Step<U> {
    fn redirect(&self, failure: Failure) -> Result<(), Failure> {
        if self.is_open() && self.live_child().is_some() {
            self.error(failure);
            Ok(())
        } else {
            Err(failure)
        }
    }
}

impl<T> Step<T> {
    /// The step's identifier.
    pub fn id(&self) -> StepId {
        self.port.id
    }

    /// The runtime this step belongs to.
    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    /// Current lifecycle state.
    pub fn state(&self) -> Lifecycle {
        self.runtime.state(self.port.id)
    }

    /// True while the step still accepts iterations.
    pub fn is_open(&self) -> bool {
        self.state() == Lifecycle::Open
    }

    /// Sequence index the next accepted emission will receive.
    pub fn next_index(&self) -> u64 {
        self.port.next_index.get()
    }

    /// Number of iterations accepted but not yet delivered (including one in flight).
    pub fn pending(&self) -> usize {
        self.port.queue.borrow().len()
    }
}

impl<T: 'static> Step<T> {
    /// Allocate a fresh, unlinked step in `runtime`.
    pub(crate) fn new(runtime: &Runtime) -> Self {
        Self {
            runtime: runtime.clone(),
            port: Rc::new(Port {
                id: runtime.alloc_step(),
                queue: RefCell::new(VecDeque::new()),
                next_index: Cell::new(0),
                child: RefCell::new(None),
            }),
        }
    }

    /// Wire `inlet`'s owner as this step's child.
    pub(crate) fn attach(&self, inlet: Rc<Inlet<T>>) {
        if self.runtime.link(self.port.id, inlet.owner()) {
            *self.port.child.borrow_mut() = Some(inlet);
        }
    }

    /// Emit an item.
    pub fn next(&self, value: T) {
        self.emit_raw(Iteration::Item(value));
    }

    /// Emit normal completion.
    pub fn complete(&self) {
        self.emit_raw(Iteration::Complete);
    }

    /// Emit an error completion.
    pub fn error(&self, failure: impl Into<Failure>) {
        self.emit_raw(Iteration::Error(failure.into()));
    }

    /// Register the callback run when this step is released by an abandon
    /// cascade, replacing any earlier one.
    ///
    /// If the step is already released the callback runs immediately.
    pub fn on_teardown<F>(&self, teardown: F)
    where
        F: FnOnce() -> Result<(), Failure> + 'static,
    {
        self.runtime.set_teardown(self.port.id, Box::new(teardown));
    }

    /// Run the abandon cascade from this step.
    pub fn abandon(&self) {
        self.runtime.abandon(self.port.id);
    }

    /// Hand an iteration to the child, queueing behind any delivery in progress.
    pub fn emit_raw(&self, iteration: Iteration<T>) {
        let id = self.port.id;
        let state = self.runtime.state(id);
        if state != Lifecycle::Open {
            self.runtime.report_usage(&UsageError::NotOpen {
                step: id,
                state,
                kind: iteration.kind(),
            });
            self.drop_iteration(iteration);
            return;
        }
        if iteration.is_terminal() {
            self.runtime.begin_closing(id);
        }
        if self.live_child().is_none() {
            self.drop_iteration(iteration);
            return;
        }

        let index = self.port.next_index.get();
        self.port.next_index.set(index + 1);
        if self.runtime.traces(TraceFlags::EMIT) {
            tracing::trace!(step = %id, kind = %iteration.kind(), index, "emit");
        }
        let was_idle = {
            let mut queue = self.port.queue.borrow_mut();
            let idle = queue.is_empty();
            queue.push_back(Pending {
                iteration: Some(iteration),
                index,
            });
            idle
        };
        if was_idle {
            self.drain();
        }
    }

    fn drain(&self) {
        let id = self.port.id;
        while let Some((iteration, index)) = self.port.take_head() {
            let Some(inlet) = self.live_child() else {
                // Abandoned mid-drain: nothing downstream will ever see the rest.
                self.drop_iteration(iteration);
                self.discard_queue();
                return;
            };
            if iteration.is_terminal() {
                self.runtime.abandon(id);
            }
            if self.runtime.traces(TraceFlags::DELIVER) {
                tracing::trace!(step = %id, child = %inlet.owner(), index, kind = %iteration.kind(), "deliver");
            }
            if let Err(failure) = inlet.invoke(iteration, index) {
                self.runtime.abandon(id);
                self.discard_queue();
                inlet.redirect(&self.runtime, failure);
                return;
            }
            self.port.pop_head();
        }
    }

    /// The child's inlet, if the arena still links this step to it.
    fn live_child(&self) -> Option<Rc<Inlet<T>>> {
        let linked = self.runtime.child_of(self.port.id);
        let mut slot = self.port.child.borrow_mut();
        match (&*slot, linked) {
            (Some(inlet), Some(child)) if inlet.owner() == child => Some(Rc::clone(inlet)),
            _ => {
                *slot = None;
                None
            }
        }
    }

    fn discard_queue(&self) {
        for rest in self.port.abort() {
            if let Some(it) = rest.iteration {
                self.drop_iteration(it);
            }
        }
    }

    fn drop_iteration(&self, iteration: Iteration<T>) {
        if let Iteration::Error(failure) = iteration {
            self.runtime
                .report_unhandled(Origin::Dropped { step: self.port.id }, &failure);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RuntimeConfig;
    use crate::testing::RecordingReporter;
    use alloc::vec;
    use alloc::vec::Vec;

    type Log<T> = Rc<RefCell<Vec<T>>>;

    fn runtime() -> (Runtime, Rc<RecordingReporter>) {
        let rec = RecordingReporter::new();
        (
            Runtime::with_reporter(RuntimeConfig::default(), Rc::clone(&rec)),
            rec,
        )
    }

    /// A parent step wired to a child step whose controller logs (iteration, index).
    fn pair<T: Clone + 'static>(rt: &Runtime) -> (Step<T>, Step<()>, Log<(Iteration<T>, u64)>) {
        let parent = Step::<T>::new(rt);
        let child = Step::<()>::new(rt);
        let log: Log<(Iteration<T>, u64)> = Rc::default();
        let l = log.clone();
        parent.attach(Inlet::new(
            &child,
            Some(Box::new(move |it: Iteration<T>, idx: u64| {
                l.borrow_mut().push((it, idx));
                Ok(())
            })),
        ));
        (parent, child, log)
    }

    #[test]
    fn delivers_in_emit_order_with_indices() {
        let (rt, rec) = runtime();
        let (parent, _child, log) = pair::<u32>(&rt);
        parent.next(10);
        parent.next(11);
        parent.complete();
        assert_eq!(
            *log.borrow(),
            vec![
                (Iteration::Item(10), 0),
                (Iteration::Item(11), 1),
                (Iteration::Complete, 2)
            ]
        );
        assert!(rec.is_quiet());
    }

    #[test]
    fn reentrant_emission_is_queued_not_nested() {
        let (rt, _rec) = runtime();
        let parent = Step::<u32>::new(&rt);
        let child = Step::<()>::new(&rt);
        let log: Log<(&'static str, u32)> = Rc::default();
        let (l, p) = (log.clone(), parent.clone());
        parent.attach(Inlet::new(
            &child,
            Some(Box::new(move |it: Iteration<u32>, _: u64| {
                if let Iteration::Item(v) = it {
                    l.borrow_mut().push(("enter", v));
                    if v == 1 {
                        p.next(2);
                        // The re-emission is pending, not delivered.
                        assert_eq!(p.pending(), 2);
                    }
                    l.borrow_mut().push(("leave", v));
                }
                Ok(())
            })),
        ));
        parent.next(1);
        assert_eq!(
            *log.borrow(),
            vec![("enter", 1), ("leave", 1), ("enter", 2), ("leave", 2)]
        );
        assert_eq!(parent.pending(), 0);
    }

    #[test]
    fn terminal_closes_before_delivery_and_releases_upstream() {
        let (rt, _rec) = runtime();
        let parent = Step::<u32>::new(&rt);
        let child = Step::<()>::new(&rt);
        let seen: Log<(Lifecycle, Option<StepId>)> = Rc::default();
        let (s, p, r) = (seen.clone(), parent.clone(), rt.clone());
        let child_id = child.id();
        parent.attach(Inlet::new(
            &child,
            Some(Box::new(move |_: Iteration<u32>, _: u64| {
                s.borrow_mut().push((p.state(), r.parent_of(child_id)));
                Ok(())
            })),
        ));
        parent.complete();
        // Upstream already released, and the child's parent link cut.
        assert_eq!(*seen.borrow(), vec![(Lifecycle::Closed, None)]);
        assert_eq!(parent.state(), Lifecycle::Closed);
        assert!(child.is_open());
    }

    #[test]
    fn closing_state_is_visible_to_queued_deliveries() {
        let (rt, _rec) = runtime();
        let parent = Step::<u32>::new(&rt);
        let child = Step::<()>::new(&rt);
        let seen: Log<Lifecycle> = Rc::default();
        let (s, p) = (seen.clone(), parent.clone());
        parent.attach(Inlet::new(
            &child,
            Some(Box::new(move |it: Iteration<u32>, _: u64| {
                if let Iteration::Item(1) = it {
                    p.complete();
                }
                s.borrow_mut().push(p.state());
                Ok(())
            })),
        ));
        parent.next(1);
        assert_eq!(*seen.borrow(), vec![Lifecycle::Closing, Lifecycle::Closed]);
    }

    #[test]
    fn second_terminal_is_a_usage_error() {
        let (rt, rec) = runtime();
        let (parent, _child, log) = pair::<u32>(&rt);
        parent.complete();
        parent.complete();
        parent.next(5);
        assert_eq!(log.borrow().len(), 1);
        let usage = rec.usage_errors();
        assert_eq!(usage.len(), 2);
        assert!(matches!(
            usage[0],
            UsageError::NotOpen {
                state: Lifecycle::Closed,
                kind: crate::IterationKind::Complete,
                ..
            }
        ));
    }

    #[test]
    fn error_on_closed_step_is_reported_twice() {
        let (rt, rec) = runtime();
        let (parent, _child, _log) = pair::<u32>(&rt);
        parent.complete();
        parent.error(Failure::msg("late"));
        assert_eq!(rec.usage_errors().len(), 1);
        let unhandled = rec.unhandled_failures();
        assert_eq!(unhandled.len(), 1);
        assert_eq!(unhandled[0].0, Origin::Dropped { step: parent.id() });
    }

    #[test]
    fn no_child_is_a_silent_noop_beyond_closing() {
        let (rt, rec) = runtime();
        let lonely = Step::<u32>::new(&rt);
        lonely.next(1);
        assert!(lonely.is_open());
        assert_eq!(lonely.next_index(), 0);
        lonely.complete();
        assert_eq!(lonely.state(), Lifecycle::Closing);
        assert!(rec.is_quiet());
    }

    #[test]
    fn abandon_mid_drain_discards_rest() {
        let (rt, rec) = runtime();
        let parent = Step::<u32>::new(&rt);
        let child = Step::<()>::new(&rt);
        let log: Log<u32> = Rc::default();
        let (l, p) = (log.clone(), parent.clone());
        parent.attach(Inlet::new(
            &child,
            Some(Box::new(move |it: Iteration<u32>, _: u64| {
                if let Iteration::Item(v) = it {
                    l.borrow_mut().push(v);
                    if v == 1 {
                        p.next(2);
                        p.next(3);
                        p.abandon();
                    }
                }
                Ok(())
            })),
        ));
        parent.next(1);
        assert_eq!(*log.borrow(), vec![1]);
        assert_eq!(parent.pending(), 0);
        assert!(rec.is_quiet());
    }

    #[test]
    fn handler_failure_is_redirected_downstream() {
        let (rt, rec) = runtime();
        // upstream -> middle -> sink
        let upstream = Step::<u32>::new(&rt);
        let middle = Step::<u32>::new(&rt);
        let sink = Step::<()>::new(&rt);
        let got: Log<Iteration<u32>> = Rc::default();
        let g = got.clone();
        middle.attach(Inlet::new(
            &sink,
            Some(Box::new(move |it: Iteration<u32>, _: u64| {
                g.borrow_mut().push(it);
                Ok(())
            })),
        ));
        let m = middle.clone();
        upstream.attach(Inlet::new(
            &middle,
            Some(Box::new(move |it: Iteration<u32>, _: u64| match it {
                Iteration::Item(0) => Err(Failure::msg("zero")),
                other => {
                    m.emit_raw(other);
                    Ok(())
                }
            })),
        ));
        upstream.next(1);
        upstream.next(0);
        upstream.next(2);
        assert_eq!(
            *got.borrow(),
            vec![Iteration::Item(1), Iteration::Error(Failure::msg("zero"))]
        );
        assert_eq!(upstream.state(), Lifecycle::Closed);
        assert_eq!(middle.state(), Lifecycle::Closed);
        // The late `next(2)` hit a released step.
        assert_eq!(rec.usage_errors().len(), 1);
        assert!(rec.unhandled_failures().is_empty());
    }

    #[test]
    fn handler_failure_without_downstream_is_unhandled() {
        let (rt, rec) = runtime();
        let upstream = Step::<u32>::new(&rt);
        let sink = Step::<()>::new(&rt);
        upstream.attach(Inlet::new(
            &sink,
            Some(Box::new(|_: Iteration<u32>, _: u64| Err(Failure::msg("sink broke")))),
        ));
        upstream.next(1);
        let unhandled = rec.unhandled_failures();
        assert_eq!(unhandled.len(), 1);
        assert_eq!(unhandled[0].0, Origin::Handler { step: sink.id() });
        assert_eq!(sink.state(), Lifecycle::Closed);
        assert_eq!(upstream.state(), Lifecycle::Closed);
    }

    #[test]
    fn queued_error_is_reported_when_handler_fails() {
        let (rt, rec) = runtime();
        let upstream = Step::<u32>::new(&rt);
        let sink = Step::<()>::new(&rt);
        let up = upstream.clone();
        upstream.attach(Inlet::new(
            &sink,
            Some(Box::new(move |_: Iteration<u32>, _: u64| {
                up.error(Failure::msg("queued upstream error"));
                Err(Failure::msg("handler"))
            })),
        ));
        upstream.next(1);
        assert_eq!(upstream.pending(), 0);
        let unhandled = rec.unhandled_failures();
        assert_eq!(unhandled.len(), 2);
        assert_eq!(
            unhandled[0],
            (
                Origin::Dropped { step: upstream.id() },
                Failure::msg("queued upstream error")
            )
        );
        assert_eq!(
            unhandled[1],
            (Origin::Handler { step: sink.id() }, Failure::msg("handler"))
        );
    }

    #[test]
    fn ten_thousand_chained_reemissions_stay_flat() {
        let (rt, _rec) = runtime();
        let parent = Step::<u32>::new(&rt);
        let child = Step::<()>::new(&rt);
        let depth = Rc::new(Cell::new(0_u32));
        let max_depth = Rc::new(Cell::new(0_u32));
        let log: Log<u32> = Rc::default();
        let (l, p, d, m) = (log.clone(), parent.clone(), depth.clone(), max_depth.clone());
        parent.attach(Inlet::new(
            &child,
            Some(Box::new(move |it: Iteration<u32>, _: u64| {
                d.set(d.get() + 1);
                m.set(m.get().max(d.get()));
                if let Iteration::Item(v) = it {
                    l.borrow_mut().push(v);
                    if v < 10_000 {
                        p.next(v + 1);
                    }
                }
                d.set(d.get() - 1);
                Ok(())
            })),
        ));
        parent.next(0);
        let log = log.borrow();
        assert_eq!(log.len(), 10_001);
        assert!(log.iter().copied().eq(0..=10_000));
        assert_eq!(max_depth.get(), 1);
    }

    #[test]
    fn controllerless_step_drops_input() {
        let (rt, rec) = runtime();
        let parent = Step::<u32>::new(&rt);
        let child = Step::<()>::new(&rt);
        parent.attach(Inlet::new(&child, None));
        parent.next(1);
        parent.complete();
        assert_eq!(parent.state(), Lifecycle::Closed);
        assert!(rec.is_quiet());
    }
}
