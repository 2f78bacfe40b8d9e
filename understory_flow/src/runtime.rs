// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The [`Runtime`]: step arena, reporter, and the abandon cascade.
//!
//! ## Overview
//!
//! Everything that runs belongs to a runtime. It owns the [`StepArena`] with
//! every live step's lifecycle state and ownership links, the [`Reporter`]
//! that receives diagnostics, and the trace settings. A `Runtime` is a cheap
//! handle; clones share the same state.
//!
//! The runtime is single-threaded and never suspends. Asynchrony (timers,
//! deferred values) lives outside and re-enters through ordinary emissions.
//!
//! ## Abandon cascade
//!
//! [`Runtime::abandon`] walks from a step through its parent links to the
//! root, marking each step closed, clearing its links, and collecting its
//! teardown callback. Callbacks then run root-most first, so whatever produces
//! data is always released before what consumes it. A failing teardown is
//! reported and does not stop the rest. Abandoning an already-released step
//! does nothing.

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::cell::{Cell, RefCell};
use core::fmt;

use crate::arena::{Lifecycle, StepArena, StepId, Teardown};
use crate::config::{RuntimeConfig, TraceFlags};
use crate::error::{Origin, UsageError};
use crate::iteration::Failure;
use crate::observer::Observer;
use crate::pipeline::Pipeline;
use crate::report::{Reporter, TracingReporter};
use crate::step::{Inlet, Step};
use crate::subscription::Subscription;

/// Handle to a single-threaded event-delivery engine.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<Inner>,
}

struct Inner {
    arena: RefCell<StepArena>,
    reporter: Box<dyn Reporter>,
    trace: Cell<TraceFlags>,
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("arena", &*self.inner.arena.borrow())
            .field("trace", &self.inner.trace.get())
            .finish_non_exhaustive()
    }
}

impl Runtime {
    /// A runtime with default settings, reporting through [`TracingReporter`].
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    /// A runtime with the given settings, reporting through [`TracingReporter`].
    pub fn with_config(config: RuntimeConfig) -> Self {
        Self::with_reporter(config, TracingReporter)
    }

    /// A runtime reporting to `reporter`.
    pub fn with_reporter(config: RuntimeConfig, reporter: impl Reporter + 'static) -> Self {
        Self {
            inner: Rc::new(Inner {
                arena: RefCell::new(StepArena::with_capacity(config.step_capacity)),
                reporter: Box::new(reporter),
                trace: Cell::new(config.trace),
            }),
        }
    }

    /// Replace the traced dispatch categories.
    pub fn set_trace(&self, trace: TraceFlags) {
        self.inner.trace.set(trace);
    }

    /// Currently traced dispatch categories.
    pub fn trace(&self) -> TraceFlags {
        self.inner.trace.get()
    }

    /// Lifecycle state of `id`. Released and unknown ids read as closed.
    pub fn state(&self, id: StepId) -> Lifecycle {
        self.inner.arena.borrow().state(id)
    }

    /// Number of steps not yet released.
    pub fn live_steps(&self) -> usize {
        self.inner.arena.borrow().live()
    }

    /// True if both handles refer to the same runtime.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Materialize `pipeline` and start it, delivering into `observer`.
    ///
    /// Steps are created consumer-first; the source's open function runs last
    /// and may emit synchronously before this returns.
    pub fn subscribe<T: 'static>(&self, pipeline: &Pipeline<T>, observer: Observer<T>) -> Subscription {
        let sink = Step::<()>::new(self);
        let subscription = Subscription::new(self.clone(), sink.id());
        let controller = observer.into_controller(sink.clone());
        pipeline.materialize(self, Inlet::new(&sink, Some(controller)));
        subscription
    }

    /// Run the abandon cascade from `id`.
    pub fn abandon(&self, id: StepId) {
        let released = self.inner.arena.borrow_mut().release_chain(id);
        if released.is_empty() {
            return;
        }
        if self.traces(TraceFlags::CASCADE) {
            tracing::trace!(from = %id, released = released.len(), "abandon cascade");
        }
        for (step, teardown) in released.into_iter().rev() {
            if let Some(teardown) = teardown {
                self.run_teardown(step, teardown);
            }
        }
    }

    fn run_teardown(&self, step: StepId, teardown: Teardown) {
        if let Err(failure) = teardown() {
            self.report_unhandled(Origin::Teardown { step }, &failure);
        }
    }

    pub(crate) fn alloc_step(&self) -> StepId {
        self.inner.arena.borrow_mut().insert()
    }

    pub(crate) fn link(&self, parent: StepId, child: StepId) -> bool {
        self.inner.arena.borrow_mut().link(parent, child)
    }

    pub(crate) fn child_of(&self, id: StepId) -> Option<StepId> {
        self.inner.arena.borrow().child(id)
    }

    #[cfg(test)]
    pub(crate) fn parent_of(&self, id: StepId) -> Option<StepId> {
        self.inner.arena.borrow().parent(id)
    }

    pub(crate) fn begin_closing(&self, id: StepId) -> bool {
        self.inner.arena.borrow_mut().begin_closing(id)
    }

    pub(crate) fn set_teardown(&self, id: StepId, teardown: Teardown) {
        let rejected = self.inner.arena.borrow_mut().set_teardown(id, teardown);
        if let Err(teardown) = rejected {
            self.run_teardown(id, teardown);
        }
    }

    pub(crate) fn report_usage(&self, error: &UsageError) {
        self.inner.reporter.usage(error);
    }

    pub(crate) fn report_unhandled(&self, origin: Origin, failure: &Failure) {
        self.inner.reporter.unhandled(origin, failure);
    }

    pub(crate) fn traces(&self, category: TraceFlags) -> bool {
        self.inner.trace.get().intersects(category)
    }
}
