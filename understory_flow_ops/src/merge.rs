// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Concurrent flattening.

use alloc::collections::BTreeMap;
use alloc::rc::Rc;
use core::cell::{Cell, RefCell};

use understory_flow::{Iteration, Observer, Operator, Pipeline, Step, Subscription};

struct Merge<T> {
    out: Step<T>,
    active: RefCell<BTreeMap<u64, Subscription>>,
    running: Cell<usize>,
    next_id: Cell<u64>,
    outer_done: Cell<bool>,
}

impl<T: 'static> Merge<T> {
    fn add(this: &Rc<Self>, pipeline: &Pipeline<T>) {
        let id = this.next_id.get();
        this.next_id.set(id + 1);
        this.running.set(this.running.get() + 1);

        let (on_item, on_complete, on_error) = (this.clone(), this.clone(), this.clone());
        let observer = Observer::new(move |v| {
            if on_item.out.is_open() {
                on_item.out.next(v);
            }
        })
        .on_complete(move || {
            on_complete.active.borrow_mut().remove(&id);
            on_complete.running.set(on_complete.running.get() - 1);
            on_complete.try_complete();
        })
        .on_error(move |f| {
            if on_error.out.is_open() {
                on_error.out.error(f);
            }
        });

        let sub = this.out.runtime().subscribe(pipeline, observer);
        if !sub.is_closed() {
            this.active.borrow_mut().insert(id, sub);
        }
    }

    fn try_complete(&self) {
        if self.outer_done.get() && self.running.get() == 0 && self.out.is_open() {
            self.out.complete();
        }
    }

    fn cancel_all(&self) {
        let active = core::mem::take(&mut *self.active.borrow_mut());
        for sub in active.into_values() {
            sub.cancel();
        }
    }
}

/// Flatten a pipeline of pipelines, running every inner pipeline at once.
///
/// Items are forwarded as they arrive. Completes once the outer pipeline and
/// every inner pipeline completed. The first error, outer or inner, is
/// forwarded and cancels everything else.
pub fn merge_all<T: 'static>() -> Operator<Pipeline<T>, T> {
    flat_map(|inner: Pipeline<T>| inner)
}

/// Map every item to a pipeline with `f` and merge the results as
/// [`merge_all`] does.
pub fn flat_map<In, Out, F>(f: F) -> Operator<In, Out>
where
    In: 'static,
    Out: 'static,
    F: Fn(In) -> Pipeline<Out> + 'static,
{
    let f = Rc::new(f);
    Operator::new(move |out: Step<Out>| {
        let state = Rc::new(Merge {
            out: out.clone(),
            active: RefCell::new(BTreeMap::new()),
            running: Cell::new(0),
            next_id: Cell::new(0),
            outer_done: Cell::new(false),
        });
        let teardown = state.clone();
        out.on_teardown(move || {
            teardown.cancel_all();
            Ok(())
        });
        let f = Rc::clone(&f);
        move |it: Iteration<In>, _: u64| {
            match it {
                Iteration::Item(v) => Merge::add(&state, &f(v)),
                Iteration::Complete => {
                    state.outer_done.set(true);
                    state.try_complete();
                }
                Iteration::Error(e) => {
                    if state.out.is_open() {
                        state.out.error(e);
                    }
                }
            }
            Ok(())
        }
    })
}
