// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use understory_flow::{Failure, Observer, Pipeline, Runtime, Subscription};

/// Everything one subscription observed.
#[derive(Clone)]
pub(crate) struct Collected<T> {
    items: Rc<RefCell<Vec<T>>>,
    completed: Rc<Cell<bool>>,
    failure: Rc<RefCell<Option<Failure>>>,
    pub(crate) subscription: Subscription,
}

impl<T: Clone> Collected<T> {
    pub(crate) fn items(&self) -> Vec<T> {
        self.items.borrow().clone()
    }

    pub(crate) fn completed(&self) -> bool {
        self.completed.get()
    }

    pub(crate) fn failure(&self) -> Option<Failure> {
        self.failure.borrow().clone()
    }
}

/// Subscribe to `pipeline`, recording items and the terminal outcome.
pub(crate) fn collect<T: Clone + 'static>(runtime: &Runtime, pipeline: &Pipeline<T>) -> Collected<T> {
    let items: Rc<RefCell<Vec<T>>> = Rc::default();
    let completed = Rc::new(Cell::new(false));
    let failure: Rc<RefCell<Option<Failure>>> = Rc::default();
    let (i, c, f) = (items.clone(), completed.clone(), failure.clone());
    let subscription = runtime.subscribe(
        pipeline,
        Observer::new(move |v| i.borrow_mut().push(v))
            .on_complete(move || c.set(true))
            .on_error(move |e| *f.borrow_mut() = Some(e)),
    );
    Collected {
        items,
        completed,
        failure,
        subscription,
    }
}
