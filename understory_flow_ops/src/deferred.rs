// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Values that settle later, at most once.
//!
//! A [`Deferred<T>`] is a write-once cell with waiters: it is resolved with a
//! value or rejected with a [`Failure`], and every pipeline built from it with
//! [`from_deferred`] emits that outcome. Subscriptions made after settlement
//! receive the outcome immediately.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;
use core::fmt;

use understory_flow::{Failure, Operator, Pipeline, Step};

use crate::merge::flat_map;

struct Shared<T> {
    outcome: RefCell<Option<Result<T, Failure>>>,
    waiters: RefCell<Vec<Step<T>>>,
}

/// A value that is resolved or rejected exactly once, possibly later.
pub struct Deferred<T> {
    shared: Rc<Shared<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.shared.outcome.borrow() {
            None => "pending",
            Some(Ok(_)) => "resolved",
            Some(Err(_)) => "rejected",
        };
        f.debug_struct("Deferred")
            .field("state", &state)
            .field("waiters", &self.shared.waiters.borrow().len())
            .finish()
    }
}

impl<T: Clone + 'static> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Deferred<T> {
    /// A pending value.
    pub fn new() -> Self {
        Self {
            shared: Rc::new(Shared {
                outcome: RefCell::new(None),
                waiters: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Settle with `value`. Returns false, changing nothing, if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Settle with `failure`. Returns false, changing nothing, if already settled.
    pub fn reject(&self, failure: impl Into<Failure>) -> bool {
        self.settle(Err(failure.into()))
    }

    /// True once resolved or rejected.
    pub fn is_settled(&self) -> bool {
        self.shared.outcome.borrow().is_some()
    }

    fn settle(&self, outcome: Result<T, Failure>) -> bool {
        {
            let mut slot = self.shared.outcome.borrow_mut();
            if slot.is_some() {
                tracing::debug!("deferred value settled twice; ignoring");
                return false;
            }
            *slot = Some(outcome.clone());
        }
        let waiters = core::mem::take(&mut *self.shared.waiters.borrow_mut());
        for step in waiters {
            deliver(&step, outcome.clone());
        }
        true
    }

    fn wait(&self, step: Step<T>) {
        let settled = self.shared.outcome.borrow().clone();
        match settled {
            Some(outcome) => deliver(&step, outcome),
            None => {
                let mut waiters = self.shared.waiters.borrow_mut();
                waiters.retain(Step::is_open);
                waiters.push(step);
            }
        }
    }
}

fn deliver<T: 'static>(step: &Step<T>, outcome: Result<T, Failure>) {
    if !step.is_open() {
        return;
    }
    match outcome {
        Ok(value) => {
            step.next(value);
            step.complete();
        }
        Err(failure) => step.error(failure),
    }
}

/// Emit the settled value of `deferred` then complete, or error if it was rejected.
pub fn from_deferred<T: Clone + 'static>(deferred: &Deferred<T>) -> Pipeline<T> {
    let deferred = deferred.clone();
    Pipeline::source(move |step: Step<T>| {
        deferred.wait(step);
        Ok(())
    })
}

/// Wait on every incoming [`Deferred`] concurrently, emitting outcomes in
/// settlement order.
pub fn settle_all<T: Clone + 'static>() -> Operator<Deferred<T>, T> {
    flat_map(|d: Deferred<T>| from_deferred(&d))
}
