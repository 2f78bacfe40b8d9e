// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Consumer callbacks for a subscription.

use alloc::boxed::Box;
use core::fmt;

use crate::error::Origin;
use crate::iteration::{Failure, Iteration};
use crate::step::{Controller, Step};

/// The item, completion, and error callbacks a subscription delivers into.
///
/// An error reaching an observer without an error callback is reported to the
/// runtime's [`Reporter`](crate::report::Reporter) as
/// [`Origin::Uncaught`].
pub struct Observer<T> {
    on_item: Box<dyn FnMut(T) -> Result<(), Failure>>,
    on_complete: Option<Box<dyn FnOnce()>>,
    on_error: Option<Box<dyn FnOnce(Failure)>>,
}

impl<T> fmt::Debug for Observer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observer")
            .field("on_complete", &self.on_complete.is_some())
            .field("on_error", &self.on_error.is_some())
            .finish_non_exhaustive()
    }
}

impl<T: 'static> Default for Observer<T> {
    fn default() -> Self {
        Self::new(|_| {})
    }
}

impl<T: 'static> Observer<T> {
    /// Observe items with an infallible callback.
    pub fn new(mut on_item: impl FnMut(T) + 'static) -> Self {
        Self::try_new(move |v| {
            on_item(v);
            Ok(())
        })
    }

    /// Observe items with a fallible callback.
    ///
    /// An `Err` cancels the subscription and is reported as an unhandled
    /// [`Origin::Handler`] failure; it is not routed to the error callback.
    pub fn try_new(on_item: impl FnMut(T) -> Result<(), Failure> + 'static) -> Self {
        Self {
            on_item: Box::new(on_item),
            on_complete: None,
            on_error: None,
        }
    }

    /// Run `f` on normal completion.
    pub fn on_complete(mut self, f: impl FnOnce() + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Run `f` on error completion.
    pub fn on_error(mut self, f: impl FnOnce(Failure) + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// The controller of the consumer-side step `sink`.
    pub(crate) fn into_controller(self, sink: Step<()>) -> Controller<T> {
        let Self {
            mut on_item,
            mut on_complete,
            mut on_error,
        } = self;
        Box::new(move |iteration: Iteration<T>, _: u64| match iteration {
            Iteration::Item(value) => on_item(value),
            Iteration::Complete => {
                sink.abandon();
                if let Some(f) = on_complete.take() {
                    f();
                }
                Ok(())
            }
            Iteration::Error(failure) => {
                sink.abandon();
                match on_error.take() {
                    Some(f) => f(failure),
                    None => sink
                        .runtime()
                        .report_unhandled(Origin::Uncaught { step: sink.id() }, &failure),
                }
                Ok(())
            }
        })
    }
}
