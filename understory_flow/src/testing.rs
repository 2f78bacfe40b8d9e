// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Test support.

use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::error::{Origin, UsageError};
use crate::iteration::Failure;
use crate::report::Reporter;

/// A [`Reporter`] that records everything it receives.
///
/// Hand a clone of the `Rc` to [`Runtime::with_reporter`](crate::Runtime::with_reporter)
/// and inspect the original.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    usage: RefCell<Vec<UsageError>>,
    unhandled: RefCell<Vec<(Origin, Failure)>>,
}

impl RecordingReporter {
    /// A fresh, shareable recorder.
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Usage errors received so far.
    pub fn usage_errors(&self) -> Vec<UsageError> {
        self.usage.borrow().clone()
    }

    /// Unhandled failures received so far.
    pub fn unhandled_failures(&self) -> Vec<(Origin, Failure)> {
        self.unhandled.borrow().clone()
    }

    /// True if nothing was reported.
    pub fn is_quiet(&self) -> bool {
        self.usage.borrow().is_empty() && self.unhandled.borrow().is_empty()
    }

    /// Forget everything recorded.
    pub fn clear(&self) {
        self.usage.borrow_mut().clear();
        self.unhandled.borrow_mut().clear();
    }
}

impl Reporter for RecordingReporter {
    fn usage(&self, error: &UsageError) {
        self.usage.borrow_mut().push(error.clone());
    }

    fn unhandled(&self, origin: Origin, failure: &Failure) {
        self.unhandled.borrow_mut().push((origin, failure.clone()));
    }
}
