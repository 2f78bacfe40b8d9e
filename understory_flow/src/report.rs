// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reporting sink for diagnostics and failures that have no live recipient.
//!
//! ## Overview
//!
//! A [`Runtime`](crate::Runtime) owns exactly one [`Reporter`], supplied at
//! construction. The default, [`TracingReporter`], logs through `tracing`:
//! usage errors at `warn`, unhandled failures at `error`. Tests usually
//! inject a [`RecordingReporter`](crate::testing::RecordingReporter) instead.

use alloc::boxed::Box;
use alloc::rc::Rc;

use crate::error::{Origin, UsageError};
use crate::iteration::Failure;

/// Receives usage errors and unhandled failures.
///
/// Implementations must not call back into the runtime that reports to them.
pub trait Reporter {
    /// A call violated the step contract and was dropped.
    fn usage(&self, error: &UsageError);

    /// A failure had nowhere to go.
    fn unhandled(&self, origin: Origin, failure: &Failure);
}

impl<R: Reporter + ?Sized> Reporter for Rc<R> {
    fn usage(&self, error: &UsageError) {
        (**self).usage(error);
    }

    fn unhandled(&self, origin: Origin, failure: &Failure) {
        (**self).unhandled(origin, failure);
    }
}

impl<R: Reporter + ?Sized> Reporter for Box<R> {
    fn usage(&self, error: &UsageError) {
        (**self).usage(error);
    }

    fn unhandled(&self, origin: Origin, failure: &Failure) {
        (**self).unhandled(origin, failure);
    }
}

/// Default reporter: structured `tracing` events.
#[derive(Copy, Clone, Debug, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn usage(&self, error: &UsageError) {
        match error {
            UsageError::NotOpen { step, state, kind } => {
                tracing::warn!(
                    step = %step,
                    state = %state,
                    kind = %kind,
                    "emission dropped: step is not open"
                );
            }
        }
    }

    fn unhandled(&self, origin: Origin, failure: &Failure) {
        tracing::error!(
            step = %origin.step(),
            origin = %origin,
            failure = %failure,
            "unhandled failure"
        );
    }
}
