// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cancellation handles for materialized pipelines.

use crate::arena::{Lifecycle, StepId};
use crate::runtime::Runtime;

/// Handle to a running pipeline, bound to its consumer-side step.
///
/// Dropping a `Subscription` does not cancel it; the pipeline keeps running
/// until it terminates or [`cancel`](Self::cancel) is called.
#[derive(Clone, Debug)]
pub struct Subscription {
    runtime: Runtime,
    step: StepId,
}

impl Subscription {
    pub(crate) fn new(runtime: Runtime, step: StepId) -> Self {
        Self { runtime, step }
    }

    /// Run the abandon cascade from the consumer-side step.
    ///
    /// Calling this again, or after the pipeline terminated, does nothing.
    pub fn cancel(&self) {
        self.runtime.abandon(self.step);
    }

    /// True once the pipeline terminated or was cancelled.
    pub fn is_closed(&self) -> bool {
        self.runtime.state(self.step) == Lifecycle::Closed
    }

    /// The consumer-side step.
    pub fn step(&self) -> StepId {
        self.step
    }
}
