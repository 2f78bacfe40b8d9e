// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Runtime configuration.

bitflags::bitflags! {
    /// Categories of internal dispatch activity logged at `trace` level.
    ///
    /// Diagnostics and unhandled failures are always reported through the
    /// [`Reporter`](crate::report::Reporter); these flags only gate the verbose
    /// per-event tracing that is useful when debugging ordering problems.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct TraceFlags: u8 {
        /// Every accepted `emit` (step, kind, sequence index).
        const EMIT      = 0b0000_0001;
        /// Every controller invocation made by a drain loop.
        const DELIVER   = 0b0000_0010;
        /// Every abandon cascade that released at least one step.
        const CASCADE   = 0b0000_0100;
        /// Every broadcaster pass over its listener list.
        const BROADCAST = 0b0000_1000;
    }
}

impl Default for TraceFlags {
    fn default() -> Self {
        Self::empty()
    }
}

/// Construction-time settings for a [`Runtime`](crate::Runtime).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Which dispatch categories to trace. Adjustable later with
    /// [`Runtime::set_trace`](crate::Runtime::set_trace).
    pub trace: TraceFlags,
    /// Number of step slots to reserve up front.
    pub step_capacity: usize,
}

impl RuntimeConfig {
    /// Enable tracing for the given categories.
    pub fn with_trace(mut self, trace: TraceFlags) -> Self {
        self.trace = trace;
        self
    }

    /// Reserve room for `n` live steps.
    pub fn with_step_capacity(mut self, n: usize) -> Self {
        self.step_capacity = n;
        self
    }
}
