// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Diagnostic types handed to the [`Reporter`](crate::report::Reporter).
//!
//! Nothing in this module is ever returned to, or raised into, caller code.
//! A dispatch loop may be running further up the stack, so misuse is reported
//! and the offending call is dropped.

use crate::arena::{Lifecycle, StepId};
use crate::iteration::IterationKind;

/// Misuse of the step contract.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum UsageError {
    /// An iteration was emitted on a step that already accepted a terminal
    /// iteration or was abandoned. Covers double completion.
    #[error("{kind} emitted on {step} while {state}")]
    NotOpen {
        /// The step that rejected the emission.
        step: StepId,
        /// Its lifecycle state at the time.
        state: Lifecycle,
        /// What was emitted.
        kind: IterationKind,
    },
}

/// Where an unhandled [`Failure`](crate::Failure) came from.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, thiserror::Error)]
pub enum Origin {
    /// A controller failed and its step had no open downstream to redirect to.
    #[error("controller of {step} failed with no open downstream")]
    Handler {
        /// The step whose controller failed.
        step: StepId,
    },
    /// An error iteration reached a consumer that registered no error callback.
    #[error("error reached {step} without an error callback")]
    Uncaught {
        /// The consumer-side step.
        step: StepId,
    },
    /// An error iteration was emitted where nothing could receive it.
    #[error("error emitted on {step} was dropped")]
    Dropped {
        /// The step the error was emitted on.
        step: StepId,
    },
    /// A teardown callback failed during an abandon cascade.
    #[error("teardown of {step} failed")]
    Teardown {
        /// The step whose teardown failed.
        step: StepId,
    },
    /// A source's open function failed after its step had already closed.
    #[error("source open for {step} failed after close")]
    Source {
        /// The source step.
        step: StepId,
    },
}

impl Origin {
    /// The step the failure is attributed to.
    pub const fn step(&self) -> StepId {
        match *self {
            Self::Handler { step }
            | Self::Uncaught { step }
            | Self::Dropped { step }
            | Self::Teardown { step }
            | Self::Source { step } => step,
        }
    }
}
