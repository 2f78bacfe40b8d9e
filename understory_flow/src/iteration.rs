// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Event units: [`Iteration`], its [`IterationKind`], and the [`Failure`] payload.
//!
//! ## Overview
//!
//! Every value that flows between steps is an [`Iteration`]: a regular item,
//! a normal completion, or an error completion. Completion never carries a
//! payload and an error always carries a [`Failure`], so consumers only ever
//! match on one shape.

use alloc::rc::Rc;
use alloc::string::String;
use core::error::Error;
use core::fmt;

/// One discrete event flowing through a pipeline.
///
/// `Complete` and `Error` are terminal: a step accepts at most one of them.
#[derive(Clone, Debug, PartialEq)]
pub enum Iteration<T> {
    /// A regular item.
    Item(T),
    /// Normal completion.
    Complete,
    /// Error completion.
    Error(Failure),
}

/// Payload-free discriminant of an [`Iteration`], used in diagnostics.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum IterationKind {
    /// [`Iteration::Item`].
    Item,
    /// [`Iteration::Complete`].
    Complete,
    /// [`Iteration::Error`].
    Error,
}

impl fmt::Display for IterationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Item => "item",
            Self::Complete => "complete",
            Self::Error => "error",
        })
    }
}

impl<T> Iteration<T> {
    /// The payload-free discriminant.
    pub const fn kind(&self) -> IterationKind {
        match self {
            Self::Item(_) => IterationKind::Item,
            Self::Complete => IterationKind::Complete,
            Self::Error(_) => IterationKind::Error,
        }
    }

    /// True for `Complete` and `Error`.
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Item(_))
    }

    /// Transform the item payload, passing terminal iterations through untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Iteration<U> {
        match self {
            Self::Item(v) => Iteration::Item(f(v)),
            Self::Complete => Iteration::Complete,
            Self::Error(e) => Iteration::Error(e),
        }
    }

    /// Returns the item payload, if any.
    pub fn into_item(self) -> Option<T> {
        match self {
            Self::Item(v) => Some(v),
            _ => None,
        }
    }

    /// Re-type a terminal iteration. Items yield `None`.
    pub fn into_terminal<U>(self) -> Option<Iteration<U>> {
        match self {
            Self::Item(_) => None,
            Self::Complete => Some(Iteration::Complete),
            Self::Error(e) => Some(Iteration::Error(e)),
        }
    }
}

/// The single error payload type carried by [`Iteration::Error`].
///
/// A `Failure` is a reference-counted wrapper around any `Error + 'static`, so
/// cloning it for every listener of a broadcast is cheap. Any error type
/// converts into it with `?` or [`Into`]; plain messages go through
/// [`Failure::msg`].
///
/// `Failure` intentionally does not implement [`Error`] itself, which keeps the
/// blanket `From<E: Error>` conversion coherent.
#[derive(Clone)]
pub struct Failure(Rc<dyn Error + 'static>);

#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct Message(String);

impl Failure {
    /// Wrap an error value.
    pub fn new<E: Error + 'static>(error: E) -> Self {
        Self(Rc::new(error))
    }

    /// A failure carrying only a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::new(Message(message.into()))
    }

    /// Borrow the wrapped error.
    pub fn as_error(&self) -> &(dyn Error + 'static) {
        &*self.0
    }

    /// Attempt to view the wrapped error as a concrete type.
    pub fn downcast_ref<E: Error + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }

    /// True if both failures share the same allocation.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<E: Error + 'static> From<E> for Failure {
    fn from(error: E) -> Self {
        Self::new(error)
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.0, f)
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Failure")
            .field(&format_args!("{}", self.0))
            .finish()
    }
}

// Failures compare by identity first, then by rendered message.
impl PartialEq for Failure {
    fn eq(&self, other: &Self) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        use alloc::string::ToString;
        self.0.to_string() == other.0.to_string()
    }
}
