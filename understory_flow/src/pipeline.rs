// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Inert pipeline definitions and operators.
//!
//! ## Overview
//!
//! A [`Pipeline<T>`] describes how to produce `T`s without producing any.
//! It is a persistent linked structure: a source node holds an open function,
//! and each operator node holds its own open function plus the pipeline it was
//! applied to. Building and cloning pipelines never runs user code.
//!
//! Subscribing walks the structure from the consumer end back to the source.
//! Each hop allocates one [`Step`], wires it as the parent of the step built
//! before it, and asks the operator's open function for the controller that
//! will receive the parent's iterations. The source's open function is called
//! last, with the root-most step.

use alloc::boxed::Box;
use alloc::rc::Rc;
use core::fmt;

use crate::error::Origin;
use crate::iteration::{Failure, Iteration};
use crate::observer::Observer;
use crate::runtime::Runtime;
use crate::step::{Controller, Inlet, Step};
use crate::subscription::Subscription;

trait Definition<T> {
    fn materialize(&self, runtime: &Runtime, downstream: Rc<Inlet<T>>);
}

/// A lazy, composable description of a pipeline producing `T`.
pub struct Pipeline<T> {
    node: Rc<dyn Definition<T>>,
}

impl<T> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            node: Rc::clone(&self.node),
        }
    }
}

impl<T> fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline").finish_non_exhaustive()
    }
}

type SourceOpen<T> = dyn Fn(Step<T>) -> Result<(), Failure>;

struct SourceNode<T> {
    open: Box<SourceOpen<T>>,
}

impl<T: 'static> Definition<T> for SourceNode<T> {
    fn materialize(&self, runtime: &Runtime, downstream: Rc<Inlet<T>>) {
        let step = Step::new(runtime);
        step.attach(downstream);
        if let Err(failure) = (self.open)(step.clone()) {
            if step.is_open() {
                step.error(failure);
            } else {
                runtime.report_unhandled(Origin::Source { step: step.id() }, &failure);
            }
        }
    }
}

impl<T: 'static> Pipeline<T> {
    /// A source pipeline.
    ///
    /// `open` runs once per subscription with the source's step and may emit
    /// synchronously or arrange to emit later. Returning `Err` emits an error
    /// iteration if the step is still open.
    pub fn source<F>(open: F) -> Self
    where
        F: Fn(Step<T>) -> Result<(), Failure> + 'static,
    {
        Self {
            node: Rc::new(SourceNode {
                open: Box::new(open),
            }),
        }
    }

    /// Apply `operator`, producing a new pipeline. `self` is not modified.
    pub fn pipe<U: 'static>(&self, operator: &Operator<T, U>) -> Pipeline<U> {
        operator.apply(self)
    }

    /// Materialize and start on `runtime`. Same as [`Runtime::subscribe`].
    pub fn subscribe(&self, runtime: &Runtime, observer: Observer<T>) -> Subscription {
        runtime.subscribe(self, observer)
    }

    pub(crate) fn materialize(&self, runtime: &Runtime, downstream: Rc<Inlet<T>>) {
        self.node.materialize(runtime, downstream);
    }
}

type OperatorOpen<In, Out> = dyn Fn(Step<Out>) -> Controller<In>;

/// A reusable pipeline transformation from `In` to `Out`.
///
/// The open function receives the operator's own step (which emits `Out`) and
/// returns the controller that receives the upstream `In` iterations.
pub struct Operator<In, Out> {
    open: Rc<OperatorOpen<In, Out>>,
}

impl<In, Out> Clone for Operator<In, Out> {
    fn clone(&self) -> Self {
        Self {
            open: Rc::clone(&self.open),
        }
    }
}

impl<In, Out> fmt::Debug for Operator<In, Out> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Operator").finish_non_exhaustive()
    }
}

impl<In: 'static, Out: 'static> Operator<In, Out> {
    /// An operator from its open function.
    pub fn new<F, C>(open: F) -> Self
    where
        F: Fn(Step<Out>) -> C + 'static,
        C: FnMut(Iteration<In>, u64) -> Result<(), Failure> + 'static,
    {
        Self {
            open: Rc::new(move |step: Step<Out>| Box::new(open(step)) as Controller<In>),
        }
    }

    /// Apply to `parent`, producing a new pipeline.
    pub fn apply(&self, parent: &Pipeline<In>) -> Pipeline<Out> {
        Pipeline {
            node: Rc::new(OperatorNode {
                parent: parent.clone(),
                open: Rc::clone(&self.open),
            }),
        }
    }
}

struct OperatorNode<In, Out> {
    parent: Pipeline<In>,
    open: Rc<OperatorOpen<In, Out>>,
}

impl<In: 'static, Out: 'static> Definition<Out> for OperatorNode<In, Out> {
    fn materialize(&self, runtime: &Runtime, downstream: Rc<Inlet<Out>>) {
        let step = Step::new(runtime);
        step.attach(downstream);
        let controller = (self.open)(step.clone());
        // The open function may already have terminated the step.
        if !step.is_open() {
            return;
        }
        self.parent
            .materialize(runtime, Inlet::new(&step, Some(controller)));
    }
}
