// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Cold sources.

use alloc::rc::Rc;
use alloc::vec::Vec;

use understory_flow::{Failure, Pipeline, Step};

/// Emit each value in order, then complete. Every subscription replays all of them.
pub fn of<T: Clone + 'static>(values: impl IntoIterator<Item = T>) -> Pipeline<T> {
    let values: Rc<[T]> = values.into_iter().collect::<Vec<_>>().into();
    Pipeline::source(move |step: Step<T>| {
        for v in values.iter() {
            if !step.is_open() {
                return Ok(());
            }
            step.next(v.clone());
        }
        step.complete();
        Ok(())
    })
}

/// Emit everything `iter` yields, then complete.
///
/// The iterable is cloned once per subscription. Iteration stops early if the
/// subscription is cancelled from downstream.
pub fn from_iter<I>(iter: I) -> Pipeline<I::Item>
where
    I: IntoIterator + Clone + 'static,
    I::Item: 'static,
{
    Pipeline::source(move |step: Step<I::Item>| {
        for v in iter.clone() {
            if !step.is_open() {
                return Ok(());
            }
            step.next(v);
        }
        step.complete();
        Ok(())
    })
}

/// Complete immediately.
pub fn empty<T: 'static>() -> Pipeline<T> {
    Pipeline::source(|step: Step<T>| {
        step.complete();
        Ok(())
    })
}

/// Fail immediately with `failure`.
pub fn fail<T: 'static>(failure: impl Into<Failure>) -> Pipeline<T> {
    let failure = failure.into();
    Pipeline::source(move |_: Step<T>| Err(failure.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::collect;
    use alloc::vec;
    use understory_flow::Runtime;

    #[test]
    fn of_replays_per_subscription() {
        let rt = Runtime::new();
        let p = of([1, 2, 3]);
        let first = collect(&rt, &p);
        let second = collect(&rt, &p);
        assert_eq!(first.items(), vec![1, 2, 3]);
        assert!(first.completed());
        assert_eq!(second.items(), vec![1, 2, 3]);
    }

    #[test]
    fn from_iter_clones_the_iterable() {
        let rt = Runtime::new();
        let got = collect(&rt, &from_iter(10..13_u8));
        assert_eq!(got.items(), vec![10, 11, 12]);
        assert!(got.completed());
    }

    #[test]
    fn empty_and_fail() {
        let rt = Runtime::new();
        let e = collect(&rt, &empty::<u8>());
        assert!(e.items().is_empty());
        assert!(e.completed());

        let f = collect(&rt, &fail::<u8>(Failure::msg("nope")));
        assert_eq!(f.failure(), Some(Failure::msg("nope")));
        assert!(!f.completed());
    }
}
