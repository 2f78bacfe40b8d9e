// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-item operators.
//!
//! Terminal iterations pass through unchanged. Operators are shareable: each
//! subscription gets its own controller, and any per-subscription state (such
//! as the counter in [`take`]) lives in that controller.

use alloc::rc::Rc;

use understory_flow::{Failure, Iteration, Operator, Step};

/// Transform every item with `f`.
pub fn map<In, Out, F>(f: F) -> Operator<In, Out>
where
    In: 'static,
    Out: 'static,
    F: Fn(In) -> Out + 'static,
{
    let f = Rc::new(f);
    Operator::new(move |out: Step<Out>| {
        let f = Rc::clone(&f);
        move |it: Iteration<In>, _: u64| {
            out.emit_raw(it.map(&*f));
            Ok(())
        }
    })
}

/// Transform every item with a fallible `f`.
///
/// An `Err` cancels upstream and is delivered downstream as an error.
pub fn try_map<In, Out, F>(f: F) -> Operator<In, Out>
where
    In: 'static,
    Out: 'static,
    F: Fn(In) -> Result<Out, Failure> + 'static,
{
    let f = Rc::new(f);
    Operator::new(move |out: Step<Out>| {
        let f = Rc::clone(&f);
        move |it: Iteration<In>, _: u64| {
            match it {
                Iteration::Item(v) => out.next(f(v)?),
                Iteration::Complete => out.complete(),
                Iteration::Error(e) => out.error(e),
            }
            Ok(())
        }
    })
}

/// Keep only items for which `keep` returns true.
pub fn filter<T, F>(keep: F) -> Operator<T, T>
where
    T: 'static,
    F: Fn(&T) -> bool + 'static,
{
    let keep = Rc::new(keep);
    Operator::new(move |out: Step<T>| {
        let keep = Rc::clone(&keep);
        move |it: Iteration<T>, _: u64| {
            match it {
                Iteration::Item(v) if !keep(&v) => {}
                other => out.emit_raw(other),
            }
            Ok(())
        }
    })
}

/// Forward the first `n` items, then complete and cancel upstream.
pub fn take<T: 'static>(n: usize) -> Operator<T, T> {
    Operator::new(move |out: Step<T>| {
        let mut remaining = n;
        if remaining == 0 {
            out.complete();
        }
        move |it: Iteration<T>, _: u64| {
            match it {
                Iteration::Item(v) => {
                    if remaining == 0 {
                        return Ok(());
                    }
                    remaining -= 1;
                    out.next(v);
                    if remaining == 0 {
                        out.complete();
                    }
                }
                other => out.emit_raw(other),
            }
            Ok(())
        }
    })
}
