// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Sequential composition.

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};

use understory_flow::{Observer, Pipeline, Step, Subscription};

struct Concat<T> {
    out: Step<T>,
    queue: RefCell<VecDeque<Pipeline<T>>>,
    current: RefCell<Option<Subscription>>,
    advancing: Cell<bool>,
    again: Cell<bool>,
}

impl<T: 'static> Concat<T> {
    /// Subscribe the next queued pipeline, or complete when none are left.
    ///
    /// Runs as a loop so a long run of synchronously completing pipelines does
    /// not nest one subscription inside the previous one's completion.
    fn advance(this: &Rc<Self>) {
        if this.advancing.replace(true) {
            this.again.set(true);
            return;
        }
        loop {
            this.again.set(false);
            if !this.out.is_open() {
                break;
            }
            let next = this.queue.borrow_mut().pop_front();
            let Some(pipeline) = next else {
                this.out.complete();
                break;
            };
            let sub = this
                .out
                .runtime()
                .subscribe(&pipeline, Self::observer(this));
            if !sub.is_closed() {
                *this.current.borrow_mut() = Some(sub);
            }
            if !this.again.get() {
                break;
            }
        }
        this.advancing.set(false);
    }

    fn observer(this: &Rc<Self>) -> Observer<T> {
        let (on_item, on_complete, on_error) = (this.clone(), this.clone(), this.clone());
        Observer::new(move |v| on_item.out.next(v))
            .on_complete(move || {
                on_complete.current.borrow_mut().take();
                Self::advance(&on_complete);
            })
            .on_error(move |f| {
                if on_error.out.is_open() {
                    on_error.out.error(f);
                }
            })
    }
}

/// Run each pipeline to completion in turn, forwarding all of their items.
///
/// The next pipeline is subscribed only after the previous one completed. The
/// first error ends the whole sequence. Cancelling cancels whichever pipeline
/// is currently running.
pub fn concat<T: 'static>(pipelines: impl IntoIterator<Item = Pipeline<T>>) -> Pipeline<T> {
    let pipelines: Rc<[Pipeline<T>]> = pipelines.into_iter().collect::<Vec<_>>().into();
    Pipeline::source(move |out: Step<T>| {
        let state = Rc::new(Concat {
            out: out.clone(),
            queue: RefCell::new(pipelines.iter().cloned().collect()),
            current: RefCell::new(None),
            advancing: Cell::new(false),
            again: Cell::new(false),
        });
        let teardown = state.clone();
        out.on_teardown(move || {
            teardown.queue.borrow_mut().clear();
            let current = teardown.current.borrow_mut().take();
            if let Some(sub) = current {
                sub.cancel();
            }
            Ok(())
        });
        Concat::advance(&state);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{fail, of};
    use crate::testing::collect;
    use crate::timer::{ManualScheduler, timer};
    use alloc::vec;
    use understory_flow::{Failure, Runtime};

    #[test]
    fn runs_pipelines_in_order() {
        let rt = Runtime::new();
        let got = collect(&rt, &concat([of([1, 2]), of([]), of([3])]));
        assert_eq!(got.items(), vec![1, 2, 3]);
        assert!(got.completed());
        assert_eq!(rt.live_steps(), 0);
    }

    #[test]
    fn empty_concat_completes() {
        let rt = Runtime::new();
        let got = collect(&rt, &concat::<u8>([]));
        assert!(got.completed());
    }

    #[test]
    fn waits_for_asynchronous_completion() {
        let rt = Runtime::new();
        let sched = ManualScheduler::new();
        let got = collect(&rt, &concat([timer(&sched, 5), timer(&sched, 3)]));
        assert!(got.items().is_empty());
        sched.advance(5);
        assert_eq!(got.items(), vec![5]);
        // The second timer was only scheduled once the first completed.
        sched.advance(2);
        assert_eq!(got.items(), vec![5]);
        sched.advance(1);
        assert_eq!(got.items(), vec![5, 8]);
        assert!(got.completed());
    }

    #[test]
    fn first_error_ends_the_sequence() {
        let rt = Runtime::new();
        let got = collect(
            &rt,
            &concat([of([1]), fail(Failure::msg("broken")), of([2])]),
        );
        assert_eq!(got.items(), vec![1]);
        assert_eq!(got.failure(), Some(Failure::msg("broken")));
        assert!(!got.completed());
    }

    #[test]
    fn cancel_stops_the_running_pipeline() {
        let rt = Runtime::new();
        let sched = ManualScheduler::new();
        let got = collect(&rt, &concat([timer(&sched, 5), timer(&sched, 5)]));
        assert_eq!(sched.pending(), 1);
        got.subscription.cancel();
        assert_eq!(sched.pending(), 0);
        assert_eq!(rt.live_steps(), 0);
        sched.advance(20);
        assert!(got.items().is_empty());
    }

    #[test]
    fn many_synchronous_pipelines_do_not_nest() {
        let rt = Runtime::new();
        let parts = (0..5_000_u32).map(|v| of([v]));
        let got = collect(&rt, &concat(parts));
        assert_eq!(got.items().len(), 5_000);
        assert!(got.completed());
    }
}
