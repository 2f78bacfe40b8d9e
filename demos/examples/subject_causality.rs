// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Subject causality.
//!
//! A listener that joins a subject while it is broadcasting only sees values
//! emitted after it joined. A listener that unsubscribes another one mid
//! broadcast stops that listener from receiving the current value.
//!
//! Run:
//! - `cargo run -p understory_demos --example subject_causality`

use std::cell::RefCell;
use std::rc::Rc;

use tracing_subscriber::EnvFilter;
use understory_flow::{Observer, Runtime, Subject, Subscription};

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let runtime = Runtime::new();
    let subject = Subject::<&'static str>::new(&runtime);
    let victim: Rc<RefCell<Option<Subscription>>> = Rc::default();

    let (late_joiner, target) = (subject.clone(), victim.clone());
    subject.add_listener(Observer::new(move |v: &'static str| {
        println!("eager: {v}");
        if v == "hello" {
            late_joiner.add_listener(Observer::new(|v: &'static str| println!("late: {v}")));
        }
        if v == "again"
            && let Some(sub) = target.borrow_mut().take()
        {
            println!("eager: cancelling victim");
            sub.cancel();
        }
    }));
    *victim.borrow_mut() = Some(
        subject.add_listener(Observer::new(|v: &'static str| println!("victim: {v}"))),
    );

    subject.next("hello");
    subject.next("again");
    subject.complete();

    println!("listeners left: {}", subject.listener_count());
}
