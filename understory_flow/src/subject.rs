// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Multicast subjects.
//!
//! ## Overview
//!
//! A [`Subject<T>`] is a hot source: values pushed into it are broadcast to
//! every listener subscribed at the time. Pushes go through a single internal
//! step, so broadcasts inherit the same queueing discipline as any other step
//! and never nest, even when a listener pushes into the subject it is
//! listening to.
//!
//! ## Causal join
//!
//! Every listener record is stamped with the subject's next sequence index at
//! the moment it joins. A broadcast with index `n` is forwarded only to
//! records stamped `<= n`, so a listener that joins while `n` is being
//! delivered sees `n + 1` onward and never `n` itself.
//!
//! ## Listener list
//!
//! Records live in a generational slot list linked both ways in join order.
//! Leaving only marks a record dead; the next broadcast splices dead records
//! out as it walks past them. Joining outside a broadcast pops dead records
//! off the tail first, so a quiet subject with churning listeners reuses the
//! same slots.
//!
//! After a terminal iteration the subject keeps it, and late listeners receive
//! it immediately on subscription.

use alloc::boxed::Box;
use alloc::rc::{Rc, Weak};
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::fmt;

use crate::arena::StepId;
use crate::config::TraceFlags;
use crate::iteration::{Failure, Iteration};
use crate::observer::Observer;
use crate::pipeline::Pipeline;
use crate::runtime::Runtime;
use crate::step::{Inlet, Step};
use crate::subscription::Subscription;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct ListenerKey(u32, u32);

struct Record<T> {
    generation: u32,
    step: Option<Step<T>>, // None once the listener left
    starts_on: u64,
    prev: Option<usize>,
    next: Option<usize>,
}

impl<T> Record<T> {
    fn live_step(&self) -> Option<&Step<T>> {
        self.step.as_ref().filter(|s| s.is_open())
    }
}

struct ListenerList<T> {
    slots: Vec<Option<Record<T>>>,
    generations: Vec<u32>,
    free_list: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<T> Default for ListenerList<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            generations: Vec::new(),
            free_list: Vec::new(),
            head: None,
            tail: None,
        }
    }
}

impl<T> ListenerList<T> {
    fn record(&self, idx: usize) -> Option<&Record<T>> {
        self.slots.get(idx).and_then(Option::as_ref)
    }

    /// Append a record at the tail.
    fn push(&mut self, step: Step<T>, starts_on: u64) -> ListenerKey {
        let idx = match self.free_list.pop() {
            Some(idx) => {
                self.generations[idx] = self.generations[idx].saturating_add(1);
                idx
            }
            None => {
                self.slots.push(None);
                self.generations.push(1);
                self.slots.len() - 1
            }
        };
        let generation = self.generations[idx];
        self.slots[idx] = Some(Record {
            generation,
            step: Some(step),
            starts_on,
            prev: self.tail,
            next: None,
        });
        match self.tail {
            Some(tail) => {
                if let Some(Some(rec)) = self.slots.get_mut(tail) {
                    rec.next = Some(idx);
                }
            }
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
        #[allow(
            clippy::cast_possible_truncation,
            reason = "ListenerKey uses 32-bit indices by design."
        )]
        ListenerKey(idx as u32, generation)
    }

    /// Mark the record for `key` dead, handing back its step.
    fn mark_dead(&mut self, key: ListenerKey) -> Option<Step<T>> {
        let rec = self.slots.get_mut(key.0 as usize)?.as_mut()?;
        if rec.generation != key.1 {
            return None;
        }
        rec.step.take()
    }

    /// Unlink `idx` and free its slot.
    fn splice(&mut self, idx: usize) -> Option<Record<T>> {
        let rec = self.slots.get_mut(idx)?.take()?;
        match rec.prev {
            Some(p) => {
                if let Some(Some(prev_rec)) = self.slots.get_mut(p) {
                    prev_rec.next = rec.next;
                }
            }
            None => self.head = rec.next,
        }
        match rec.next {
            Some(n) => {
                if let Some(Some(next_rec)) = self.slots.get_mut(n) {
                    next_rec.prev = rec.prev;
                }
            }
            None => self.tail = rec.prev,
        }
        self.free_list.push(idx);
        Some(rec)
    }

    /// Pop dead records off the tail, stopping at the first live one.
    fn reap_tail(&mut self) -> Vec<Record<T>> {
        let mut removed = Vec::new();
        while let Some(idx) = self.tail {
            let dead = self.record(idx).is_some_and(|r| r.live_step().is_none());
            if !dead {
                break;
            }
            match self.splice(idx) {
                Some(rec) => removed.push(rec),
                None => break,
            }
        }
        removed
    }

    /// Remove every record.
    fn clear(&mut self) -> Vec<Record<T>> {
        self.head = None;
        self.tail = None;
        let mut removed = Vec::new();
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if let Some(rec) = slot.take() {
                removed.push(rec);
                self.free_list.push(idx);
            }
        }
        removed
    }

    fn live(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|r| r.live_step().is_some())
            .count()
    }
}

struct SubjectInner<T> {
    head: Step<T>,
    hub: StepId,
    listeners: RefCell<ListenerList<T>>,
    broadcasting: Cell<bool>,
    terminal: RefCell<Option<Iteration<T>>>,
}

impl<T> Drop for SubjectInner<T> {
    fn drop(&mut self) {
        let runtime = self.head.runtime();
        runtime.abandon(self.hub);
        runtime.abandon(self.head.id());
    }
}

/// A hot, multicast source with causal join semantics.
///
/// Cloning is cheap and every clone pushes into the same subject.
pub struct Subject<T> {
    inner: Rc<SubjectInner<T>>,
}

impl<T> Clone for Subject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Subject<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject")
            .field("head", &self.inner.head.id())
            .field("next_index", &self.inner.head.next_index())
            .field("terminated", &self.inner.terminal.borrow().is_some())
            .finish_non_exhaustive()
    }
}

impl<T: Clone + 'static> Subject<T> {
    /// A subject with no listeners.
    pub fn new(runtime: &Runtime) -> Self {
        let inner = Rc::new_cyclic(|weak: &Weak<SubjectInner<T>>| {
            let head = Step::new(runtime);
            let hub = Step::<()>::new(runtime);
            let weak = weak.clone();
            head.attach(Inlet::new(
                &hub,
                Some(Box::new(move |iteration: Iteration<T>, index: u64| {
                    if let Some(inner) = weak.upgrade() {
                        inner.broadcast(iteration, index);
                    }
                    Ok(())
                })),
            ));
            SubjectInner {
                head,
                hub: hub.id(),
                listeners: RefCell::new(ListenerList::default()),
                broadcasting: Cell::new(false),
                terminal: RefCell::new(None),
            }
        });
        Self { inner }
    }

    /// Broadcast an item.
    pub fn next(&self, value: T) {
        self.inner.head.next(value);
    }

    /// Broadcast normal completion.
    pub fn complete(&self) {
        self.inner.head.complete();
    }

    /// Broadcast an error completion.
    pub fn error(&self, failure: impl Into<Failure>) {
        self.inner.head.error(failure);
    }

    /// Broadcast any iteration.
    pub fn emit_raw(&self, iteration: Iteration<T>) {
        self.inner.head.emit_raw(iteration);
    }

    /// A pipeline whose every subscription joins this subject as a listener.
    ///
    /// The pipeline holds the subject weakly; subscribing after every
    /// `Subject` handle was dropped completes immediately.
    pub fn pipeline(&self) -> Pipeline<T> {
        let weak = Rc::downgrade(&self.inner);
        Pipeline::source(move |step: Step<T>| {
            match weak.upgrade() {
                Some(inner) => SubjectInner::join(&inner, step),
                None => step.complete(),
            }
            Ok(())
        })
    }

    /// Subscribe `observer` directly.
    pub fn add_listener(&self, observer: Observer<T>) -> Subscription {
        self.inner.head.runtime().subscribe(&self.pipeline(), observer)
    }

    /// Number of listeners that have not left.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.borrow().live()
    }

    /// True once a terminal iteration was broadcast.
    pub fn is_terminated(&self) -> bool {
        self.inner.terminal.borrow().is_some()
    }

    /// The runtime this subject pushes into.
    pub fn runtime(&self) -> &Runtime {
        self.inner.head.runtime()
    }
}

impl<T: Clone + 'static> SubjectInner<T> {
    fn join(this: &Rc<Self>, step: Step<T>) {
        let terminal = this.terminal.borrow().clone();
        if let Some(terminal) = terminal {
            step.emit_raw(terminal);
            return;
        }
        // Once closing, the only index still to come is the terminal one.
        let next = this.head.next_index();
        let starts_on = if this.head.is_open() {
            next
        } else {
            next.saturating_sub(1)
        };
        let (key, reaped) = {
            let mut list = this.listeners.borrow_mut();
            let reaped = if this.broadcasting.get() {
                Vec::new()
            } else {
                list.reap_tail()
            };
            (list.push(step.clone(), starts_on), reaped)
        };
        drop(reaped);

        let weak = Rc::downgrade(this);
        step.on_teardown(move || {
            if let Some(inner) = weak.upgrade() {
                let dead = inner.listeners.borrow_mut().mark_dead(key);
                drop(dead);
            }
            Ok(())
        });
    }

    fn broadcast(&self, iteration: Iteration<T>, index: u64) {
        let terminal = iteration.is_terminal();
        if terminal {
            *self.terminal.borrow_mut() = Some(iteration.clone());
        }
        let was_broadcasting = self.broadcasting.replace(true);
        let mut visited = 0_usize;
        let mut cursor = self.listeners.borrow().head;
        while let Some(idx) = cursor {
            let target = {
                let mut list = self.listeners.borrow_mut();
                let Some(rec) = list.record(idx) else { break };
                match rec.live_step() {
                    Some(step) => (index >= rec.starts_on).then(|| step.clone()),
                    None => {
                        let next = rec.next;
                        let spliced = list.splice(idx);
                        drop(list);
                        drop(spliced);
                        cursor = next;
                        continue;
                    }
                }
            };
            if let Some(step) = target {
                visited += 1;
                step.emit_raw(iteration.clone());
            }
            // Read the link only now: records may have been appended meanwhile.
            cursor = self.listeners.borrow().record(idx).and_then(|r| r.next);
        }
        self.broadcasting.set(was_broadcasting);

        let runtime = self.head.runtime();
        if runtime.traces(TraceFlags::BROADCAST) {
            tracing::trace!(subject = %self.head.id(), index, kind = %iteration.kind(), visited, "broadcast");
        }
        if terminal {
            let removed = self.listeners.borrow_mut().clear();
            drop(removed);
            runtime.abandon(self.hub);
        }
    }
}
