// Copyright 2025 the Understory Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Step arena: lifecycle state, ownership links, and teardown callbacks.
//!
//! ## Overview
//!
//! Structural data for every live step sits in a slot arena owned by the
//! [`Runtime`](crate::Runtime). Steps are named by a generational [`StepId`];
//! slots are released as soon as an abandon cascade passes over them, and a
//! stale id simply reads as [`Lifecycle::Closed`].
//!
//! Typed data (pending queue, sequence counter, downstream controller) lives
//! with the [`Step`](crate::Step) handles and never enters the arena.

use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;

use crate::iteration::Failure;

/// Identifier for a step.
///
/// A small, copyable handle made of a slot index and a generation counter.
///
/// ## Semantics
///
/// - On allocation, a fresh slot starts at generation `1`.
/// - When a cascade releases the step, the slot is freed; any existing `StepId`
///   for it is now stale and reports [`Lifecycle::Closed`].
/// - On reuse of a freed slot, its generation is incremented, so a stale id
///   never aliases a newer step.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct StepId(u32, u32);

impl StepId {
    pub(crate) const fn new(idx: u32, generation: u32) -> Self {
        Self(idx, generation)
    }

    const fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step#{}v{}", self.0, self.1)
    }
}

/// Step lifecycle. Transitions only move forward.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Lifecycle {
    /// Accepting iterations.
    Open,
    /// A terminal iteration was accepted; delivery may still be pending.
    Closing,
    /// Released by an abandon cascade.
    Closed,
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Closing => "closing",
            Self::Closed => "closed",
        })
    }
}

/// Callback run once when a step is released.
pub type Teardown = Box<dyn FnOnce() -> Result<(), Failure>>;

struct Slot {
    generation: u32,
    state: Lifecycle,
    parent: Option<StepId>,
    child: Option<StepId>,
    teardown: Option<Teardown>,
}

impl Slot {
    fn new(generation: u32) -> Self {
        Self {
            generation,
            state: Lifecycle::Open,
            parent: None,
            child: None,
            teardown: None,
        }
    }
}

#[derive(Default)]
pub(crate) struct StepArena {
    slots: Vec<Option<Slot>>, // None once released
    generations: Vec<u32>,    // last generation per slot (persists across frees)
    free_list: Vec<usize>,
}

impl fmt::Debug for StepArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepArena")
            .field("slots_total", &self.slots.len())
            .field("slots_alive", &self.live())
            .field("free_list", &self.free_list.len())
            .finish()
    }
}

impl StepArena {
    pub(crate) fn with_capacity(n: usize) -> Self {
        Self {
            slots: Vec::with_capacity(n),
            generations: Vec::with_capacity(n),
            free_list: Vec::new(),
        }
    }

    /// Allocate an open, unlinked step.
    pub(crate) fn insert(&mut self) -> StepId {
        if let Some(idx) = self.free_list.pop() {
            let generation = self.generations[idx].saturating_add(1);
            self.generations[idx] = generation;
            self.slots[idx] = Some(Slot::new(generation));
            #[allow(
                clippy::cast_possible_truncation,
                reason = "StepId uses 32-bit indices by design."
            )]
            StepId::new(idx as u32, generation)
        } else {
            let generation = 1_u32;
            self.slots.push(Some(Slot::new(generation)));
            self.generations.push(generation);
            #[allow(
                clippy::cast_possible_truncation,
                reason = "StepId uses 32-bit indices by design."
            )]
            StepId::new((self.slots.len() - 1) as u32, generation)
        }
    }

    fn slot(&self, id: StepId) -> Option<&Slot> {
        self.slots
            .get(id.idx())
            .and_then(Option::as_ref)
            .filter(|s| s.generation == id.1)
    }

    fn slot_mut(&mut self, id: StepId) -> Option<&mut Slot> {
        self.slots
            .get_mut(id.idx())
            .and_then(Option::as_mut)
            .filter(|s| s.generation == id.1)
    }

    pub(crate) fn is_alive(&self, id: StepId) -> bool {
        self.slot(id).is_some()
    }

    pub(crate) fn state(&self, id: StepId) -> Lifecycle {
        self.slot(id).map_or(Lifecycle::Closed, |s| s.state)
    }

    pub(crate) fn parent(&self, id: StepId) -> Option<StepId> {
        self.slot(id).and_then(|s| s.parent)
    }

    pub(crate) fn child(&self, id: StepId) -> Option<StepId> {
        self.slot(id).and_then(|s| s.child)
    }

    pub(crate) fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Make `parent` the exclusive upstream of `child`. Both must be alive.
    pub(crate) fn link(&mut self, parent: StepId, child: StepId) -> bool {
        if !self.is_alive(parent) || !self.is_alive(child) {
            return false;
        }
        if let Some(old) = self.child(parent) {
            self.unlink(parent, old);
        }
        if let Some(old) = self.parent(child) {
            self.unlink(old, child);
        }
        if let Some(p) = self.slot_mut(parent) {
            p.child = Some(child);
        }
        if let Some(c) = self.slot_mut(child) {
            c.parent = Some(parent);
        }
        true
    }

    fn unlink(&mut self, parent: StepId, child: StepId) {
        if let Some(p) = self.slot_mut(parent)
            && p.child == Some(child)
        {
            p.child = None;
        }
        if let Some(c) = self.slot_mut(child)
            && c.parent == Some(parent)
        {
            c.parent = None;
        }
    }

    /// `Open → Closing`. Returns false if the step was not open.
    pub(crate) fn begin_closing(&mut self, id: StepId) -> bool {
        match self.slot_mut(id) {
            Some(s) if s.state == Lifecycle::Open => {
                s.state = Lifecycle::Closing;
                true
            }
            _ => false,
        }
    }

    /// Install `teardown`, replacing any previous one.
    ///
    /// Hands the callback back if the step is already released so the caller
    /// can run it immediately.
    pub(crate) fn set_teardown(&mut self, id: StepId, teardown: Teardown) -> Result<(), Teardown> {
        match self.slot_mut(id) {
            Some(s) => {
                s.teardown = Some(teardown);
                Ok(())
            }
            None => Err(teardown),
        }
    }

    /// Release `id` and every ancestor, closest-to-consumer first.
    ///
    /// Returns the released steps with their teardown callbacks in visit order.
    /// Already-released ids yield nothing, which makes the cascade idempotent.
    pub(crate) fn release_chain(&mut self, id: StepId) -> Vec<(StepId, Option<Teardown>)> {
        let mut out = Vec::new();
        let mut cursor = Some(id);
        while let Some(cur) = cursor {
            let Some(slot) = self.slot_mut(cur) else {
                break;
            };
            slot.state = Lifecycle::Closed;
            let teardown = slot.teardown.take();
            let parent = slot.parent.take();
            let child = slot.child.take();
            if let Some(c) = child
                && let Some(cs) = self.slot_mut(c)
                && cs.parent == Some(cur)
            {
                cs.parent = None;
            }
            if let Some(p) = parent
                && let Some(ps) = self.slot_mut(p)
                && ps.child == Some(cur)
            {
                ps.child = None;
            }
            self.slots[cur.idx()] = None;
            self.free_list.push(cur.idx());
            out.push((cur, teardown));
            cursor = parent;
        }
        out
    }
}
