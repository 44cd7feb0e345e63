//! Observer registration.
//!
//! Each proxy owns one [`Signal`] carrying its notification enum and only
//! the proxy emits on it. Subscribers get a [`SlotId`] back and can
//! disconnect with it.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

/// Identifies one connected callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SlotId(u64);

type Slot<T> = (SlotId, Box<dyn FnMut(&T)>);

/// A notification channel with any number of subscribers.
pub(crate) struct Signal<T> {
    slots: RefCell<Vec<Slot<T>>>,
    next_slot: Cell<u64>,
    emitting: Cell<bool>,
    /// Slots checked out by the running delivery.
    running: RefCell<Vec<SlotId>>,
    /// Checked-out slots disconnected during the running delivery.
    dropped: RefCell<Vec<SlotId>>,
    /// Values emitted from inside a callback, delivered after the current one.
    queued: RefCell<VecDeque<T>>,
}

impl<T> Default for Signal<T> {
    fn default() -> Self {
        Self {
            slots: RefCell::new(Vec::new()),
            next_slot: Cell::new(1),
            emitting: Cell::new(false),
            running: RefCell::new(Vec::new()),
            dropped: RefCell::new(Vec::new()),
            queued: RefCell::new(VecDeque::new()),
        }
    }
}

impl<T> std::fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("slots", &self.slots.borrow().len())
            .finish()
    }
}

impl<T: Clone> Signal<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback`; it runs for every later emission.
    pub fn connect(&self, callback: impl FnMut(&T) + 'static) -> SlotId {
        let id = SlotId(self.next_slot.get());
        self.next_slot.set(id.0 + 1);
        self.slots.borrow_mut().push((id, Box::new(callback)));
        id
    }

    /// Remove a callback. Returns false if it was not connected.
    pub fn disconnect(&self, id: SlotId) -> bool {
        let mut slots = self.slots.borrow_mut();
        let before = slots.len();
        slots.retain(|(slot, _)| *slot != id);
        if slots.len() != before {
            return true;
        }
        let mut dropped = self.dropped.borrow_mut();
        if self.running.borrow().contains(&id) && !dropped.contains(&id) {
            dropped.push(id);
            return true;
        }
        false
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.borrow().len() + self.running.borrow().len() - self.dropped.borrow().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every subscriber in connection order.
    ///
    /// Callbacks may connect or disconnect slots; those changes apply from
    /// the next delivery. A value emitted from inside a callback is queued
    /// and delivered to every subscriber once the current value is done.
    pub fn emit(&self, value: &T) {
        if self.emitting.get() {
            self.queued.borrow_mut().push_back(value.clone());
            return;
        }
        self.emitting.set(true);
        self.deliver(value);
        loop {
            let next = self.queued.borrow_mut().pop_front();
            let Some(next) = next else { break };
            self.deliver(&next);
        }
        self.emitting.set(false);
    }

    fn deliver(&self, value: &T) {
        let mut active = std::mem::take(&mut *self.slots.borrow_mut());
        *self.running.borrow_mut() = active.iter().map(|(slot, _)| *slot).collect();

        for (slot, callback) in &mut active {
            if !self.dropped.borrow().contains(slot) {
                callback(value);
            }
        }

        self.running.borrow_mut().clear();
        let mut slots = self.slots.borrow_mut();
        // Slots connected during delivery were pushed onto the empty vec.
        active.append(&mut slots);
        let mut dropped = self.dropped.borrow_mut();
        active.retain(|(slot, _)| !dropped.contains(slot));
        dropped.clear();
        *slots = active;
    }
}
