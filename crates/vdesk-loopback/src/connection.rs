//! In-process [`Connection`] implementation.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use tracing::{debug, trace, warn};

use vdesk_core::{Connection, Event, EventQueue, Global, ObjectHandle, Request, TransportError};

/// A loopback transport between a client model and a simulated compositor.
///
/// Requests are recorded in order; the compositor consumes them with
/// [`take_requests`](Self::take_requests). Events are pushed straight into
/// the queue assigned to their target object.
#[derive(Debug)]
pub struct LoopbackConnection {
    sent: RefCell<Vec<(ObjectHandle, Request)>>,
    /// Index of the first request the compositor has not seen yet.
    cursor: Cell<usize>,
    binds: RefCell<Vec<(ObjectHandle, Global)>>,
    globals: RefCell<Vec<Global>>,
    next_object: Cell<u32>,
    default_queue: EventQueue,
    routes: RefCell<HashMap<ObjectHandle, EventQueue>>,
    alive: Cell<bool>,
}

impl Default for LoopbackConnection {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackConnection {
    pub fn new() -> Self {
        Self {
            sent: RefCell::new(Vec::new()),
            cursor: Cell::new(0),
            binds: RefCell::new(Vec::new()),
            globals: RefCell::new(Vec::new()),
            next_object: Cell::new(1),
            default_queue: EventQueue::new(),
            routes: RefCell::new(HashMap::new()),
            alive: Cell::new(true),
        }
    }

    // ── Discovery ────────────────────────────────────────────────────

    pub fn advertise(&self, global: Global) {
        debug!("Advertising global {} ({})", global.name, global.interface);
        self.globals.borrow_mut().push(global);
    }

    pub fn globals(&self) -> Vec<Global> {
        self.globals.borrow().clone()
    }

    /// First advertised global implementing `interface`.
    pub fn find_global(&self, interface: &str) -> Option<Global> {
        self.globals
            .borrow()
            .iter()
            .find(|global| global.interface == interface)
            .cloned()
    }

    // ── Server side ──────────────────────────────────────────────────

    /// Every request sent so far, in order.
    pub fn sent(&self) -> Vec<(ObjectHandle, Request)> {
        self.sent.borrow().clone()
    }

    /// Requests sent since the last call.
    pub fn take_requests(&self) -> Vec<(ObjectHandle, Request)> {
        let sent = self.sent.borrow();
        let start = self.cursor.replace(sent.len());
        sent[start..].to_vec()
    }

    /// Binds performed since the last call.
    pub fn take_binds(&self) -> Vec<(ObjectHandle, Global)> {
        std::mem::take(&mut *self.binds.borrow_mut())
    }

    /// Deliver `event` to whichever queue `target` is assigned to.
    pub fn deliver(&self, target: ObjectHandle, event: impl Into<Event>) {
        if !self.alive.get() {
            return;
        }
        let event = event.into();
        trace!("deliver {target}: {event:?}");
        match self.routes.borrow().get(&target) {
            Some(queue) => queue.push(target, event),
            None => self.default_queue.push(target, event),
        }
    }

    // ── Connection state ─────────────────────────────────────────────

    /// Simulate the compositor going away.
    pub fn kill(&self) {
        warn!("Loopback connection died");
        self.alive.set(false);
    }

    pub fn is_alive(&self) -> bool {
        self.alive.get()
    }
}

impl Connection for LoopbackConnection {
    fn send(&self, target: ObjectHandle, request: Request) -> Result<(), TransportError> {
        if !self.alive.get() {
            return Err(TransportError::Disconnected);
        }
        trace!("send {target}: {request:?}");
        self.sent.borrow_mut().push((target, request));
        Ok(())
    }

    fn new_object(&self, interface: &'static str, version: u32) -> ObjectHandle {
        let handle = ObjectHandle(self.next_object.get());
        self.next_object.set(handle.0 + 1);
        trace!("new {interface} v{version} as {handle}");
        handle
    }

    fn bind(&self, global: &Global, version: u32) -> Result<ObjectHandle, TransportError> {
        if !self.alive.get() {
            return Err(TransportError::Disconnected);
        }
        let Some(advertised) = self.find_global(&global.interface) else {
            return Err(TransportError::UnknownGlobal(global.name));
        };
        if advertised.name != global.name {
            return Err(TransportError::UnknownGlobal(global.name));
        }
        let handle = self.new_object("global", version);
        let mut bound = advertised;
        bound.version = version;
        self.binds.borrow_mut().push((handle, bound));
        Ok(handle)
    }

    fn default_queue(&self) -> EventQueue {
        self.default_queue.clone()
    }

    fn assign_queue(&self, object: ObjectHandle, queue: &EventQueue) {
        self.routes.borrow_mut().insert(object, queue.clone());
    }
}
