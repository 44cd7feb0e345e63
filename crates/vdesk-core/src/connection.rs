//! Boundary to the external transport and dispatch queue.
//!
//! The model never frames bytes or owns a socket. A [`Connection`] is
//! whatever carries requests to the compositor; an [`EventQueue`] is the
//! ordered inbox a connection fills and a caller drains on its own context.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use tracing::{trace, warn};

use crate::error::TransportError;
use crate::manager::VirtualDesktopManager;
use crate::protocol::{Event, Global, ObjectHandle, Request};

/// The transport a manager and its desktops talk through.
///
/// Every method is fire-and-forget: a successful `send` only means the
/// request was queued, never that the server acted on it.
pub trait Connection {
    /// Queue `request` for the object `target`.
    fn send(&self, target: ObjectHandle, request: Request) -> Result<(), TransportError>;

    /// Reserve a client-side id for an object created by a request.
    fn new_object(&self, interface: &'static str, version: u32) -> ObjectHandle;

    /// Bind `global` at `version`, returning the fresh object.
    fn bind(&self, global: &Global, version: u32) -> Result<ObjectHandle, TransportError>;

    /// The queue objects use until told otherwise.
    fn default_queue(&self) -> EventQueue;

    /// Deliver future events for `object` to `queue`.
    fn assign_queue(&self, object: ObjectHandle, queue: &EventQueue);
}

/// A FIFO of inbound events, drained on the caller's context.
///
/// Clones share the same underlying queue.
#[derive(Debug, Clone, Default)]
pub struct EventQueue {
    inner: Rc<RefCell<VecDeque<(ObjectHandle, Event)>>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event addressed to `target`.
    pub fn push(&self, target: ObjectHandle, event: impl Into<Event>) {
        self.inner.borrow_mut().push_back((target, event.into()));
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    /// Whether `self` and `other` are the same queue.
    pub fn same_queue(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Dispatch every queued event, in order, to `manager`.
    ///
    /// Events queued by callbacks during dispatch are handled in the same
    /// call. Returns how many events were dispatched; anomalies are logged by
    /// the manager and do not stop the drain.
    pub fn dispatch_pending(&self, manager: &mut VirtualDesktopManager) -> usize {
        let mut dispatched = 0;
        loop {
            // The borrow must end before dispatch so callbacks can push.
            let next = self.inner.borrow_mut().pop_front();
            let Some((target, event)) = next else {
                break;
            };
            trace!("dispatch {target}: {event:?}");
            if let Err(anomaly) = manager.dispatch(target, event) {
                warn!("Dropped event for {target}: {anomaly}");
            }
            dispatched += 1;
        }
        dispatched
    }
}
