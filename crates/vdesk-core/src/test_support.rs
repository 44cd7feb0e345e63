//! A connection that records requests, for unit tests.

use std::cell::{Cell, RefCell};

use crate::connection::{Connection, EventQueue};
use crate::error::TransportError;
use crate::protocol::{Global, ObjectHandle, Request};

#[derive(Debug, Default)]
pub struct RecordingConnection {
    sent: RefCell<Vec<(ObjectHandle, Request)>>,
    next_object: Cell<u32>,
    queue: EventQueue,
    dead: Cell<bool>,
}

impl RecordingConnection {
    pub fn new() -> Self {
        Self {
            next_object: Cell::new(100),
            ..Self::default()
        }
    }

    pub fn sent(&self) -> Vec<(ObjectHandle, Request)> {
        self.sent.borrow().clone()
    }

    pub fn kill(&self) {
        self.dead.set(true);
    }
}

impl Connection for RecordingConnection {
    fn send(&self, target: ObjectHandle, request: Request) -> Result<(), TransportError> {
        if self.dead.get() {
            return Err(TransportError::Disconnected);
        }
        self.sent.borrow_mut().push((target, request));
        Ok(())
    }

    fn new_object(&self, _interface: &'static str, _version: u32) -> ObjectHandle {
        let id = self.next_object.get();
        self.next_object.set(id + 1);
        ObjectHandle(id)
    }

    fn bind(&self, _global: &Global, _version: u32) -> Result<ObjectHandle, TransportError> {
        Ok(self.new_object(crate::protocol::MANAGER_INTERFACE, 0))
    }

    fn default_queue(&self) -> EventQueue {
        self.queue.clone()
    }

    fn assign_queue(&self, _object: ObjectHandle, _queue: &EventQueue) {}
}
