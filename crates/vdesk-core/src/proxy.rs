//! Shared proxy lifecycle and the double-buffered attribute used for
//! `done`-batched updates.

use tracing::{debug, warn};

use crate::connection::Connection;
use crate::error::Error;
use crate::protocol::{ObjectHandle, Request};

/// Binding state of one protocol object.
///
/// `release` talks to the server, `destroy` never does. Both leave the
/// proxy unbound and ready for another `setup`.
#[derive(Debug, Default)]
pub struct Proxy {
    handle: Option<ObjectHandle>,
}

impl Proxy {
    pub const fn new() -> Self {
        Self { handle: None }
    }

    pub fn setup(&mut self, handle: ObjectHandle) -> Result<(), Error> {
        if let Some(current) = self.handle {
            warn!("setup({handle}) on proxy already bound to {current}");
            return Err(Error::AlreadyBound(current));
        }
        debug!("Proxy bound to {handle}");
        self.handle = Some(handle);
        Ok(())
    }

    pub const fn handle(&self) -> Option<ObjectHandle> {
        self.handle
    }

    pub const fn is_valid(&self) -> bool {
        self.handle.is_some()
    }

    /// Send `request` if bound. Unbound proxies drop the request.
    pub fn send(&self, connection: &dyn Connection, request: Request) {
        let Some(handle) = self.handle else {
            warn!("Ignoring {request:?} on unbound proxy");
            return;
        };
        if let Err(e) = connection.send(handle, request) {
            warn!("Failed to send request to {handle}: {e}");
        }
    }

    /// Graceful teardown: send the destructor, then unbind.
    pub fn release(&mut self, connection: &dyn Connection) {
        if let Some(handle) = self.handle.take() {
            debug!("Releasing {handle}");
            if let Err(e) = connection.send(handle, Request::Destroy) {
                warn!("Failed to release {handle}: {e}");
            }
        }
    }

    /// Abrupt teardown for a dead transport: unbind without any traffic.
    pub fn destroy(&mut self) {
        if let Some(handle) = self.handle.take() {
            debug!("Destroying {handle} without protocol traffic");
        }
    }
}

/// An attribute whose updates stay invisible until committed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Pending<T> {
    committed: T,
    staged: Option<T>,
}

impl<T> Pending<T> {
    pub const fn new(value: T) -> Self {
        Self {
            committed: value,
            staged: None,
        }
    }

    /// The last committed value.
    pub const fn get(&self) -> &T {
        &self.committed
    }

    /// Buffer a new value, replacing any earlier staged one.
    pub fn stage(&mut self, value: T) {
        self.staged = Some(value);
    }

    pub const fn staged(&self) -> Option<&T> {
        self.staged.as_ref()
    }

    pub const fn is_dirty(&self) -> bool {
        self.staged.is_some()
    }

    /// Make the staged value visible. Returns true if anything was staged.
    pub fn commit(&mut self) -> bool {
        match self.staged.take() {
            Some(value) => {
                self.committed = value;
                true
            }
            None => false,
        }
    }
}
