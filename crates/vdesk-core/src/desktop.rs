//! A single virtual desktop and the non-owning handle given to observers.
//!
//! Attribute events (`desktop_id`, `name`) are staged and only become
//! visible when the desktop's `done` arrives, so observers never see half of
//! an update. Activation is a separate two-state machine that changes as soon
//! as `activated` or `deactivated` is received.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use serde::Serialize;
use tracing::{debug, trace};

use crate::connection::Connection;
use crate::error::{Error, ProtocolAnomaly};
use crate::protocol::{DesktopEvent, ObjectHandle, Request};
use crate::proxy::{Pending, Proxy};
use crate::signal::{Signal, SlotId};

/// Activation state of a desktop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Inactive,
    Active,
}

/// Notifications a desktop emits to its observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesktopNotification {
    Activated,
    Deactivated,
    /// A batch of attribute changes was committed.
    Done,
    /// The server removed this desktop; the handle dies right after.
    Removed,
}

#[derive(Debug)]
struct DesktopState {
    id: Pending<String>,
    name: Pending<String>,
    activation: Activation,
    /// Whether the server has sent `desktop_id` for this object yet.
    id_received: bool,
}

/// Client-side proxy for one server desktop.
///
/// Owned by its [`VirtualDesktopManager`](crate::VirtualDesktopManager);
/// everyone else reaches it through a [`DesktopHandle`].
pub struct VirtualDesktop {
    proxy: RefCell<Proxy>,
    state: RefCell<DesktopState>,
    notifications: Signal<DesktopNotification>,
    connection: Rc<dyn Connection>,
    parent: ObjectHandle,
}

impl std::fmt::Debug for VirtualDesktop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualDesktop")
            .field("proxy", &self.proxy.borrow())
            .field("state", &self.state.borrow())
            .field("parent", &self.parent)
            .finish_non_exhaustive()
    }
}

impl VirtualDesktop {
    /// A desktop announced by `desktop_created`. The announced id is the
    /// committed id until the object's own `desktop_id` confirms it.
    pub(crate) fn new(connection: Rc<dyn Connection>, parent: ObjectHandle, id: String) -> Self {
        Self {
            proxy: RefCell::new(Proxy::new()),
            state: RefCell::new(DesktopState {
                id: Pending::new(id),
                name: Pending::new(String::new()),
                activation: Activation::Inactive,
                id_received: false,
            }),
            notifications: Signal::new(),
            connection,
            parent,
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    pub fn setup(&self, handle: ObjectHandle) -> Result<(), Error> {
        self.proxy.borrow_mut().setup(handle)
    }

    pub fn is_valid(&self) -> bool {
        self.proxy.borrow().is_valid()
    }

    pub fn handle(&self) -> Option<ObjectHandle> {
        self.proxy.borrow().handle()
    }

    /// Send this desktop's destructor and unbind.
    pub fn release(&self) {
        self.proxy.borrow_mut().release(self.connection.as_ref());
    }

    /// Unbind without sending anything.
    pub fn destroy(&self) {
        self.proxy.borrow_mut().destroy();
    }

    /// The manager object this desktop was created under.
    pub const fn parent(&self) -> ObjectHandle {
        self.parent
    }

    // ── Requests ─────────────────────────────────────────────────────

    /// Ask the server to activate this desktop. Nothing changes locally
    /// until `activated` arrives.
    pub fn request_activate(&self) {
        self.proxy
            .borrow()
            .send(self.connection.as_ref(), Request::Activate);
    }

    // ── Committed attributes ─────────────────────────────────────────

    pub fn id(&self) -> String {
        self.state.borrow().id.get().clone()
    }

    pub fn name(&self) -> String {
        self.state.borrow().name.get().clone()
    }

    pub fn is_active(&self) -> bool {
        self.activation() == Activation::Active
    }

    pub fn activation(&self) -> Activation {
        self.state.borrow().activation
    }

    /// Whether staged attributes are waiting for `done`.
    pub fn has_pending_changes(&self) -> bool {
        let state = self.state.borrow();
        state.id.is_dirty() || state.name.is_dirty()
    }

    // ── Observers ────────────────────────────────────────────────────

    pub fn subscribe(&self, callback: impl FnMut(&DesktopNotification) + 'static) -> SlotId {
        self.notifications.connect(callback)
    }

    // ── Event handling (manager → desktop) ───────────────────────────

    pub(crate) fn handle_event(
        &self,
        target: ObjectHandle,
        event: DesktopEvent,
    ) -> Result<(), ProtocolAnomaly> {
        trace!("{target}: {event:?}");
        let notification = {
            let mut state = self.state.borrow_mut();

            if let DesktopEvent::DesktopId { id } = event {
                let current = state.id.staged().unwrap_or_else(|| state.id.get());
                if *current != id {
                    return Err(ProtocolAnomaly::IdChanged {
                        handle: target,
                        current: current.clone(),
                        received: id,
                    });
                }
                if !state.id_received {
                    state.id.stage(id);
                    state.id_received = true;
                }
                return Ok(());
            }

            if !state.id_received {
                return Err(ProtocolAnomaly::EventBeforeId(target));
            }

            match event {
                DesktopEvent::DesktopId { .. } => None,
                DesktopEvent::Name { name } => {
                    state.name.stage(name);
                    None
                }
                DesktopEvent::Activated => {
                    (state.activation == Activation::Inactive).then(|| {
                        state.activation = Activation::Active;
                        DesktopNotification::Activated
                    })
                }
                DesktopEvent::Deactivated => {
                    (state.activation == Activation::Active).then(|| {
                        state.activation = Activation::Inactive;
                        DesktopNotification::Deactivated
                    })
                }
                DesktopEvent::Done => {
                    state.id.commit();
                    state.name.commit();
                    Some(DesktopNotification::Done)
                }
                // Removal is structural; the manager handles it.
                DesktopEvent::Removed => None,
            }
        };

        if let Some(notification) = notification {
            self.notifications.emit(&notification);
        }
        Ok(())
    }

    pub(crate) fn notify_removed(&self) {
        debug!("Desktop '{}' removed by server", self.id());
        self.notifications.emit(&DesktopNotification::Removed);
    }
}

impl Drop for VirtualDesktop {
    fn drop(&mut self) {
        if self.proxy.get_mut().is_valid() {
            self.proxy.get_mut().release(self.connection.as_ref());
        }
    }
}

/// Non-owning reference to a desktop.
///
/// Dies as soon as the manager drops the desktop (server removal or manager
/// teardown). Every accessor returns `None` once that has happened.
#[derive(Debug, Clone)]
pub struct DesktopHandle {
    inner: Weak<VirtualDesktop>,
}

impl DesktopHandle {
    pub(crate) fn new(desktop: &Rc<VirtualDesktop>) -> Self {
        Self {
            inner: Rc::downgrade(desktop),
        }
    }

    /// Whether the manager still owns the desktop.
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    /// Run `f` against the desktop if it is still alive.
    pub fn with<R>(&self, f: impl FnOnce(&VirtualDesktop) -> R) -> Option<R> {
        self.inner.upgrade().map(|desktop| f(&desktop))
    }

    pub fn id(&self) -> Option<String> {
        self.with(VirtualDesktop::id)
    }

    pub fn name(&self) -> Option<String> {
        self.with(VirtualDesktop::name)
    }

    pub fn is_active(&self) -> Option<bool> {
        self.with(VirtualDesktop::is_active)
    }

    /// Returns false if the desktop is gone and nothing was sent.
    pub fn request_activate(&self) -> bool {
        self.with(VirtualDesktop::request_activate).is_some()
    }

    pub fn subscribe(
        &self,
        callback: impl FnMut(&DesktopNotification) + 'static,
    ) -> Option<SlotId> {
        self.with(|desktop| desktop.subscribe(callback))
    }

    pub fn unsubscribe(&self, slot: SlotId) -> bool {
        self.with(|desktop| desktop.notifications.disconnect(slot))
            .unwrap_or(false)
    }

    /// Whether both handles refer to the same desktop object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.inner, &other.inner)
    }
}

/// Serializable view of a desktop's committed state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DesktopSnapshot {
    pub id: String,
    pub name: String,
    pub active: bool,
}

impl From<&VirtualDesktop> for DesktopSnapshot {
    fn from(desktop: &VirtualDesktop) -> Self {
        Self {
            id: desktop.id(),
            name: desktop.name(),
            active: desktop.is_active(),
        }
    }
}
