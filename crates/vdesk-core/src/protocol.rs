//! Protocol-level message shapes.
//!
//! [`Request`] is what the client sends to the compositor, [`Event`] is what
//! the compositor sends back. Both are one-way: there are no replies, only
//! later events that reflect whatever the server decided to do.

use serde::{Deserialize, Serialize};

/// Interface name of the virtual desktop manager global.
pub const MANAGER_INTERFACE: &str = "org_kde_lingmo_virtual_desktop_management";

/// Interface name of a single virtual desktop object.
pub const DESKTOP_INTERFACE: &str = "org_kde_lingmo_virtual_desktop";

/// Highest manager version this client understands. Version 2 added `rows`.
pub const SUPPORTED_VERSION: u32 = 2;

/// Opaque identity of a protocol object.
///
/// Allocated by the connection; the model only compares and forwards it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectHandle(pub u32);

impl std::fmt::Display for ObjectHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "obj:{}", self.0)
    }
}

/// A global advertised by the discovery mechanism.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Global {
    pub name: u32,
    pub interface: String,
    pub version: u32,
}

impl Global {
    pub fn new(name: u32, interface: impl Into<String>, version: u32) -> Self {
        Self {
            name,
            interface: interface.into(),
            version,
        }
    }
}

/// Requests a client sends. The target object is passed alongside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "request", rename_all = "snake_case")]
pub enum Request {
    /// Manager: bind a child desktop object for `desktop_id`.
    GetVirtualDesktop { new_id: ObjectHandle, desktop_id: String },
    /// Manager: ask for a new desktop at `position`.
    CreateVirtualDesktop { name: String, position: u32 },
    /// Manager: ask for desktop `desktop_id` to go away.
    RemoveVirtualDesktop { desktop_id: String },
    /// Desktop: ask for this desktop to become the active one.
    Activate,
    /// Either object: graceful destructor.
    Destroy,
}

/// Events addressed to the manager object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ManagerEvent {
    DesktopCreated { id: String, position: u32 },
    DesktopRemoved { id: String },
    Rows { rows: u32 },
    Done,
}

/// Events addressed to a single desktop object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DesktopEvent {
    DesktopId { id: String },
    Name { name: String },
    Activated,
    Deactivated,
    Done,
    Removed,
}

/// Any inbound event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Event {
    Manager(ManagerEvent),
    Desktop(DesktopEvent),
}

impl From<ManagerEvent> for Event {
    fn from(event: ManagerEvent) -> Self {
        Self::Manager(event)
    }
}

impl From<DesktopEvent> for Event {
    fn from(event: DesktopEvent) -> Self {
        Self::Desktop(event)
    }
}
