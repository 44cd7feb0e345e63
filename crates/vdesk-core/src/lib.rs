//! vdesk core — transport-agnostic client model for compositor virtual desktops
//!
//! The compositor owns the desktops. It announces them, renames them,
//! reorders and activates them, and removes them through a one-way event
//! stream; the client can only ask for changes and wait for the events that
//! reflect the server's decision.
//!
//! This crate keeps the client's view of that collection consistent:
//! a [`VirtualDesktopManager`] owns one [`VirtualDesktop`] per server id in
//! layout order, every desktop batches its attribute updates until `done`,
//! and observers only ever hold non-owning [`DesktopHandle`]s.
//!
//! The transport is abstracted behind [`Connection`]; inbound events are
//! drained from an [`EventQueue`].
//!
//! # Quick Start
//! ```ignore
//! use std::rc::Rc;
//! use vdesk_core::{Global, VirtualDesktopManager, MANAGER_INTERFACE};
//!
//! let global = Global::new(12, MANAGER_INTERFACE, 2);
//! let mut manager = VirtualDesktopManager::bind(connection, &global, 2)?;
//!
//! manager.subscribe(|n| println!("{n:?}"));
//! manager.event_queue().dispatch_pending(&mut manager);
//!
//! // On connection loss, never `release`:
//! manager.destroy();
//! ```

pub mod connection;
pub mod desktop;
pub mod error;
pub mod invariants;
pub mod manager;
pub mod protocol;
pub mod proxy;
mod signal;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export primary API types at crate root
pub use connection::{Connection, EventQueue};
pub use desktop::{Activation, DesktopHandle, DesktopNotification, DesktopSnapshot, VirtualDesktop};
pub use error::{Error, ProtocolAnomaly, TransportError};
pub use manager::{ManagerNotification, VirtualDesktopManager, POSITION_END};
pub use protocol::{
    DesktopEvent, Event, Global, ManagerEvent, ObjectHandle, Request, DESKTOP_INTERFACE,
    MANAGER_INTERFACE, SUPPORTED_VERSION,
};
pub use signal::SlotId;
