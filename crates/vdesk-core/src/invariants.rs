//! Invariant validation for the manager's desktop collection.
//!
//! Called after every `dispatch` in debug builds.

use std::collections::HashSet;

use crate::manager::VirtualDesktopManager;

/// Error indicating which invariant was violated.
#[derive(Debug, thiserror::Error)]
pub enum InvariantError {
    #[error("Desktop '{0}' is not bound to a protocol object")]
    DesktopUnbound(String),

    #[error("Route {0} points to missing desktop '{1}'")]
    DanglingRoute(String, String),

    #[error("Desktop '{0}' has no route for its object")]
    MissingRoute(String),

    #[error("Desktop keyed '{0}' reports id '{1}'")]
    IdMismatch(String, String),

    #[error("Object {0} is shared by more than one desktop")]
    SharedObject(String),

    #[error("Unbound manager still owns {0} desktops")]
    ChildrenWhileUnbound(usize),
}

/// Validate all manager invariants. Returns the first violation found.
pub fn validate(manager: &VirtualDesktopManager) -> Result<(), InvariantError> {
    // 1. No children outlive the manager's binding
    if !manager.is_valid() && !manager.desktops.is_empty() {
        return Err(InvariantError::ChildrenWhileUnbound(manager.desktops.len()));
    }

    // 2. Every route leads to a desktop bound to that object
    for (handle, id) in &manager.routes {
        let routed = manager
            .desktops
            .get(id)
            .is_some_and(|desktop| desktop.handle() == Some(*handle));
        if !routed {
            return Err(InvariantError::DanglingRoute(handle.to_string(), id.clone()));
        }
    }

    // 3. Every desktop is bound, routed, unique and keyed by its own id
    let mut seen = HashSet::new();
    for (key, desktop) in &manager.desktops {
        let Some(handle) = desktop.handle() else {
            return Err(InvariantError::DesktopUnbound(key.clone()));
        };
        if !seen.insert(handle) {
            return Err(InvariantError::SharedObject(handle.to_string()));
        }
        if !manager.routes.contains_key(&handle) {
            return Err(InvariantError::MissingRoute(key.clone()));
        }
        let id = desktop.id();
        if id != *key {
            return Err(InvariantError::IdMismatch(key.clone(), id));
        }
    }

    Ok(())
}
