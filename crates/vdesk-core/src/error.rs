//! Error types.
//!
//! [`Error`] covers misuse and binding failures reported to the caller.
//! [`ProtocolAnomaly`] covers server behaviour that breaks the protocol's
//! guarantees; those are logged and the offending event is dropped.

use crate::protocol::ObjectHandle;

/// Failures reported synchronously by the model.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Proxy is already bound to {0}")]
    AlreadyBound(ObjectHandle),

    #[error("Global {name} implements '{found}', expected '{expected}'")]
    InterfaceMismatch {
        name: u32,
        expected: &'static str,
        found: String,
    },

    #[error("Global {name} negotiates unusable version {version}")]
    UnsupportedVersion { name: u32, version: u32 },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failures reported by the external transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("Connection to the compositor is gone")]
    Disconnected,

    #[error("Global {0} is not advertised")]
    UnknownGlobal(u32),
}

/// A server event that violates the protocol contract.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolAnomaly {
    #[error("Desktop '{0}' created twice")]
    DuplicateDesktop(String),

    #[error("Removal of unknown desktop '{0}'")]
    UnknownDesktop(String),

    #[error("Event for unknown object {0}")]
    UnknownObject(ObjectHandle),

    #[error("Event for {0} before its desktop id was set")]
    EventBeforeId(ObjectHandle),

    #[error("Desktop {handle} id changed from '{current}' to '{received}'")]
    IdChanged {
        handle: ObjectHandle,
        current: String,
        received: String,
    },

    #[error("Event does not belong to the interface of {0}")]
    WrongInterface(ObjectHandle),

    #[error("Event for unbound manager")]
    NotBound,
}
