//! vdesk loopback — in-process transport and simulated compositor.
//!
//! This crate:
//! - Implements [`vdesk_core::Connection`] without any socket.
//! - Records client requests and routes server events to the right queue.
//! - Simulates a compositor that owns the authoritative desktop list.
//!
//! It backs the `vdesk` tool and the end-to-end tests. Nothing here is
//! needed by a real transport binding.

pub mod compositor;
pub mod connection;

pub use compositor::{Compositor, ServerDesktop};
pub use connection::LoopbackConnection;
