//! WebSocket layer: handshake, per-connection loop, message envelope.
//!
//! The endpoint at `/ws` authenticates the handshake before upgrading and
//! then pushes every notification addressed to the user over the socket.

pub mod connection;
pub mod handler;
pub mod messages;
