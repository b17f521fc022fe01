//! Domain layer: identifiers, connections, the registry and presence.
//!
//! This module contains the server-side model of who is connected: typed
//! user and connection identifiers, the live [`Connection`] handle, the
//! [`ConnectionRegistry`] mapping users to their connections, and the
//! [`PresenceTracker`] that derives online status from it.

pub mod connection;
pub mod connection_id;
pub mod connection_registry;
pub mod notification;
pub mod presence;
pub mod user_id;

pub use connection::Connection;
pub use connection_id::ConnectionId;
pub use connection_registry::{ConnectionRegistry, RegisterOutcome, Removal};
pub use notification::Notification;
pub use presence::{PresenceBus, PresenceEvent, PresenceTracker};
pub use user_id::UserId;
