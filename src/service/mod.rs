//! Service layer: notification fan-out and handshake handling.
//!
//! [`NotificationDispatcher`] routes notifications to live connections;
//! [`ReconnectionHandler`] authenticates handshakes and registers the
//! resulting connections through the [`crate::domain::PresenceTracker`].

pub mod dispatcher;
pub mod reconnect;

pub use dispatcher::{DeliveryResult, NotificationDispatcher};
pub use reconnect::{Handshake, ReconnectionHandler};
