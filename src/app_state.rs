//! Shared application state injected into all Axum handlers.

use std::sync::Arc;

use crate::auth::TokenValidator;
use crate::domain::{ConnectionRegistry, PresenceBus, PresenceTracker};
use crate::service::{NotificationDispatcher, ReconnectionHandler};

/// Shared application state available to all handlers via Axum's
/// `State` extractor.
///
/// Every component holds the same [`ConnectionRegistry`] instance; there is
/// no process-wide connection state outside of it.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Live connection registry.
    pub registry: Arc<ConnectionRegistry>,
    /// Presence queries and connect/disconnect observer.
    pub presence: PresenceTracker,
    /// Notification fan-out.
    pub dispatcher: NotificationDispatcher,
    /// Handshake authentication and connection establishment.
    pub handshakes: ReconnectionHandler,
}

impl AppState {
    /// Wires the registry, presence tracker, dispatcher and handshake
    /// handler around one shared registry.
    #[must_use]
    pub fn new(
        validator: Arc<dyn TokenValidator>,
        outbound_queue_capacity: usize,
        presence_bus_capacity: usize,
    ) -> Self {
        let registry = Arc::new(ConnectionRegistry::with_presence_bus(PresenceBus::new(
            presence_bus_capacity,
        )));
        let presence = PresenceTracker::new(Arc::clone(&registry));
        let dispatcher = NotificationDispatcher::new(Arc::clone(&registry));
        let handshakes =
            ReconnectionHandler::new(validator, presence.clone(), outbound_queue_capacity);
        Self {
            registry,
            presence,
            dispatcher,
            handshakes,
        }
    }
}
