//! Presence derived from registry occupancy.
//!
//! [`PresenceTracker`] is the single entry point for connect and disconnect
//! events. It mutates the [`ConnectionRegistry`], which publishes a
//! [`PresenceEvent`] on its [`PresenceBus`] whenever a user crosses between
//! offline and online. Online status itself is never stored: it is read back
//! from the registry.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use super::connection_registry::{RegisterOutcome, Removal};
use super::{Connection, ConnectionId, ConnectionRegistry, UserId};

/// Capacity of the bus a registry creates when none is supplied.
pub const DEFAULT_BUS_CAPACITY: usize = 1024;

/// Online/offline transition of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum PresenceEvent {
    /// The user's first connection was registered.
    Online {
        /// User that came online.
        user_id: UserId,
        /// Transition time.
        timestamp: DateTime<Utc>,
    },
    /// The user's last connection was removed.
    Offline {
        /// User that went offline.
        user_id: UserId,
        /// Transition time.
        timestamp: DateTime<Utc>,
    },
}

impl PresenceEvent {
    /// Returns the user this event is about.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        match self {
            Self::Online { user_id, .. } | Self::Offline { user_id, .. } => *user_id,
        }
    }

    /// Returns `true` for [`PresenceEvent::Online`].
    #[must_use]
    pub const fn is_online(&self) -> bool {
        matches!(self, Self::Online { .. })
    }
}

/// Broadcast bus for [`PresenceEvent`]s.
///
/// Backed by a `tokio::broadcast` channel. Lagging receivers lose the oldest
/// transitions; publishing with no receivers drops the event.
#[derive(Debug, Clone)]
pub struct PresenceBus {
    sender: broadcast::Sender<PresenceEvent>,
}

impl PresenceBus {
    /// Creates a new bus with the given channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publishes an event, returning how many receivers got it.
    pub fn publish(&self, event: PresenceEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Creates a receiver for all future events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.sender.subscribe()
    }
}

impl Default for PresenceBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

/// Observes connection lifecycle and answers online/offline queries.
#[derive(Debug, Clone)]
pub struct PresenceTracker {
    registry: Arc<ConnectionRegistry>,
}

impl PresenceTracker {
    /// Creates a tracker over `registry`.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Subscribes to presence transitions.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<PresenceEvent> {
        self.registry.subscribe_presence()
    }

    /// Records a new connection for `user_id`.
    pub async fn connected(&self, user_id: UserId, connection: Arc<Connection>) -> RegisterOutcome {
        let outcome = self.registry.register(user_id, connection).await;
        if matches!(outcome, RegisterOutcome::Added { first_for_user: true }) {
            tracing::info!(%user_id, "user online");
        }
        outcome
    }

    /// Records that a connection of `user_id` went away.
    ///
    /// Repeated calls are harmless. A connection owned by another user is
    /// left in place and logged as a registry inconsistency.
    pub async fn disconnected(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Option<Removal> {
        let removal = self.registry.unregister_owned(user_id, connection_id).await;
        if removal.as_ref().is_some_and(|r| r.last_for_user) {
            tracing::info!(%user_id, "user offline");
        }
        removal
    }

    /// Returns `true` when `user_id` has at least one live connection.
    pub async fn is_online(&self, user_id: UserId) -> bool {
        !self.registry.connections_for(user_id).await.is_empty()
    }

    /// Returns every online user.
    pub async fn online_users(&self) -> Vec<UserId> {
        self.registry.online_users().await
    }
}
