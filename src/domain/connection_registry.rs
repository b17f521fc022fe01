//! Process-local map from users to their live connections.
//!
//! [`ConnectionRegistry`] keeps a forward index `user -> {connection}` and a
//! reverse index `connection -> user`. Both are mutated together under one
//! write lock so that every registration and removal is observed atomically.
//! Offline/online transitions are published on the [`PresenceBus`] before
//! that lock is released, so the event stream follows registry order.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{RwLock, broadcast};

use super::{Connection, ConnectionId, PresenceBus, PresenceEvent, UserId};
use crate::error::GatewayError;

/// Result of [`ConnectionRegistry::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    /// The connection was added. `first_for_user` is `true` when the user
    /// had no live connection before.
    Added {
        /// Whether this registration took the user from offline to online.
        first_for_user: bool,
    },
    /// A connection with the same id is already registered for this user.
    AlreadyRegistered,
    /// The connection belongs to a different user than the one claimed.
    Rejected,
}

/// A connection removed by [`ConnectionRegistry::unregister`].
#[derive(Debug, Clone)]
pub struct Removal {
    /// The connection that was removed.
    pub connection: Arc<Connection>,
    /// Whether the owning user has no live connection left.
    pub last_for_user: bool,
}

#[derive(Debug, Default)]
struct Inner {
    by_user: HashMap<UserId, HashMap<ConnectionId, Arc<Connection>>>,
    owners: HashMap<ConnectionId, UserId>,
}

/// Registry of live connections keyed by user.
///
/// A user maps to a set of connections (several tabs or devices); a
/// connection maps to exactly one user for its lifetime.
///
/// # Concurrency
///
/// - Lookups take the read lock and return owned snapshots.
/// - Registrations and removals take the write lock once, update both
///   indexes and publish any presence transition before releasing it.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    inner: RwLock<Inner>,
    presence: PresenceBus,
}

impl ConnectionRegistry {
    /// Creates an empty registry with a default-sized presence bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty registry publishing transitions on `presence`.
    #[must_use]
    pub fn with_presence_bus(presence: PresenceBus) -> Self {
        Self {
            inner: RwLock::default(),
            presence,
        }
    }

    /// Subscribes to the online/offline transitions of every user.
    #[must_use]
    pub fn subscribe_presence(&self) -> broadcast::Receiver<PresenceEvent> {
        self.presence.subscribe()
    }

    /// Registers `connection` under `user_id`.
    ///
    /// Idempotent per connection id. A connection whose owner differs from
    /// `user_id`, or whose id is already bound to another user, is rejected
    /// without touching the registry.
    pub async fn register(&self, user_id: UserId, connection: Arc<Connection>) -> RegisterOutcome {
        let connection_id = connection.id();
        if connection.user_id() != user_id {
            log_inconsistency(&GatewayError::RegistryInconsistency {
                connection_id,
                claimed: user_id,
            });
            return RegisterOutcome::Rejected;
        }

        let mut inner = self.inner.write().await;
        match inner.owners.get(&connection_id).copied() {
            Some(owner) if owner == user_id => return RegisterOutcome::AlreadyRegistered,
            Some(_) => {
                drop(inner);
                log_inconsistency(&GatewayError::RegistryInconsistency {
                    connection_id,
                    claimed: user_id,
                });
                return RegisterOutcome::Rejected;
            }
            None => {}
        }

        inner.owners.insert(connection_id, user_id);
        let set = inner.by_user.entry(user_id).or_default();
        let first_for_user = set.is_empty();
        set.insert(connection_id, connection);
        let live = set.len();
        if first_for_user {
            let _ = self.presence.publish(PresenceEvent::Online {
                user_id,
                timestamp: Utc::now(),
            });
        }
        drop(inner);

        tracing::debug!(%user_id, %connection_id, live, "connection registered");
        RegisterOutcome::Added { first_for_user }
    }

    /// Removes a connection by id.
    ///
    /// Unknown ids are a no-op returning `None`; transports may report a
    /// close more than once.
    pub async fn unregister(&self, connection_id: ConnectionId) -> Option<Removal> {
        let mut inner = self.inner.write().await;
        let user_id = inner.owners.remove(&connection_id)?;
        let removal = remove_from_user(&mut inner, user_id, connection_id);
        self.announce_removal(removal.as_ref());
        drop(inner);

        if let Some(removal) = &removal {
            tracing::debug!(
                %user_id,
                %connection_id,
                last_for_user = removal.last_for_user,
                "connection unregistered"
            );
        }
        removal
    }

    /// Removes a connection only if it is owned by `user_id`.
    ///
    /// Addressing a connection under the wrong user is logged as a registry
    /// inconsistency and otherwise ignored.
    pub async fn unregister_owned(
        &self,
        user_id: UserId,
        connection_id: ConnectionId,
    ) -> Option<Removal> {
        let mut inner = self.inner.write().await;
        match inner.owners.get(&connection_id).copied() {
            None => return None,
            Some(owner) if owner != user_id => {
                drop(inner);
                log_inconsistency(&GatewayError::RegistryInconsistency {
                    connection_id,
                    claimed: user_id,
                });
                return None;
            }
            Some(_) => {}
        }
        inner.owners.remove(&connection_id);
        let removal = remove_from_user(&mut inner, user_id, connection_id);
        self.announce_removal(removal.as_ref());
        removal
    }

    /// Returns a snapshot of the live connections of `user_id`.
    pub async fn connections_for(&self, user_id: UserId) -> Vec<Arc<Connection>> {
        let inner = self.inner.read().await;
        inner
            .by_user
            .get(&user_id)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the number of live connections of `user_id`.
    pub async fn connection_count(&self, user_id: UserId) -> usize {
        let inner = self.inner.read().await;
        inner.by_user.get(&user_id).map_or(0, HashMap::len)
    }

    /// Returns the user owning `connection_id`, if it is live.
    pub async fn owner_of(&self, connection_id: ConnectionId) -> Option<UserId> {
        self.inner.read().await.owners.get(&connection_id).copied()
    }

    /// Returns all users with at least one live connection, sorted.
    pub async fn online_users(&self) -> Vec<UserId> {
        let inner = self.inner.read().await;
        let mut users: Vec<UserId> = inner.by_user.keys().copied().collect();
        users.sort_unstable();
        users
    }

    /// Returns the number of live connections across all users.
    pub async fn total_connections(&self) -> usize {
        self.inner.read().await.owners.len()
    }

    /// Must be called with the write lock held.
    fn announce_removal(&self, removal: Option<&Removal>) {
        if let Some(removal) = removal
            && removal.last_for_user
        {
            let _ = self.presence.publish(PresenceEvent::Offline {
                user_id: removal.connection.user_id(),
                timestamp: Utc::now(),
            });
        }
    }
}

/// Drops `connection_id` from the user's set, pruning the set when empty.
fn remove_from_user(
    inner: &mut Inner,
    user_id: UserId,
    connection_id: ConnectionId,
) -> Option<Removal> {
    let set = inner.by_user.get_mut(&user_id)?;
    let connection = set.remove(&connection_id)?;
    let last_for_user = set.is_empty();
    if last_for_user {
        inner.by_user.remove(&user_id);
    }
    Some(Removal {
        connection,
        last_for_user,
    })
}

fn log_inconsistency(err: &GatewayError) {
    tracing::warn!(error = %err, code = err.error_code(), "registry inconsistency ignored");
}
