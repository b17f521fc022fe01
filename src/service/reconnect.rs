//! Handshake authentication and connection establishment.
//!
//! Every handshake, first or repeated, goes through the same two steps:
//! [`ReconnectionHandler::authenticate`] checks the claimed identity against
//! the [`TokenValidator`], then [`ReconnectionHandler::establish`] mints a
//! fresh connection and registers it. No state survives a disconnect, so a
//! reconnect is indistinguishable from a first connect and notifications
//! dispatched in between are not replayed.

use std::sync::Arc;

use crate::auth::TokenValidator;
use crate::domain::connection::OutboundReceiver;
use crate::domain::{Connection, ConnectionId, PresenceTracker, RegisterOutcome, UserId};
use crate::error::GatewayError;

/// Identity a client presents when opening a connection.
#[derive(Debug, Clone)]
pub struct Handshake {
    /// Claimed user id.
    pub user_id: i64,
    /// Access token issued for that user.
    pub token: String,
}

/// Accepts or refuses handshakes and binds accepted ones to the registry.
#[derive(Debug, Clone)]
pub struct ReconnectionHandler {
    validator: Arc<dyn TokenValidator>,
    presence: PresenceTracker,
    outbound_capacity: usize,
}

impl ReconnectionHandler {
    /// Creates a handler.
    #[must_use]
    pub fn new(
        validator: Arc<dyn TokenValidator>,
        presence: PresenceTracker,
        outbound_capacity: usize,
    ) -> Self {
        Self {
            validator,
            presence,
            outbound_capacity,
        }
    }

    /// Validates the handshake without touching the registry.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Authentication`] when the token is invalid or
    /// was issued for a different user than the one claimed.
    pub fn authenticate(&self, handshake: &Handshake) -> Result<UserId, GatewayError> {
        let claimed = UserId::new(handshake.user_id);
        let subject = self.validator.validate(&handshake.token).inspect_err(|err| {
            tracing::warn!(user_id = %claimed, error = %err, "handshake refused");
        })?;

        if subject != claimed {
            tracing::warn!(user_id = %claimed, %subject, "handshake refused: token subject mismatch");
            return Err(GatewayError::Authentication(format!(
                "token was not issued for user {claimed}"
            )));
        }
        Ok(claimed)
    }

    /// Opens and registers a new connection for an authenticated user.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Internal`] if the registry refuses the fresh
    /// connection, which only happens on an id collision.
    pub async fn establish(
        &self,
        user_id: UserId,
        token: String,
    ) -> Result<(Arc<Connection>, OutboundReceiver), GatewayError> {
        let (connection, rx) = Connection::open(user_id, token, self.outbound_capacity);
        let connection = Arc::new(connection);

        match self.presence.connected(user_id, Arc::clone(&connection)).await {
            RegisterOutcome::Added { .. } => {
                tracing::info!(%user_id, connection_id = %connection.id(), "connection established");
                Ok((connection, rx))
            }
            RegisterOutcome::AlreadyRegistered | RegisterOutcome::Rejected => Err(
                GatewayError::Internal(format!("connection id {} already in use", connection.id())),
            ),
        }
    }

    /// Authenticates and establishes in one step.
    ///
    /// # Errors
    ///
    /// Propagates [`Self::authenticate`] and [`Self::establish`] failures.
    pub async fn accept(
        &self,
        handshake: Handshake,
    ) -> Result<(Arc<Connection>, OutboundReceiver), GatewayError> {
        let user_id = self.authenticate(&handshake)?;
        self.establish(user_id, handshake.token).await
    }

    /// Releases a connection of `user_id` after transport close or
    /// explicit logout.
    ///
    /// Only the owning user's session can release a connection; a mismatch
    /// leaves the registry untouched and is logged as an inconsistency.
    pub async fn release(&self, user_id: UserId, connection_id: ConnectionId) {
        if self.presence.disconnected(user_id, connection_id).await.is_some() {
            tracing::info!(%user_id, %connection_id, "connection released");
        }
    }

    /// Returns the presence tracker this handler registers through.
    #[must_use]
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::auth::JwtValidator;
    use crate::domain::ConnectionRegistry;
    use crate::service::NotificationDispatcher;
    use serde_json::json;

    struct Fixture {
        jwt: Arc<JwtValidator>,
        registry: Arc<ConnectionRegistry>,
        handler: ReconnectionHandler,
        dispatcher: NotificationDispatcher,
    }

    fn fixture() -> Fixture {
        let jwt = Arc::new(JwtValidator::new(b"secret", None));
        let registry = Arc::new(ConnectionRegistry::new());
        let presence = PresenceTracker::new(Arc::clone(&registry));
        let validator: Arc<dyn TokenValidator> = Arc::clone(&jwt) as Arc<dyn TokenValidator>;
        let handler = ReconnectionHandler::new(validator, presence, 8);
        let dispatcher = NotificationDispatcher::new(Arc::clone(&registry));
        Fixture {
            jwt,
            registry,
            handler,
            dispatcher,
        }
    }

    fn handshake(fx: &Fixture, user: i64) -> Handshake {
        let Ok(token) = fx.jwt.issue(UserId::new(user), 60) else {
            panic!("signing failed");
        };
        Handshake {
            user_id: user,
            token,
        }
    }

    #[tokio::test]
    async fn valid_handshake_registers() {
        let fx = fixture();
        let Ok((conn, _rx)) = fx.handler.accept(handshake(&fx, 42)).await else {
            panic!("handshake refused");
        };
        assert_eq!(conn.user_id(), UserId::new(42));
        assert_eq!(fx.registry.owner_of(conn.id()).await, Some(UserId::new(42)));
    }

    #[tokio::test]
    async fn invalid_token_leaves_registry_untouched() {
        let fx = fixture();
        let Ok((existing, _rx)) = fx.handler.accept(handshake(&fx, 42)).await else {
            panic!("handshake refused");
        };

        let result = fx
            .handler
            .accept(Handshake {
                user_id: 42,
                token: "forged".to_string(),
            })
            .await;

        assert!(matches!(result, Err(GatewayError::Authentication(_))));
        let ids: Vec<_> = fx
            .registry
            .connections_for(UserId::new(42))
            .await
            .iter()
            .map(|c| c.id())
            .collect();
        assert_eq!(ids, vec![existing.id()]);
    }

    #[tokio::test]
    async fn token_for_other_user_is_refused() {
        let fx = fixture();
        let mut hs = handshake(&fx, 1);
        hs.user_id = 2;

        assert!(fx.handler.accept(hs).await.is_err());
        assert!(fx.registry.connections_for(UserId::new(2)).await.is_empty());
        assert!(fx.registry.connections_for(UserId::new(1)).await.is_empty());
    }

    #[tokio::test]
    async fn reconnect_gets_fresh_id_and_no_replay() {
        let fx = fixture();
        let user = UserId::new(42);

        let Ok((first, _rx)) = fx.handler.accept(handshake(&fx, 42)).await else {
            panic!("handshake refused");
        };
        fx.handler.release(user, first.id()).await;
        assert!(!fx.handler.presence().is_online(user).await);

        let missed = fx.dispatcher.dispatch(user, json!("while away")).await;
        assert_eq!(missed.attempted, 0);

        let Ok((second, mut rx)) = fx.handler.accept(handshake(&fx, 42)).await else {
            panic!("reconnect refused");
        };
        assert_ne!(first.id(), second.id());
        assert!(rx.try_recv().is_err());

        let _ = fx.dispatcher.dispatch(user, json!("welcome back")).await;
        let Some(received) = rx.recv().await else {
            panic!("expected notification after reconnect");
        };
        assert_eq!(received.payload, json!("welcome back"));
    }

    #[tokio::test]
    async fn release_twice_is_harmless() {
        let fx = fixture();
        let Ok((conn, _rx)) = fx.handler.accept(handshake(&fx, 3)).await else {
            panic!("handshake refused");
        };
        fx.handler.release(UserId::new(3), conn.id()).await;
        fx.handler.release(UserId::new(3), conn.id()).await;
        assert_eq!(fx.registry.total_connections().await, 0);
    }

    #[tokio::test]
    async fn release_by_another_user_keeps_connection() {
        let fx = fixture();
        let Ok((conn, _rx)) = fx.handler.accept(handshake(&fx, 3)).await else {
            panic!("handshake refused");
        };

        fx.handler.release(UserId::new(4), conn.id()).await;
        assert_eq!(fx.registry.owner_of(conn.id()).await, Some(UserId::new(3)));
        assert!(fx.handler.presence().is_online(UserId::new(3)).await);

        fx.handler.release(UserId::new(3), conn.id()).await;
        assert_eq!(fx.registry.owner_of(conn.id()).await, None);
    }
}
