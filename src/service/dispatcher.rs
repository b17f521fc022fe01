//! Fan-out of notifications to every live connection of a user.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use utoipa::ToSchema;

use crate::domain::{Connection, ConnectionRegistry, Notification, UserId};
use crate::error::GatewayError;

/// Outcome of one [`NotificationDispatcher::dispatch`] call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DeliveryResult {
    /// Id of the dispatched notification.
    pub notification_id: uuid::Uuid,
    /// Target user.
    pub user_id: UserId,
    /// Connections the notification was offered to.
    pub attempted: usize,
    /// Connections whose outbound queue accepted it.
    pub delivered: usize,
    /// Connections whose queue was full or already closed.
    pub failed: usize,
}

/// Best-effort, at-most-once fan-out over the [`ConnectionRegistry`].
///
/// Each dispatch offers the notification once to every connection the user
/// has at that instant. Nothing is queued for offline users and nothing is
/// retried: a connection that is closing or too far behind simply misses it.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    registry: Arc<ConnectionRegistry>,
}

impl NotificationDispatcher {
    /// Creates a dispatcher reading from `registry`.
    #[must_use]
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Delivers `payload` to every live connection of `user_id`.
    ///
    /// Transport failures are logged and counted in the result; they never
    /// surface as an error.
    pub async fn dispatch(&self, user_id: UserId, payload: serde_json::Value) -> DeliveryResult {
        let notification = Arc::new(Notification::new(user_id, payload));
        let targets = self.registry.connections_for(user_id).await;

        let mut delivered = 0usize;
        for connection in &targets {
            match offer(connection, Arc::clone(&notification)) {
                Ok(()) => delivered = delivered.saturating_add(1),
                Err(err) => {
                    tracing::warn!(%user_id, error = %err, "notification dropped");
                }
            }
        }

        let result = DeliveryResult {
            notification_id: notification.id,
            user_id,
            attempted: targets.len(),
            delivered,
            failed: targets.len().saturating_sub(delivered),
        };
        tracing::debug!(
            %user_id,
            notification_id = %result.notification_id,
            attempted = result.attempted,
            failed = result.failed,
            "notification dispatched"
        );
        result
    }

    /// Dispatches the same payload to several users, one independent
    /// notification each, in the given order.
    pub async fn dispatch_many(
        &self,
        user_ids: &[UserId],
        payload: &serde_json::Value,
    ) -> Vec<DeliveryResult> {
        let mut results = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            results.push(self.dispatch(*user_id, payload.clone()).await);
        }
        results
    }
}

fn offer(connection: &Connection, notification: Arc<Notification>) -> Result<(), GatewayError> {
    connection
        .try_send(notification)
        .map_err(|err| GatewayError::DeliveryFailed {
            connection_id: connection.id(),
            reason: match err {
                TrySendError::Full(_) => "outbound queue full".to_string(),
                TrySendError::Closed(_) => "connection closed".to_string(),
            },
        })
}
