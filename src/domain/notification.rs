//! Notification payloads addressed to a single user.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::UserId;

/// A message addressed to one user.
///
/// The payload belongs to whichever collaborator emitted it (chat service,
/// profile updates, ...) and is forwarded untouched. Notifications are
/// ephemeral: once dispatched they are not retained anywhere in the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Notification {
    /// Server-generated id, unique per dispatch call.
    pub id: uuid::Uuid,
    /// Target user.
    pub user_id: UserId,
    /// Opaque collaborator-defined payload.
    pub payload: serde_json::Value,
    /// Emission timestamp.
    pub emitted_at: DateTime<Utc>,
}

impl Notification {
    /// Creates a notification for `user_id` stamped with the current time.
    #[must_use]
    pub fn new(user_id: UserId, payload: serde_json::Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            user_id,
            payload,
            emitted_at: Utc::now(),
        }
    }
}
