//! Request DTOs for notification dispatch endpoints.

use serde::Deserialize;
use utoipa::ToSchema;

use crate::domain::UserId;

/// Body of `POST /api/v1/users/{id}/notifications`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NotifyUserRequest {
    /// Opaque payload forwarded to every live connection of the user.
    pub payload: serde_json::Value,
}

/// Body of `POST /api/v1/notifications`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct NotifyManyRequest {
    /// Recipients, dispatched in this order.
    pub user_ids: Vec<UserId>,
    /// Opaque payload sent to each recipient.
    pub payload: serde_json::Value,
}
