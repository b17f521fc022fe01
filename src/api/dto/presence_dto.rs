//! Response DTOs for presence endpoints.

use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::UserId;

/// Presence of a single user.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PresenceDto {
    /// User the answer is about.
    pub user_id: UserId,
    /// Whether the user has at least one live connection.
    pub online: bool,
    /// Number of live connections.
    pub connections: usize,
}

/// Users currently online.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct OnlineUsersResponse {
    /// Online user ids, ascending.
    pub user_ids: Vec<UserId>,
    /// Number of online users.
    pub count: usize,
}
