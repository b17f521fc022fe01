//! Presence query handlers.

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use crate::api::dto::{OnlineUsersResponse, PresenceDto};
use crate::app_state::AppState;
use crate::domain::UserId;

/// `GET /users/{id}/presence` — Online status of one user.
#[utoipa::path(
    get,
    path = "/api/v1/users/{id}/presence",
    tag = "Presence",
    summary = "Get user presence",
    description = "A user is online exactly when they hold at least one live connection.",
    params(
        ("id" = i64, Path, description = "User id"),
    ),
    responses(
        (status = 200, description = "Presence of the user", body = PresenceDto),
    )
)]
pub async fn get_presence(State(state): State<AppState>, Path(id): Path<i64>) -> Json<PresenceDto> {
    let user_id = UserId::new(id);
    let connections = state.registry.connection_count(user_id).await;
    Json(PresenceDto {
        user_id,
        online: connections > 0,
        connections,
    })
}

/// `GET /presence` — All online users.
#[utoipa::path(
    get,
    path = "/api/v1/presence",
    tag = "Presence",
    summary = "List online users",
    responses(
        (status = 200, description = "Online user ids", body = OnlineUsersResponse),
    )
)]
pub async fn list_online(State(state): State<AppState>) -> Json<OnlineUsersResponse> {
    let user_ids = state.presence.online_users().await;
    Json(OnlineUsersResponse {
        count: user_ids.len(),
        user_ids,
    })
}

/// Presence routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/{id}/presence", get(get_presence))
        .route("/presence", get(list_online))
}
