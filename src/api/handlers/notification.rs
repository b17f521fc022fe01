//! Notification dispatch handlers.
//!
//! These are the synchronous trigger points for collaborators (chat,
//! profile updates). A dispatch always succeeds from the caller's point of
//! view; per-connection failures are reported in the counts only.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};

use crate::api::dto::{NotifyManyRequest, NotifyUserRequest};
use crate::app_state::AppState;
use crate::domain::UserId;
use crate::error::{ErrorResponse, GatewayError};
use crate::service::DeliveryResult;

/// Upper bound on recipients of a single multi-user dispatch.
pub const MAX_RECIPIENTS: usize = 1_000;

/// `POST /users/{id}/notifications` — Notify one user.
#[utoipa::path(
    post,
    path = "/api/v1/users/{id}/notifications",
    tag = "Notifications",
    summary = "Notify a user",
    description = "Delivers the payload once to every live connection of the user. Offline users receive nothing; no queueing or retry.",
    params(
        ("id" = i64, Path, description = "User id"),
    ),
    request_body = NotifyUserRequest,
    responses(
        (status = 200, description = "Delivery counts", body = DeliveryResult),
    )
)]
pub async fn notify_user(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<NotifyUserRequest>,
) -> Json<DeliveryResult> {
    Json(state.dispatcher.dispatch(UserId::new(id), req.payload).await)
}

/// `POST /notifications` — Notify several users.
///
/// # Errors
///
/// Returns [`GatewayError::InvalidRequest`] when the recipient list is empty
/// or longer than [`MAX_RECIPIENTS`].
#[utoipa::path(
    post,
    path = "/api/v1/notifications",
    tag = "Notifications",
    summary = "Notify several users",
    description = "Dispatches one independent notification per recipient, in request order.",
    request_body = NotifyManyRequest,
    responses(
        (status = 200, description = "Delivery counts per recipient", body = Vec<DeliveryResult>),
        (status = 400, description = "Empty or oversized recipient list", body = ErrorResponse),
    )
)]
pub async fn notify_many(
    State(state): State<AppState>,
    Json(req): Json<NotifyManyRequest>,
) -> Result<Json<Vec<DeliveryResult>>, GatewayError> {
    if req.user_ids.is_empty() {
        return Err(GatewayError::InvalidRequest(
            "user_ids must not be empty".to_string(),
        ));
    }
    if req.user_ids.len() > MAX_RECIPIENTS {
        return Err(GatewayError::InvalidRequest(format!(
            "at most {MAX_RECIPIENTS} recipients per request"
        )));
    }

    let results = state
        .dispatcher
        .dispatch_many(&req.user_ids, &req.payload)
        .await;
    Ok(Json(results))
}

/// Notification routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/{id}/notifications", post(notify_user))
        .route("/notifications", post(notify_many))
}
