//! REST API layer: route handlers, DTOs, OpenAPI document and router
//! composition.
//!
//! Resource endpoints are mounted under `/api/v1`; `/health` sits at the
//! root.

pub mod dto;
pub mod handlers;

use axum::Router;
use utoipa::OpenApi;

use crate::app_state::AppState;

/// OpenAPI document for the REST surface.
#[derive(Debug, OpenApi)]
#[openapi(
    info(
        title = "notify-gateway",
        description = "Per-user real-time notification fan-out with derived presence."
    ),
    paths(
        handlers::notification::notify_user,
        handlers::notification::notify_many,
        handlers::presence::get_presence,
        handlers::presence::list_online,
        handlers::system::health_handler,
    ),
    components(schemas(
        dto::NotifyUserRequest,
        dto::NotifyManyRequest,
        dto::PresenceDto,
        dto::OnlineUsersResponse,
        crate::service::DeliveryResult,
        crate::error::ErrorResponse,
        crate::error::ErrorBody,
    )),
    tags(
        (name = "Notifications", description = "Dispatch notifications to users"),
        (name = "Presence", description = "Online status derived from live connections"),
        (name = "System", description = "Service health"),
    )
)]
pub struct ApiDoc;

/// Builds the complete API router with all REST endpoints.
pub fn build_router() -> Router<AppState> {
    let router = Router::new()
        .nest("/api/v1", handlers::routes())
        .merge(handlers::system::routes());

    #[cfg(feature = "swagger-ui")]
    let router = router.merge(
        utoipa_swagger_ui::SwaggerUi::new("/swagger-ui")
            .url("/api-docs/openapi.json", ApiDoc::openapi()),
    );

    router
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_lists_every_route() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/v1/users/{id}/notifications",
            "/api/v1/notifications",
            "/api/v1/users/{id}/presence",
            "/api/v1/presence",
            "/health",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
