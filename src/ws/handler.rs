//! Axum WebSocket upgrade handler.

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::http::header::AUTHORIZATION;
use axum::response::IntoResponse;
use serde::Deserialize;

use super::connection::run_connection;
use crate::app_state::AppState;
use crate::error::GatewayError;
use crate::service::Handshake;

/// Handshake query parameters.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    /// Claimed user id.
    pub user_id: i64,
    /// Access token; may instead be sent as `Authorization: Bearer`.
    #[serde(default)]
    pub token: Option<String>,
}

/// `GET /ws` — Authenticate, then upgrade HTTP connection to WebSocket.
///
/// # Errors
///
/// Returns [`GatewayError::Authentication`] (401) before any upgrade when
/// the token is missing, invalid, or issued for another user.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, GatewayError> {
    let token = params
        .token
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(&headers))
        .unwrap_or_default();
    let handshake = Handshake {
        user_id: params.user_id,
        token,
    };

    let user_id = state.handshakes.authenticate(&handshake)?;
    let handshakes = state.handshakes.clone();

    Ok(ws.on_upgrade(move |socket| async move {
        match handshakes.establish(user_id, handshake.token).await {
            Ok((connection, outbound)) => {
                run_connection(socket, connection, outbound, handshakes).await;
            }
            Err(err) => {
                tracing::error!(%user_id, error = %err, "failed to establish connection");
            }
        }
    }))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn bearer_header_is_extracted() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc.def.ghi"));
        assert_eq!(bearer_token(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn other_schemes_are_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert_eq!(bearer_token(&headers), None);
    }
}
