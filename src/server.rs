//! HTTP application assembly and server lifecycle.

use std::net::SocketAddr;

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::api;
use crate::app_state::AppState;
use crate::domain::PresenceEvent;
use crate::ws::handler::ws_handler;

/// Builds the full router: REST API, `/ws` and middleware.
pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(api::build_router())
        .route("/ws", get(ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Serves `state` on an already bound listener until the server stops.
///
/// Spawns the presence audit task alongside the HTTP server.
///
/// # Errors
///
/// Returns the I/O error that stopped the server.
pub async fn serve(listener: TcpListener, state: AppState) -> std::io::Result<()> {
    let local: Option<SocketAddr> = listener.local_addr().ok();
    tokio::spawn(log_presence(state.presence.subscribe()));
    if let Some(addr) = local {
        tracing::info!(%addr, "server listening");
    }
    axum::serve(listener, app(state)).await
}

/// Logs every presence transition until the bus closes.
async fn log_presence(mut events: broadcast::Receiver<PresenceEvent>) {
    loop {
        match events.recv().await {
            Ok(event) => {
                tracing::info!(
                    user_id = %event.user_id(),
                    online = event.is_online(),
                    "presence changed"
                );
            }
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(lagged = n, "presence log lagged behind bus");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
