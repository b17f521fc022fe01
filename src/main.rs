//! notify-gateway server entry point.
//!
//! Starts the Axum HTTP server with REST and WebSocket endpoints.

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use notify_gateway::app_state::AppState;
use notify_gateway::auth::{JwtValidator, TokenValidator};
use notify_gateway::config::{GatewayConfig, LogFormat};
use notify_gateway::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = GatewayConfig::from_env()?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match config.log_format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    tracing::info!(addr = %config.listen_addr, "starting notify-gateway");

    // Authentication collaborator
    let validator: Arc<dyn TokenValidator> = Arc::new(JwtValidator::new(
        config.jwt_secret.as_bytes(),
        config.jwt_issuer.clone(),
    ));

    // Build application state
    let state = AppState::new(
        validator,
        config.outbound_queue_capacity,
        config.presence_bus_capacity,
    );

    // Start server
    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    server::serve(listener, state).await?;

    Ok(())
}
