//! Gateway configuration loaded from environment variables.
//!
//! Follows 12-factor style: all settings come from environment variables
//! (or a `.env` file via `dotenvy`).

use std::net::SocketAddr;

/// Log output format selected with `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Text,
    /// One JSON object per line.
    Json,
}

/// Top-level gateway configuration.
///
/// Loaded once at startup via [`GatewayConfig::from_env`].
#[derive(Clone)]
pub struct GatewayConfig {
    /// Socket address to bind the HTTP server to (e.g. `0.0.0.0:3000`).
    pub listen_addr: SocketAddr,

    /// Shared HS256 secret used to validate handshake tokens.
    pub jwt_secret: String,

    /// Expected `iss` claim; unchecked when `None`.
    pub jwt_issuer: Option<String>,

    /// Capacity of each connection's outbound notification queue.
    pub outbound_queue_capacity: usize,

    /// Capacity of the presence broadcast channel.
    pub presence_bus_capacity: usize,

    /// Log output format.
    pub log_format: LogFormat,
}

impl GatewayConfig {
    /// Loads configuration from environment variables.
    ///
    /// Falls back to sensible defaults when a variable is not set.
    /// Calls `dotenvy::dotenv().ok()` to optionally load a `.env` file.
    ///
    /// # Errors
    ///
    /// Returns an error if `LISTEN_ADDR` is set but cannot be parsed as
    /// a [`SocketAddr`], or if `AUTH_JWT_SECRET` is missing or empty.
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let listen_addr: SocketAddr = std::env::var("LISTEN_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
            .parse()?;

        let jwt_secret = std::env::var("AUTH_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() {
            anyhow::bail!("AUTH_JWT_SECRET must be set");
        }
        let jwt_issuer = std::env::var("AUTH_JWT_ISSUER")
            .ok()
            .filter(|s| !s.is_empty());

        let outbound_queue_capacity = parse_env("OUTBOUND_QUEUE_CAPACITY", 64);
        let presence_bus_capacity = parse_env("PRESENCE_BUS_CAPACITY", 1024);

        let log_format = match std::env::var("LOG_FORMAT").ok().as_deref() {
            Some("json") | Some("JSON") => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            listen_addr,
            jwt_secret,
            jwt_issuer,
            outbound_queue_capacity,
            presence_bus_capacity,
            log_format,
        })
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("listen_addr", &self.listen_addr)
            .field("jwt_secret", &"<redacted>")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("outbound_queue_capacity", &self.outbound_queue_capacity)
            .field("presence_bus_capacity", &self.presence_bus_capacity)
            .field("log_format", &self.log_format)
            .finish()
    }
}

/// Parses an environment variable as `T`, returning `default` on missing
/// or invalid values.
fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
