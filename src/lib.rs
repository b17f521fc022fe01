//! # notify-gateway
//!
//! Real-time notification gateway for the community platform.
//!
//! Clients open authenticated WebSocket connections; server-side
//! collaborators (chat, profile updates) dispatch notifications addressed to
//! a user id, and the gateway fans each one out to every live connection of
//! that user. Presence is derived from the same registry.
//!
//! ## Architecture
//!
//! ```text
//! Clients (WebSocket)          Collaborators (HTTP)
//!     │                               │
//!     ├── WS Handler (ws/)            ├── REST Handlers (api/)
//!     │                               │
//!     ├── ReconnectionHandler ──┐     ├── NotificationDispatcher (service/)
//!     │   └── TokenValidator    │     │
//!     │       (auth)            ▼     ▼
//!     └──────────────── PresenceTracker / ConnectionRegistry (domain/)
//! ```
//!
//! Delivery is best-effort and at-most-once per connection. Nothing is
//! persisted and nothing is replayed after a reconnect. The registry is
//! process-local; running several instances requires an external shared
//! registry or pub/sub layer.

pub mod api;
pub mod app_state;
pub mod auth;
#[cfg(feature = "client")]
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod server;
pub mod service;
pub mod ws;
