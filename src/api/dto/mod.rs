//! Data Transfer Objects for REST request/response serialization.
//!
//! Notification payloads are passed through as raw JSON; the gateway never
//! imposes a schema on them.

pub mod notification_dto;
pub mod presence_dto;

pub use notification_dto::*;
pub use presence_dto::*;
