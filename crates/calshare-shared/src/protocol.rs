//! JSON message envelope and wire protocol constants.
//!
//! Every message in either direction is a single text frame containing
//! `{"type": <string>, "data": <object>, "timestamp": <epoch-ms>}`.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Event message types.
pub const EVENT_CREATE: &str = "event_create";
pub const EVENT_UPDATE: &str = "event_update";
pub const EVENT_DELETE: &str = "event_delete";
pub const EVENT_LIST: &str = "event_list";
pub const REMINDER: &str = "reminder";

/// Authentication message types.
pub const AUTH_LOGIN: &str = "auth_login";
pub const AUTH_REGISTER: &str = "auth_register";
pub const AUTH_LOGOUT: &str = "auth_logout";
pub const AUTH_SUCCESS: &str = "auth_success";
pub const AUTH_ERROR: &str = "auth_error";

/// Connection message types.
pub const CLIENT_CONNECT: &str = "client_connect";
pub const CLIENT_DISCONNECT: &str = "client_disconnect";
pub const HEARTBEAT: &str = "heartbeat";

/// Machine-readable error codes carried in `auth_error` payloads.
pub mod error_code {
    pub const AUTH_REQUIRED: &str = "AUTH_REQUIRED";
    pub const INVALID_TOKEN: &str = "INVALID_TOKEN";
    pub const INVALID_CREDENTIALS: &str = "INVALID_CREDENTIALS";
    pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
    pub const REGISTRATION_FAILED: &str = "REGISTRATION_FAILED";
}

/// The message envelope wrapping every payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: Value,
    /// Epoch milliseconds at send time.
    pub timestamp: i64,
}

impl Envelope {
    /// Wrap `data` in an envelope stamped with the current time.
    pub fn new(kind: &str, data: Value) -> Self {
        Self {
            kind: kind.to_string(),
            data,
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// An `auth_error` envelope with a human-readable message and a
    /// machine-readable code.
    pub fn auth_error(error: &str, code: &str) -> Self {
        Self::new(
            AUTH_ERROR,
            serde_json::json!({ "error": error, "code": code }),
        )
    }

    /// Serialize to the wire text form.
    pub fn encode(&self) -> String {
        // Envelope contains only JSON-safe types, so this cannot fail.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Parse an inbound text frame into an envelope.
pub fn parse_message(text: &str) -> Result<Envelope, ProtocolError> {
    Ok(serde_json::from_str(text)?)
}
