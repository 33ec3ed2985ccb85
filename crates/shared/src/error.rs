//! Shared error types for the gateway protocol and the REST API.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// JSON error body returned by the REST API on failed requests.
///
/// The API answers most 4xx responses with `{"code": 50035, "message": "..."}`
/// so callers can surface a meaningful reason instead of a bare status code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    /// API-specific error code (not the HTTP status).
    #[serde(default)]
    pub code: u64,
    /// Human-readable explanation.
    pub message: String,
}

/// Attempt to parse an API error body into a user-facing message.
/// Prefers `message`, falls back to the numeric code.
pub fn try_error_message(body: &str) -> Option<String> {
    let parsed = serde_json::from_str::<ErrorBody>(body).ok()?;
    if !parsed.message.trim().is_empty() {
        return Some(parsed.message);
    }
    if parsed.code != 0 {
        return Some(format!("API error code {}", parsed.code));
    }
    None
}

/// REST API error type for client-side use
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("Rate limited, retry after {retry_after}s")]
    RateLimited { retry_after: f64 },
    #[error("Deserialization error: {0}")]
    Deserialize(String),
}

/// Failure to turn a text frame into a gateway event.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("dispatch frame without event name")]
    MissingEventName,
    #[error("heartbeat interval must be positive")]
    InvalidHeartbeatInterval,
    #[error("malformed {event} payload: {source}")]
    Payload {
        event: String,
        #[source]
        source: serde_json::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_message_field() {
        let body = r#"{"code": 10008, "message": "Unknown Message"}"#;
        assert_eq!(try_error_message(body).as_deref(), Some("Unknown Message"));
    }

    #[test]
    fn error_message_falls_back_to_code() {
        let body = r#"{"code": 50013, "message": "  "}"#;
        assert_eq!(
            try_error_message(body).as_deref(),
            Some("API error code 50013")
        );
    }

    #[test]
    fn error_message_ignores_non_json() {
        assert_eq!(try_error_message("<html>bad gateway</html>"), None);
    }
}
