//! API request and response types.

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::{http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SessionError;
use crate::session::{ImmutableSession, SessionState};

/// Error half of every handler result.
pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Request to create a new session.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct CreateSessionRequest {
    /// Requested identifier. Generated when absent.
    #[serde(default)]
    pub id: Option<String>,
    /// Inactive interval overriding the deployment default.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Attributes to set on the new session.
    #[serde(default)]
    pub attributes: HashMap<String, Value>,
}

impl CreateSessionRequest {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

/// A session as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub state: SessionState,
    pub created_at_ms: u64,
    pub last_accessed_at_ms: u64,
    pub timeout_secs: u64,
    pub attributes: HashMap<String, Value>,
}

impl SessionResponse {
    pub fn new(snapshot: ImmutableSession, state: SessionState) -> Self {
        Self {
            id: snapshot.id.to_string(),
            state,
            created_at_ms: epoch_ms(snapshot.metadata.created_at),
            last_accessed_at_ms: epoch_ms(snapshot.metadata.last_accessed_at),
            timeout_secs: snapshot.metadata.timeout.as_secs(),
            attributes: snapshot.attributes,
        }
    }
}

/// Result of writing or removing one attribute.
#[derive(Debug, Clone, Serialize)]
pub struct AttributeResponse {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous: Option<Value>,
}

/// Request to change the default session timeout.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DefaultTimeoutRequest {
    pub timeout_secs: u64,
}

/// Generic API error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error code (e.g., "SESSION_NOT_FOUND").
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn session_not_found(id: &str) -> Self {
        Self::new("SESSION_NOT_FOUND", format!("Session '{}' not found", id))
    }

    pub fn attribute_not_found(name: &str) -> Self {
        Self::new("ATTRIBUTE_NOT_FOUND", format!("Attribute '{}' not set", name))
    }

    pub fn statistics_disabled() -> Self {
        Self::new(
            "STATISTICS_DISABLED",
            "Statistics are not collected for this deployment",
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    /// Map a manager error to its HTTP status and body.
    pub fn from_session_error(error: &SessionError) -> ApiError {
        let (status, code) = match error {
            SessionError::IdentifierConflict(_) => (StatusCode::CONFLICT, "SESSION_ID_CONFLICT"),
            SessionError::MaxSessionsExceeded { .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, "MAX_SESSIONS_EXCEEDED")
            }
            SessionError::InvalidSessionId(_) => (StatusCode::BAD_REQUEST, "INVALID_SESSION_ID"),
            SessionError::SessionRemoved(_) => (StatusCode::NOT_FOUND, "SESSION_NOT_FOUND"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        (status, Json(Self::new(code, error.to_string())))
    }
}

fn epoch_ms(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
