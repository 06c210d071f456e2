//! Errors surfaced to callers of the client.

use serde_json::Value;
use std::fmt;

/// The refresh call itself failed. Every request waiting on that refresh
/// receives a copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshError {
    /// HTTP status of the refresh response, `None` when no response arrived
    pub status: Option<u16>,
    pub message: String,
}

impl fmt::Display for RefreshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "refresh failed ({}): {}", status, self.message),
            None => write!(f, "refresh failed: {}", self.message),
        }
    }
}

impl std::error::Error for RefreshError {}

/// No response was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub String);

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "transport error: {}", self.0)
    }
}

impl std::error::Error for TransportError {}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        Self(e.to_string())
    }
}

#[derive(Debug, Clone)]
pub enum ClientError {
    Transport(String),
    /// Non-2xx response other than an expired access token, body unchanged.
    Status { status: u16, body: Value },
    RefreshFailed(RefreshError),
    /// The refresh task went away without answering.
    Aborted,
    Decode(String),
}

impl ClientError {
    /// Machine-readable `code` from an error body, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            ClientError::Status { body, .. } => body.get("code").and_then(Value::as_str),
            _ => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::RefreshFailed(e) => e.status,
            _ => None,
        }
    }

    /// Message suitable for showing to the user.
    pub fn message(&self) -> String {
        match self {
            ClientError::Status { status, body } => body
                .get("message")
                .and_then(Value::as_str)
                .or_else(|| body.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("Request failed with status {}", status)),
            ClientError::RefreshFailed(e) => e.message.clone(),
            ClientError::Transport(msg) | ClientError::Decode(msg) => msg.clone(),
            ClientError::Aborted => "Request aborted".to_string(),
        }
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientError::Transport(msg) => write!(f, "transport error: {}", msg),
            ClientError::Status { status, .. } => {
                write!(f, "request failed ({}): {}", status, self.message())
            }
            ClientError::RefreshFailed(e) => write!(f, "{}", e),
            ClientError::Aborted => write!(f, "request aborted"),
            ClientError::Decode(msg) => write!(f, "invalid response body: {}", msg),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<TransportError> for ClientError {
    fn from(e: TransportError) -> Self {
        ClientError::Transport(e.0)
    }
}
