//! Authentication error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authentication error type.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Login rejected by the server
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// No refresh token to renew the session with
    #[error("No credentials available")]
    NoCredentials,

    /// Login succeeded but the grant cannot be stored
    #[error("Invalid token grant: {0}")]
    InvalidGrant(String),

    /// Refresh endpoint answered with a non-success status
    #[error("Token refresh rejected: HTTP {status}")]
    RefreshRejected { status: u16 },

    /// Refresh request never produced a response
    #[error("Token refresh failed: {0}")]
    RefreshNetworkFailure(String),

    /// The session is gone. Every terminal auth failure surfaces as this.
    #[error("Session expired")]
    SessionExpired,

    /// Non-success response from an API call that did not end the session
    #[error("HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// Request failed without ending the session
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid state transition in the session FSM
    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] token_storage::StorageError),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parse error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] client_config_and_utils::CoreError),
}

impl AuthError {
    /// Returns true if the session no longer exists after this error.
    pub fn is_session_ended(&self) -> bool {
        matches!(
            self,
            AuthError::NoCredentials
                | AuthError::RefreshRejected { .. }
                | AuthError::RefreshNetworkFailure(_)
                | AuthError::SessionExpired
        )
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            AuthError::RefreshRejected { status } | AuthError::Api { status, .. } => Some(*status),
            AuthError::Http(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

/// Result type alias using AuthError.
pub type AuthResult<T> = Result<T, AuthError>;

/// Outcome of a failed refresh. Clonable so every caller waiting on the same
/// in-flight refresh receives it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("No refresh token available")]
    NoCredentials,

    #[error("Refresh rejected: HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Refresh request failed: {0}")]
    Network(String),

    /// The session FSM refused to start a refresh.
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    /// The session was cleared or replaced while the refresh was in flight.
    #[error("Session changed while refresh was in flight")]
    Superseded,
}

impl From<RefreshError> for AuthError {
    fn from(error: RefreshError) -> Self {
        match error {
            RefreshError::NoCredentials => AuthError::NoCredentials,
            RefreshError::Rejected { status, .. } => AuthError::RefreshRejected { status },
            RefreshError::Network(detail) => AuthError::RefreshNetworkFailure(detail),
            RefreshError::InvalidState(detail) => AuthError::InvalidStateTransition(detail),
            RefreshError::Superseded => AuthError::SessionExpired,
        }
    }
}

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEndReason {
    /// Explicit logout.
    Logout,
    /// A refresh was needed but no refresh token was stored.
    NoCredentials,
    /// The refresh endpoint rejected the refresh token.
    RefreshRejected,
    /// The refresh request produced no response.
    RefreshNetworkFailure,
    /// A request still failed authentication after a successful refresh.
    RequestAuthRejected,
    /// A request failed without a response and the refresh-retry did not help.
    AmbiguousNetworkFailure,
}

impl SessionEndReason {
    pub fn is_logout(&self) -> bool {
        matches!(self, SessionEndReason::Logout)
    }
}

impl From<&RefreshError> for SessionEndReason {
    fn from(error: &RefreshError) -> Self {
        match error {
            RefreshError::NoCredentials => SessionEndReason::NoCredentials,
            RefreshError::Network(_) | RefreshError::InvalidState(_) => {
                SessionEndReason::RefreshNetworkFailure
            }
            RefreshError::Rejected { .. } | RefreshError::Superseded => {
                SessionEndReason::RefreshRejected
            }
        }
    }
}
