//! Error types for API client calls

use std::time::Duration;

/// Errors surfaced to API call sites.
///
/// Non-2xx responses from the backend arrive as `Status` with the body
/// verbatim; the client does not interpret them beyond the single 401
/// refresh-and-retry.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("request failed: {0}")]
    Transport(String),

    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    #[error("request cancelled")]
    Cancelled,

    #[error("backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("session refresh failed: {0}")]
    RefreshFailed(#[source] gym_auth::Error),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("response decode failed: {0}")]
    Decode(String),

    #[error(transparent)]
    Auth(#[from] gym_auth::Error),
}

impl Error {
    /// HTTP status of a backend error response, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    /// Whether the session was ended while producing this error.
    pub fn is_session_loss(&self) -> bool {
        matches!(self, Error::RefreshFailed(_))
    }
}

/// Result alias for client operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_exposes_code() {
        let err = Error::Status {
            status: 401,
            body: r#"{"detail":"Given token not valid for any token type"}"#.into(),
        };
        assert_eq!(err.status(), Some(401));
        assert!(err.is_unauthorized());
        assert!(err.to_string().contains("401"));
    }

    #[test]
    fn timeout_display_uses_millis() {
        assert_eq!(
            Error::Timeout(Duration::from_millis(1500)).to_string(),
            "request timed out after 1500ms"
        );
    }

    #[test]
    fn refresh_failure_keeps_source() {
        use std::error::Error as _;
        let err = Error::RefreshFailed(gym_auth::Error::RefreshRejected("expired".into()));
        assert!(err.is_session_loss());
        assert!(err.source().unwrap().to_string().contains("expired"));
    }
}
