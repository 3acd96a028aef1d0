//! Error types for session and token operations

/// Errors from session storage and token endpoint operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token endpoint timed out: {0}")]
    Timeout(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("refresh token rejected: {0}")]
    RefreshRejected(String),

    #[error("session store error: {0}")]
    Store(String),

    #[error("user profile parse error: {0}")]
    ProfileParse(String),

    #[error("token claims error: {0}")]
    Claims(String),
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Map a reqwest transport error, keeping timeouts distinguishable.
    pub(crate) fn from_transport(context: &str, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout(format!("{context}: {err}"))
        } else {
            Error::Http(format!("{context}: {err}"))
        }
    }
}
