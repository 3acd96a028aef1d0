//! CLI-specific error types

use thiserror::Error;

/// Errors raised before a command reaches the API client.
///
/// Client and session failures keep their own types from `gym-client` and
/// `gym-auth`; these cover what the user typed.
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid JSON body: {0}")]
    InvalidBody(String),

    #[error("invalid query parameter {0:?}, expected key=value")]
    InvalidQuery(String),

    #[error("no password provided: set GYM_PASSWORD or pipe it on stdin")]
    MissingPassword,

    #[error(transparent)]
    Role(#[from] gym_auth::Error),
}

/// Result alias using the CLI Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_messages_are_descriptive() {
        assert!(
            Error::InvalidBody("expected value".into())
                .to_string()
                .contains("expected value")
        );
        assert!(Error::MissingPassword.to_string().contains("GYM_PASSWORD"));
        assert!(
            Error::InvalidQuery("limit".into())
                .to_string()
                .contains("key=value")
        );
    }

    #[test]
    fn role_errors_pass_through() {
        let err: Error = "janitor".parse::<gym_auth::Role>().unwrap_err().into();
        assert!(
            err.to_string().contains("janitor"),
            "role error should name the bad role, got: {err}"
        );
    }
}
