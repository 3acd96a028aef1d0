//! Backend auth endpoints and client-side routes
//!
//! Paths are relative to the configured API base URL. The trailing slashes
//! are part of the backend's routing and must be kept.

/// Login endpoint: exchanges email + password for an access/refresh pair
pub const LOGIN_PATH: &str = "/auth/token/";

/// Refresh endpoint: exchanges a refresh token for a new access token
pub const REFRESH_PATH: &str = "/auth/token/refresh/";

/// Sign-in entry route the client is sent to when the session is lost
pub const DEFAULT_SIGN_IN_ROUTE: &str = "/sign-in";

/// Bearer scheme prefix for the Authorization header
pub const BEARER_PREFIX: &str = "Bearer ";

/// Join an API base URL and an endpoint path with exactly one slash between.
pub fn endpoint_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
