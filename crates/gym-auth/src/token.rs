//! Token endpoint calls: login and access-token refresh
//!
//! Both POST JSON to the backend's auth routes under the API base URL:
//! 1. Login (`LOGIN_PATH`) exchanges email + password for an access/refresh pair
//! 2. Refresh (`REFRESH_PATH`) exchanges the refresh token for a new access token
//!
//! The refresh token is not rotated: the refresh response carries only
//! `access`, and the stored refresh token stays as it was.

use std::time::Duration;

use common::Secret;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::constants::{LOGIN_PATH, REFRESH_PATH, endpoint_url};
use crate::error::{Error, Result};

/// Response from the login endpoint.
///
/// `user` is kept as raw JSON so it can be stored verbatim in the session.
#[derive(Debug, Deserialize)]
pub struct TokenPair {
    pub access: Secret<String>,
    pub refresh: Secret<String>,
    #[serde(default)]
    pub user: Option<serde_json::Value>,
}

/// Response from the refresh endpoint.
#[derive(Debug, Deserialize)]
pub struct RefreshedAccess {
    pub access: Secret<String>,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct RefreshBody<'a> {
    refresh: &'a str,
}

/// Exchange email + password for a token pair.
pub async fn login(
    client: &reqwest::Client,
    base_url: &str,
    email: &str,
    password: &Secret<String>,
    timeout: Duration,
) -> Result<TokenPair> {
    let url = endpoint_url(base_url, LOGIN_PATH);
    debug!(%url, "requesting token pair");

    let response = client
        .post(&url)
        .timeout(timeout)
        .json(&LoginBody {
            email,
            password: password.expose(),
        })
        .send()
        .await
        .map_err(|e| Error::from_transport("login request failed", e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "login rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "login endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenPair>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid login response: {e}")))
}

/// Exchange a refresh token for a new access token.
///
/// Any non-2xx is a refresh failure. 401/403 means the refresh token itself is
/// expired or revoked and surfaces as `RefreshRejected`.
pub async fn refresh_access(
    client: &reqwest::Client,
    base_url: &str,
    refresh: &Secret<String>,
    timeout: Duration,
) -> Result<RefreshedAccess> {
    let url = endpoint_url(base_url, REFRESH_PATH);
    debug!(%url, "refreshing access token");

    let response = client
        .post(&url)
        .timeout(timeout)
        .json(&RefreshBody {
            refresh: refresh.expose(),
        })
        .send()
        .await
        .map_err(|e| Error::from_transport("token refresh request failed", e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::RefreshRejected(format!(
                "refresh endpoint returned {status}: {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    response
        .json::<RefreshedAccess>()
        .await
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))
}
