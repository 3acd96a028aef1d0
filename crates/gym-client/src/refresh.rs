//! Access-token recovery after a 401
//!
//! One recovery per 401'd request: read the refresh token, call the refresh
//! endpoint, store the new access token. On failure the session is cleared
//! before the gate is released, so requests queued behind it find an empty
//! store instead of replaying a dead refresh token.
//!
//! Concurrent 401s either each refresh on their own (`PerRequest`) or queue
//! on one gate (`Coalesced`); a queued request that finds the store already
//! holds a different access token than the one it was sent with reuses it.

use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use gym_auth::{SessionKey, SessionStore, session, token};
use serde::Deserialize;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::authenticator::bearer_value;
use crate::metrics;

/// How concurrent refreshes are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshPolicy {
    /// Every 401'd request refreshes independently
    PerRequest,
    /// Refreshes are serialized and a fresh token is shared
    #[default]
    Coalesced,
}

/// Result of trying to recover a usable access token.
#[derive(Debug)]
pub enum Recovery {
    Token(Secret<String>),
    /// No refresh token stored; session has been cleared
    NoRefreshToken,
    /// Refresh call failed; session has been cleared
    Failed(gym_auth::Error),
}

pub struct RefreshGate {
    policy: RefreshPolicy,
    lock: Mutex<()>,
    store: Arc<dyn SessionStore>,
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl RefreshGate {
    pub fn new(
        policy: RefreshPolicy,
        store: Arc<dyn SessionStore>,
        http: reqwest::Client,
        base_url: String,
        timeout: Duration,
    ) -> Self {
        Self {
            policy,
            lock: Mutex::new(()),
            store,
            http,
            base_url,
            timeout,
        }
    }

    async fn enter(&self) -> Option<MutexGuard<'_, ()>> {
        match self.policy {
            RefreshPolicy::Coalesced => Some(self.lock.lock().await),
            RefreshPolicy::PerRequest => None,
        }
    }

    /// Recover an access token for a request that was sent with `stale`.
    pub async fn recover(&self, stale: Option<&Secret<String>>) -> Recovery {
        let serialized = self.enter().await;

        if serialized.is_some()
            && let Some(current) = self.current_access().await
            && Some(&current) != stale
        {
            debug!("access token already refreshed by a concurrent request");
            metrics::record_refresh("reused");
            return Recovery::Token(current);
        }

        let refresh = match session::refresh_token(self.store.as_ref()).await {
            Ok(Some(refresh)) => refresh,
            Ok(None) => {
                info!("401 with no refresh token, ending session");
                metrics::record_refresh("missing");
                self.clear_session().await;
                return Recovery::NoRefreshToken;
            }
            Err(e) => {
                warn!(error = %e, "refresh token unreadable, ending session");
                metrics::record_refresh("missing");
                self.clear_session().await;
                return Recovery::NoRefreshToken;
            }
        };

        match token::refresh_access(&self.http, &self.base_url, &refresh, self.timeout).await {
            Ok(refreshed) if bearer_value(&refreshed.access).is_err() => {
                warn!("refresh returned an access token that cannot be sent, ending session");
                metrics::record_refresh("failed");
                self.clear_session().await;
                Recovery::Failed(gym_auth::Error::TokenExchange(
                    "refreshed access token is not a valid header value".into(),
                ))
            }
            Ok(refreshed) => {
                if let Err(e) = self
                    .store
                    .set(SessionKey::AccessToken, refreshed.access.expose().clone())
                    .await
                {
                    warn!(error = %e, "failed to persist refreshed access token");
                }
                info!("access token refreshed");
                metrics::record_refresh("success");
                Recovery::Token(refreshed.access)
            }
            Err(e) => {
                let outcome = match &e {
                    gym_auth::Error::RefreshRejected(_) => "rejected",
                    _ => "failed",
                };
                warn!(error = %e, "token refresh failed, ending session");
                metrics::record_refresh(outcome);
                self.clear_session().await;
                Recovery::Failed(e)
            }
        }
    }

    async fn current_access(&self) -> Option<Secret<String>> {
        session::access_token(self.store.as_ref())
            .await
            .ok()
            .flatten()
    }

    /// End the session after a recovered token turned out unusable.
    pub async fn abandon(&self) {
        let _serialized = self.enter().await;
        self.clear_session().await;
    }

    async fn clear_session(&self) {
        if let Err(e) = self.store.clear().await {
            warn!(error = %e, "failed to clear session store");
        }
    }
}
