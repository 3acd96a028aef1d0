//! Request authentication from the session store
//!
//! Reads the access token from the store at call time and injects it as a
//! bearer credential. No token means the request goes out unauthenticated;
//! that is valid input, not an error.

use std::sync::Arc;

use common::Secret;
use gym_auth::{BEARER_PREFIX, SessionStore, session};
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// Injects `Authorization: Bearer <token>` from the shared session store.
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn SessionStore>,
}

impl Authenticator {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store }
    }

    /// Authorize outgoing headers with the current access token.
    ///
    /// Returns the token that was attached so a later 401 can tell whether
    /// the store has moved on since. A store read failure is logged and the
    /// request is forwarded as-is. A token that cannot be carried in a header
    /// is treated the same way.
    pub async fn authorize(&self, headers: &mut HeaderMap) -> Option<Secret<String>> {
        let token = match session::access_token(self.store.as_ref()).await {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "session read failed, sending request unauthenticated");
                None
            }
        };

        let token = token?;
        match set_bearer(headers, &token) {
            Ok(()) => Some(token),
            Err(e) => {
                warn!(error = %e, "stored access token unusable, sending request unauthenticated");
                None
            }
        }
    }
}

/// Build the sensitive `Bearer <token>` header value.
pub fn bearer_value(token: &Secret<String>) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("{BEARER_PREFIX}{}", token.expose()))
        .map_err(|e| Error::InvalidRequest(format!("invalid token value: {e}")))?;
    value.set_sensitive(true);
    Ok(value)
}

/// Overwrite the Authorization header with a bearer token.
pub fn set_bearer(headers: &mut HeaderMap, token: &Secret<String>) -> Result<()> {
    headers.insert(AUTHORIZATION, bearer_value(token)?);
    debug!("attached bearer token");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use gym_auth::{MemorySessionStore, SessionKey, StoreFuture};

    async fn store_with(token: Option<&str>) -> Arc<MemorySessionStore> {
        let store = Arc::new(MemorySessionStore::new());
        if let Some(token) = token {
            store
                .set(SessionKey::AccessToken, token.into())
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn attaches_bearer_when_token_present() {
        let auth = Authenticator::new(store_with(Some("at_1")).await);
        let mut headers = HeaderMap::new();

        let used = auth.authorize(&mut headers).await;

        assert_eq!(headers[AUTHORIZATION], "Bearer at_1");
        assert!(headers[AUTHORIZATION].is_sensitive());
        assert_eq!(used.unwrap().expose(), "at_1");
    }

    #[tokio::test]
    async fn forwards_unmodified_without_token() {
        let auth = Authenticator::new(store_with(None).await);
        let mut headers = HeaderMap::new();
        headers.insert("x-gym-tenant", HeaderValue::from_static("3"));

        let used = auth.authorize(&mut headers).await;

        assert!(used.is_none());
        assert!(headers.get(AUTHORIZATION).is_none());
        assert_eq!(headers.len(), 1);
    }

    #[tokio::test]
    async fn replaces_caller_authorization() {
        let auth = Authenticator::new(store_with(Some("at_store")).await);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer stale"));

        auth.authorize(&mut headers).await;

        assert_eq!(headers.get_all(AUTHORIZATION).iter().count(), 1);
        assert_eq!(headers[AUTHORIZATION], "Bearer at_store");
    }

    #[tokio::test]
    async fn unusable_token_is_skipped() {
        let auth = Authenticator::new(store_with(Some("bad\ntoken")).await);
        let mut headers = HeaderMap::new();

        assert!(auth.authorize(&mut headers).await.is_none());
        assert!(headers.get(AUTHORIZATION).is_none());
    }

    #[tokio::test]
    async fn store_failure_is_not_an_error() {
        struct Broken;
        impl SessionStore for Broken {
            fn get(&self, _key: SessionKey) -> StoreFuture<'_, Option<String>> {
                Box::pin(async { Err(gym_auth::Error::Store("disk gone".into())) })
            }
            fn set(&self, _key: SessionKey, _value: String) -> StoreFuture<'_, ()> {
                Box::pin(async { Err(gym_auth::Error::Store("disk gone".into())) })
            }
            fn remove(&self, _key: SessionKey) -> StoreFuture<'_, ()> {
                Box::pin(async { Err(gym_auth::Error::Store("disk gone".into())) })
            }
        }

        let auth = Authenticator::new(Arc::new(Broken));
        let mut headers = HeaderMap::new();
        assert!(auth.authorize(&mut headers).await.is_none());
        assert!(headers.is_empty());
    }

    #[test]
    fn set_bearer_overwrites() {
        let mut headers = HeaderMap::new();
        set_bearer(&mut headers, &Secret::from("t1")).unwrap();
        set_bearer(&mut headers, &Secret::from("t2")).unwrap();
        assert_eq!(headers[AUTHORIZATION], "Bearer t2");
    }
}
