//! Authenticated API client
//!
//! Every call runs the same pipeline: authorize from the session store, send,
//! and on a first 401 recover a token once and resend. The per-request state
//! machine in `attempt` decides each step; this module only performs the I/O.
//!
//! Each network call (original, refresh, retry) carries the configured
//! timeout. Dropping the future returned by `send` cancels the call;
//! `send_cancellable` ties it to a `CancellationToken` instead.

use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use gym_auth::{
    DEFAULT_SIGN_IN_ROUTE, SessionStore, TokenPair, UserProfile, endpoint_url, session, token,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::attempt::{RequestAction, RequestEvent, RequestState, SessionLoss, handle_event};
use crate::authenticator::{Authenticator, set_bearer};
use crate::error::{Error, Result};
use crate::metrics;
use crate::navigator::Navigator;
use crate::refresh::{Recovery, RefreshGate, RefreshPolicy};
use crate::request::{ApiRequest, ApiResponse};

/// Default per-call timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client settings.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub refresh_policy: RefreshPolicy,
    pub sign_in_route: String,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            refresh_policy: RefreshPolicy::default(),
            sign_in_route: DEFAULT_SIGN_IN_ROUTE.to_string(),
        }
    }
}

/// REST client that keeps the session authenticated.
///
/// Cheap to clone; clones share the store, navigator and refresh gate.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: ClientConfig,
    http: reqwest::Client,
    store: Arc<dyn SessionStore>,
    navigator: Arc<dyn Navigator>,
    authenticator: Authenticator,
    refresh_gate: RefreshGate,
}

impl ApiClient {
    pub fn new(
        config: ClientConfig,
        http: reqwest::Client,
        store: Arc<dyn SessionStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let refresh_gate = RefreshGate::new(
            config.refresh_policy,
            store.clone(),
            http.clone(),
            config.base_url.clone(),
            config.timeout,
        );
        info!(
            base_url = %config.base_url,
            timeout_ms = config.timeout.as_millis() as u64,
            refresh_policy = ?config.refresh_policy,
            "api client initialized"
        );
        Self {
            inner: Arc::new(Inner {
                authenticator: Authenticator::new(store.clone()),
                config,
                http,
                store,
                navigator,
                refresh_gate,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.inner.store
    }

    /// Send a request through the authentication pipeline.
    ///
    /// Returns the 2xx response, or the failure the caller should see: the
    /// backend's error status, a transport error, or the refresh failure that
    /// ended the session.
    pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        self.run(&request, request_id).await
    }

    /// Like `send`, but aborts at the next suspension point once `cancel` fires.
    pub async fn send_cancellable(
        &self,
        request: ApiRequest,
        cancel: CancellationToken,
    ) -> Result<ApiResponse> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(path = %request.path, "request cancelled by caller");
                Err(Error::Cancelled)
            }
            result = self.send(request.clone()) => result,
        }
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send(ApiRequest::get(path)).await?.json()
    }

    pub async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.send(ApiRequest::post(path).json(body)?).await?.json()
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.send(ApiRequest::delete(path)).await.map(|_| ())
    }

    /// Sign in and start a session.
    ///
    /// Tokens are stored before the profile is interpreted; a profile the
    /// client cannot parse still leaves the user signed in.
    pub async fn login(&self, email: &str, password: &Secret<String>) -> Result<Option<UserProfile>> {
        let TokenPair {
            access,
            refresh,
            user,
        } = token::login(
            &self.inner.http,
            &self.inner.config.base_url,
            email,
            password,
            self.inner.config.timeout,
        )
        .await?;

        session::begin(self.inner.store.as_ref(), &access, &refresh, user.as_ref()).await?;
        info!(email, "signed in");

        let profile = match session::user_profile(self.inner.store.as_ref()).await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, "signed in but the returned profile is unreadable");
                None
            }
        };
        Ok(profile)
    }

    /// Sign out: clear the session and go to sign-in. Local only.
    pub async fn logout(&self) -> Result<()> {
        self.inner.store.clear().await?;
        self.end_session(SessionLoss::Logout);
        Ok(())
    }

    #[instrument(skip_all, fields(request_id = %request_id, method = %request.method, path = %request.path))]
    async fn run(&self, request: &ApiRequest, request_id: String) -> Result<ApiResponse> {
        let url = self.url_for(&request.path)?;
        let mut headers = request.headers.clone();
        let mut sent_with = self.inner.authenticator.authorize(&mut headers).await;

        let mut state = RequestState::Unsent;
        let mut event = RequestEvent::Start;
        let mut outcome: Option<Result<ApiResponse>> = None;
        let mut refresh_error: Option<gym_auth::Error> = None;

        loop {
            let (next, action) = handle_event(state, event);
            debug!(from = ?state, to = ?next, ?action, "request transition");
            state = next;

            event = match action {
                RequestAction::Send => {
                    let result = self.dispatch(request, &url, &headers).await;
                    let event = match &result {
                        Ok(response) => RequestEvent::Responded {
                            status: response.status,
                        },
                        Err(Error::Status { status, .. }) => {
                            RequestEvent::Responded { status: *status }
                        }
                        Err(_) => RequestEvent::TransportFailed,
                    };
                    outcome = Some(result);
                    event
                }
                RequestAction::Refresh => {
                    match self.inner.refresh_gate.recover(sent_with.as_ref()).await {
                        Recovery::Token(token) => match set_bearer(&mut headers, &token) {
                            Ok(()) => {
                                sent_with = Some(token);
                                RequestEvent::Refreshed
                            }
                            Err(e) => {
                                warn!(error = %e, "recovered access token unusable, ending session");
                                self.inner.refresh_gate.abandon().await;
                                refresh_error = Some(gym_auth::Error::TokenExchange(e.to_string()));
                                RequestEvent::RefreshFailed
                            }
                        },
                        Recovery::NoRefreshToken => RequestEvent::NoRefreshToken,
                        Recovery::Failed(e) => {
                            refresh_error = Some(e);
                            RequestEvent::RefreshFailed
                        }
                    }
                }
                RequestAction::EndSession { reason } => {
                    self.end_session(reason);
                    return match refresh_error {
                        Some(e) => Err(Error::RefreshFailed(e)),
                        None => finish(outcome),
                    };
                }
                RequestAction::Deliver => return finish(outcome),
            };
        }
    }

    /// One network round trip. Non-2xx statuses come back as `Error::Status`.
    async fn dispatch(
        &self,
        request: &ApiRequest,
        url: &str,
        headers: &reqwest::header::HeaderMap,
    ) -> Result<ApiResponse> {
        let timeout = self.inner.config.timeout;
        let method = request.method.as_str();

        let mut builder = self
            .inner
            .http
            .request(request.method.clone(), url)
            .headers(headers.clone())
            .timeout(timeout);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                metrics::record_request(method, None);
                return Err(transport_error(e, timeout));
            }
        };

        let status = response.status().as_u16();
        let response_headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            metrics::record_request(method, None);
            transport_error(e, timeout)
        })?;
        metrics::record_request(method, Some(status));
        debug!(status, bytes = body.len(), "backend responded");

        if (200..300).contains(&status) {
            Ok(ApiResponse {
                status,
                headers: response_headers,
                body,
            })
        } else {
            Err(Error::Status {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            })
        }
    }

    /// Resolve a request path against the base URL.
    ///
    /// Absolute URLs are refused: the session's bearer token only ever goes
    /// to the configured backend.
    fn url_for(&self, path: &str) -> Result<String> {
        if reqwest::Url::parse(path).is_ok() {
            return Err(Error::InvalidRequest(format!(
                "absolute URL {path:?} not allowed, use a path relative to the API base"
            )));
        }
        Ok(endpoint_url(&self.inner.config.base_url, path))
    }

    fn end_session(&self, reason: SessionLoss) {
        metrics::record_session_lost(reason);
        self.inner
            .navigator
            .redirect(&self.inner.config.sign_in_route, reason);
    }
}

fn finish(outcome: Option<Result<ApiResponse>>) -> Result<ApiResponse> {
    outcome.unwrap_or_else(|| {
        Err(Error::InvalidRequest(
            "request finished without being sent".into(),
        ))
    })
}

fn transport_error(err: reqwest::Error, timeout: Duration) -> Error {
    if err.is_timeout() {
        Error::Timeout(timeout)
    } else {
        Error::Transport(err.to_string())
    }
}
