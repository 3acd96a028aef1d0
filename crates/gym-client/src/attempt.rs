//! Per-request lifecycle state machine
//!
//! Pure state machine: receives events, returns (new_state, action). The
//! client pipeline executes the I/O implied by each action.
//!
//! ```text
//! Unsent -> Sent(First) -> Done                      (2xx, non-401, transport error)
//! Sent(First) -401-> Refreshing -> Sent(Retried) -> Done
//! Refreshing -(refresh failed | no refresh token)-> SessionCleared
//! ```
//!
//! A request is refreshed at most once: `Sent(Retried)` delivers whatever
//! comes back, 401 included.

/// Which send of a request this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    First,
    Retried,
}

/// Why the session was ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionLoss {
    /// A 401 arrived and there was no refresh token to recover with
    MissingRefreshToken,
    /// The refresh endpoint rejected the refresh token or failed
    RefreshFailed,
    /// The user signed out
    Logout,
}

impl SessionLoss {
    pub fn label(&self) -> &'static str {
        match self {
            SessionLoss::MissingRefreshToken => "missing_refresh_token",
            SessionLoss::RefreshFailed => "refresh_failed",
            SessionLoss::Logout => "logout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Unsent,
    Sent { attempt: Attempt },
    Refreshing,
    /// Terminal: outcome handed to the caller
    Done,
    /// Terminal: session cleared, caller gets the failure
    SessionCleared,
}

/// Events that drive request transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestEvent {
    /// Caller handed the request to the client
    Start,
    /// Backend answered with this status
    Responded { status: u16 },
    /// No response: connect error, timeout, body read failure
    TransportFailed,
    /// New access token stored
    Refreshed,
    RefreshFailed,
    NoRefreshToken,
}

/// Actions the pipeline should execute after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestAction {
    /// Send (or resend) the request with the current authorization header
    Send,
    /// Obtain a fresh access token
    Refresh,
    /// Signal the redirect to sign-in and hand the failure to the caller
    EndSession { reason: SessionLoss },
    /// Hand the latest outcome to the caller
    Deliver,
}

const UNAUTHORIZED: u16 = 401;

/// Handle a request transition. Pure function: no I/O.
pub fn handle_event(state: RequestState, event: RequestEvent) -> (RequestState, RequestAction) {
    match (state, event) {
        (RequestState::Unsent, RequestEvent::Start) => (
            RequestState::Sent {
                attempt: Attempt::First,
            },
            RequestAction::Send,
        ),

        (
            RequestState::Sent {
                attempt: Attempt::First,
            },
            RequestEvent::Responded {
                status: UNAUTHORIZED,
            },
        ) => (RequestState::Refreshing, RequestAction::Refresh),

        // Any other answer, including a 401 on the retry, is final
        (RequestState::Sent { .. }, RequestEvent::Responded { .. })
        | (RequestState::Sent { .. }, RequestEvent::TransportFailed) => {
            (RequestState::Done, RequestAction::Deliver)
        }

        (RequestState::Refreshing, RequestEvent::Refreshed) => (
            RequestState::Sent {
                attempt: Attempt::Retried,
            },
            RequestAction::Send,
        ),

        (RequestState::Refreshing, RequestEvent::NoRefreshToken) => (
            RequestState::SessionCleared,
            RequestAction::EndSession {
                reason: SessionLoss::MissingRefreshToken,
            },
        ),

        (RequestState::Refreshing, RequestEvent::RefreshFailed) => (
            RequestState::SessionCleared,
            RequestAction::EndSession {
                reason: SessionLoss::RefreshFailed,
            },
        ),

        // Unexpected combinations: stop and deliver what we have
        (_, _) => (RequestState::Done, RequestAction::Deliver),
    }
}
