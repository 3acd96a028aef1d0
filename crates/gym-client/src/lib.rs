//! Authenticated REST client for the gym console backend
//!
//! Wraps every backend call in the session's bearer authentication and the
//! single refresh-and-retry rule for expired access tokens. The session
//! store and the navigation target are injected, so hosts (CLI, tests,
//! embedding applications) decide where tokens live and what "go to
//! sign-in" means.
//!
//! Request lifecycle:
//! 1. `Authenticator` attaches `Authorization: Bearer <access>` if signed in
//! 2. The request is sent with the configured timeout
//! 3. A first 401 runs one recovery through `RefreshGate`
//! 4. Recovered: the request is resent once with the new token
//! 5. Not recovered: the session is cleared and `Navigator::redirect` fires
//!
//! Everything that is not a 401 on the first attempt goes back to the
//! caller untouched.

pub mod attempt;
pub mod authenticator;
pub mod client;
pub mod error;
pub mod metrics;
pub mod navigator;
pub mod refresh;
pub mod request;

pub use attempt::{Attempt, SessionLoss};
pub use authenticator::Authenticator;
pub use client::{ApiClient, ClientConfig, DEFAULT_TIMEOUT};
pub use error::{Error, Result};
pub use navigator::{LogNavigator, Navigator};
pub use refresh::RefreshPolicy;
pub use request::{ApiRequest, ApiResponse};
pub use tokio_util::sync::CancellationToken;
