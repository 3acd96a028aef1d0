//! Session and token handling for the gym console client
//!
//! Provides the session store the API client reads credentials from, the
//! token endpoint calls that fill it, and the role model used to gate
//! dashboards. The crate has no dependency on the client pipeline and can
//! be tested on its own.
//!
//! Session flow:
//! 1. `token::login()` exchanges email + password for a `TokenPair`
//! 2. `session::begin()` stores access token, refresh token and profile
//! 3. The API client reads the access token from the store on every call
//! 4. On 401 the client calls `token::refresh_access()` and overwrites the
//!    access token with `SessionStore::set()`
//! 5. Logout or a failed refresh ends the session with `SessionStore::clear()`

pub mod claims;
pub mod constants;
pub mod error;
pub mod profile;
pub mod session;
pub mod token;

pub use constants::*;
pub use error::{Error, Result};
pub use profile::{GuardDecision, Role, RouteGuard, UserProfile};
pub use session::{FileSessionStore, MemorySessionStore, SessionKey, SessionStore, StoreFuture};
pub use token::{RefreshedAccess, TokenPair, login, refresh_access};
