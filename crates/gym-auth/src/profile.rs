//! User profile and role-based access
//!
//! The backend returns the signed-in user alongside the token pair. The
//! client keeps it serialized under the `userProfile` session key and reads
//! the role from it to gate dashboards. Roles are a closed set; an unknown
//! role string is a parse error rather than silently denying access.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::session::{self, SessionStore};

/// Staff and member roles of a gym tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    Receptionist,
    Coach,
    Member,
}

impl Role {
    /// Whether this role is one of `allowed`.
    pub fn permits(&self, allowed: &[Role]) -> bool {
        allowed.contains(self)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::Admin => "admin",
            Role::Receptionist => "receptionist",
            Role::Coach => "coach",
            Role::Member => "member",
        }
    }

    /// Dashboard route for this role.
    pub fn home_route(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "/super-admin",
            Role::Admin => "/admin",
            Role::Receptionist => "/receptionist",
            Role::Coach => "/coach",
            Role::Member => "/member",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "super_admin" | "superadmin" => Ok(Role::SuperAdmin),
            "admin" => Ok(Role::Admin),
            "receptionist" => Ok(Role::Receptionist),
            "coach" => Ok(Role::Coach),
            "member" => Ok(Role::Member),
            other => Err(Error::ProfileParse(format!("unknown role: {other}"))),
        }
    }
}

/// The signed-in user as returned by the login endpoint.
///
/// Fields the client does not interpret are kept in `extra` so the stored
/// profile round-trips verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: serde_json::Value,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    pub role: Role,
    /// Tenant the user belongs to; absent for super admins.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gym: Option<serde_json::Value>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl UserProfile {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| Error::ProfileParse(e.to_string()))
    }

    /// "First Last", falling back to the email.
    pub fn display_name(&self) -> String {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        if name.is_empty() {
            self.email.clone()
        } else {
            name
        }
    }
}

/// Outcome of a role gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Allow,
    /// Nobody usable is signed in: go to the sign-in route.
    SignIn,
    /// Signed in, but the role is not allowed here.
    Forbidden { role: Role },
}

/// Role gate evaluated against the stored session.
pub struct RouteGuard;

impl RouteGuard {
    /// Decide whether the current session may enter a route open to `allowed`.
    ///
    /// Missing access token, missing profile or an unreadable profile all mean
    /// `SignIn`. Store errors are treated the same way.
    pub async fn check(store: &dyn SessionStore, allowed: &[Role]) -> GuardDecision {
        match session::access_token(store).await {
            Ok(Some(_)) => {}
            Ok(None) => return GuardDecision::SignIn,
            Err(e) => {
                warn!(error = %e, "session read failed in route guard");
                return GuardDecision::SignIn;
            }
        }

        match session::user_profile(store).await {
            Ok(Some(profile)) if profile.role.permits(allowed) => GuardDecision::Allow,
            Ok(Some(profile)) => GuardDecision::Forbidden { role: profile.role },
            Ok(None) => GuardDecision::SignIn,
            Err(e) => {
                warn!(error = %e, "stored user profile unreadable");
                GuardDecision::SignIn
            }
        }
    }
}
