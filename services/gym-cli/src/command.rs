//! Command-line interface definition

use std::path::PathBuf;

use gym_auth::Role;
use gym_client::ApiRequest;

use crate::error::{Error, Result};

/// Gym console client: sign in and call the backend with a managed session
#[derive(Debug, clap::Parser)]
#[command(name = "gym")]
#[command(about = "Authenticated client for the gym console backend", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file path (default: gym.toml)
    #[arg(long, global = true, env = "CONFIG_PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, PartialEq, clap::Subcommand)]
pub enum Command {
    /// Sign in; the password is read from GYM_PASSWORD or stdin
    Login { email: String },

    /// End the local session
    Logout,

    /// Show the signed-in profile and access token expiry
    Whoami,

    /// Check the session against a list of allowed roles
    Guard {
        /// Allowed roles, comma separated (e.g. admin,receptionist)
        #[arg(value_delimiter = ',', required = true, value_parser = parse_role)]
        roles: Vec<Role>,
    },

    /// Authenticated GET
    Get {
        path: String,
        /// Query parameters as key=value
        #[arg(value_parser = parse_query_pair)]
        query: Vec<(String, String)>,
    },

    /// Authenticated DELETE
    Delete {
        path: String,
        /// Query parameters as key=value
        #[arg(value_parser = parse_query_pair)]
        query: Vec<(String, String)>,
    },

    /// Authenticated POST with an optional JSON body
    Post {
        path: String,
        #[arg(value_parser = parse_json_body)]
        body: Option<serde_json::Value>,
    },

    /// Authenticated PUT with an optional JSON body
    Put {
        path: String,
        #[arg(value_parser = parse_json_body)]
        body: Option<serde_json::Value>,
    },

    /// Authenticated PATCH with an optional JSON body
    Patch {
        path: String,
        #[arg(value_parser = parse_json_body)]
        body: Option<serde_json::Value>,
    },
}

impl Command {
    /// The backend call this command makes, if it is one.
    pub fn api_request(&self) -> Option<ApiRequest> {
        let (request, query, body) = match self {
            Command::Get { path, query } => (ApiRequest::get(path), query.as_slice(), None),
            Command::Delete { path, query } => (ApiRequest::delete(path), query.as_slice(), None),
            Command::Post { path, body } => (ApiRequest::post(path), &[][..], body.clone()),
            Command::Put { path, body } => (ApiRequest::put(path), &[][..], body.clone()),
            Command::Patch { path, body } => (ApiRequest::patch(path), &[][..], body.clone()),
            Command::Login { .. } | Command::Logout | Command::Whoami | Command::Guard { .. } => {
                return None;
            }
        };

        let mut request = query
            .iter()
            .fold(request, |r, (k, v)| r.query(k.as_str(), v.as_str()));
        request.body = body;
        Some(request)
    }
}

fn parse_role(s: &str) -> Result<Role> {
    Ok(s.trim().parse::<Role>()?)
}

fn parse_query_pair(s: &str) -> Result<(String, String)> {
    s.split_once('=')
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| Error::InvalidQuery(s.to_string()))
}

fn parse_json_body(s: &str) -> Result<serde_json::Value> {
    serde_json::from_str(s).map_err(|e| Error::InvalidBody(e.to_string()))
}
