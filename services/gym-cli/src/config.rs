//! Configuration types and loading
//!
//! Config precedence: env vars > config file > defaults. The API base URL
//! can come from `GYM_API_URL` alone, in which case the config file is
//! optional. Passwords never live in the config file.

use gym_client::{ClientConfig, RefreshPolicy};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

/// Backend connection settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub refresh_policy: RefreshPolicy,
}

/// Where the session lives and where a lost session sends the user
#[derive(Debug, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_path")]
    pub path: PathBuf,
    #[serde(default = "default_sign_in_route")]
    pub sign_in_route: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_secs: default_timeout(),
            refresh_policy: RefreshPolicy::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            path: default_session_path(),
            sign_in_route: default_sign_in_route(),
        }
    }
}

fn default_timeout() -> u64 {
    30
}

fn default_session_path() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) => PathBuf::from(home).join(".gym").join("session.json"),
        None => PathBuf::from("gym-session.json"),
    }
}

fn default_sign_in_route() -> String {
    gym_auth::DEFAULT_SIGN_IN_ROUTE.to_string()
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// A missing file is only acceptable when `GYM_API_URL` is set.
    pub fn load(path: &Path) -> common::Result<Self> {
        let env_url = std::env::var("GYM_API_URL")
            .ok()
            .filter(|u| !u.trim().is_empty());

        let mut config: Config = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && env_url.is_some() => {
                Config::default()
            }
            Err(e) => return Err(e.into()),
        };

        if let Some(url) = env_url {
            config.api.base_url = url;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {:?}",
                self.api.base_url
            )));
        }

        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if !self.session.sign_in_route.starts_with('/') {
            return Err(common::Error::Config(format!(
                "sign_in_route must be an absolute route, got: {}",
                self.session.sign_in_route
            )));
        }

        Ok(())
    }

    /// Client settings derived from this configuration.
    pub fn client_config(&self) -> ClientConfig {
        let mut client = ClientConfig::new(self.api.base_url.clone());
        client.timeout = Duration::from_secs(self.api.timeout_secs);
        client.refresh_policy = self.api.refresh_policy;
        client.sign_in_route = self.session.sign_in_route.clone();
        client
    }

    /// Config file path: `--config` / `CONFIG_PATH` when given, else `gym.toml`.
    pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
        cli_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("gym.toml"))
    }
}
