//! Gym console CLI
//!
//! Terminal front-end over the authenticated API client:
//! 1. Loads config (file and/or GYM_API_URL)
//! 2. Opens the file-backed session store
//! 3. Runs one command: sign in/out, inspect the session, or call the API
//!
//! Expired access tokens are refreshed transparently. When the session is
//! lost the CLI prints a sign-in hint instead of navigating.

mod command;
mod config;
mod error;

use anyhow::{Context, Result};
use clap::Parser as _;
use common::Secret;
use gym_auth::{FileSessionStore, GuardDecision, RouteGuard, claims, session};
use gym_client::{ApiClient, CancellationToken, Navigator, SessionLoss};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::command::{Cli, Command};
use crate::config::Config;

/// Session missing or lost
const EXIT_SIGN_IN: u8 = 2;
/// Signed in with a role the route does not admit
const EXIT_FORBIDDEN: u8 = 3;
const EXIT_USAGE: u8 = 64;

/// Navigator for a terminal: remembers the redirect and tells the user how
/// to sign in again.
#[derive(Debug, Default)]
struct CliNavigator {
    redirected: AtomicBool,
}

impl CliNavigator {
    fn redirected(&self) -> bool {
        self.redirected.load(Ordering::Relaxed)
    }
}

impl Navigator for CliNavigator {
    fn redirect(&self, route: &str, reason: SessionLoss) {
        self.redirected.store(true, Ordering::Relaxed);
        info!(route, reason = reason.label(), "session ended");
        eprintln!("{}", redirect_message(route, reason));
    }
}

fn redirect_message(route: &str, reason: SessionLoss) -> String {
    match reason {
        SessionLoss::Logout => format!("signed out ({route})"),
        SessionLoss::MissingRefreshToken => {
            format!("not signed in ({route}): run `gym login <email>`")
        }
        SessionLoss::RefreshFailed => {
            format!("session expired ({route}): run `gym login <email>`")
        }
    }
}

/// One-line error with its full cause chain.
fn failure_report(err: &anyhow::Error) -> String {
    format!("Error: {err:#}")
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // --help and --version also arrive here, on stdout
            let code = if e.use_stderr() { EXIT_USAGE } else { 0 };
            let _ = e.print();
            return Ok(ExitCode::from(code));
        }
    };

    let config_path = Config::resolve_path(cli.config.as_deref());
    debug!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    let store = FileSessionStore::load(config.session.path.clone())
        .await
        .with_context(|| {
            format!(
                "failed to open session store at {}",
                config.session.path.display()
            )
        })?;

    let http = reqwest::Client::builder()
        .build()
        .context("failed to build HTTP client")?;
    let navigator = Arc::new(CliNavigator::default());
    let client = ApiClient::new(
        config.client_config(),
        http,
        Arc::new(store),
        navigator.clone(),
    );

    match execute(&client, cli.command).await {
        Err(e) if navigator.redirected() => {
            eprintln!("{}", failure_report(&e));
            Ok(ExitCode::from(EXIT_SIGN_IN))
        }
        result => result,
    }
}

async fn execute(client: &ApiClient, command: Command) -> Result<ExitCode> {
    match command {
        Command::Login { ref email } => {
            let password = read_password()?;
            match client.login(email, &password).await? {
                Some(profile) => println!(
                    "signed in as {} ({}), home: {}",
                    profile.display_name(),
                    profile.role,
                    profile.role.home_route()
                ),
                None => println!("signed in as {email}"),
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Logout => {
            client.logout().await.context("failed to clear session")?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Whoami => whoami(client).await,

        Command::Guard { ref roles } => {
            match RouteGuard::check(client.store().as_ref(), roles).await {
                GuardDecision::Allow => {
                    println!("allowed");
                    Ok(ExitCode::SUCCESS)
                }
                GuardDecision::SignIn => {
                    println!("sign in required: {}", client.config().sign_in_route);
                    Ok(ExitCode::from(EXIT_SIGN_IN))
                }
                GuardDecision::Forbidden { role } => {
                    println!("forbidden for {role}, home: {}", role.home_route());
                    Ok(ExitCode::from(EXIT_FORBIDDEN))
                }
            }
        }

        Command::Get { .. }
        | Command::Delete { .. }
        | Command::Post { .. }
        | Command::Put { .. }
        | Command::Patch { .. } => {
            let Some(request) = command.api_request() else {
                anyhow::bail!("not an API call: {command:?}");
            };
            let label = format!("{} {}", request.method, request.path);

            let cancel = CancellationToken::new();
            let trigger = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    trigger.cancel();
                }
            });

            let response = client
                .send_cancellable(request, cancel)
                .await
                .with_context(|| format!("{label} failed"))?;
            print!("{}", render_body(&response.body));
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn whoami(client: &ApiClient) -> Result<ExitCode> {
    let store = client.store().as_ref();
    let access = session::access_token(store).await?;
    let profile = session::user_profile(store).await?;

    let (Some(access), Some(profile)) = (access, profile) else {
        println!("not signed in");
        return Ok(ExitCode::from(EXIT_SIGN_IN));
    };

    println!("{} <{}>", profile.display_name(), profile.email);
    println!("role: {} (home {})", profile.role, profile.role.home_route());
    if let Some(gym) = &profile.gym {
        println!("gym: {gym}");
    }
    println!("access token: {}", describe_expiry(&access, unix_now()));
    Ok(ExitCode::SUCCESS)
}

fn describe_expiry(access: &Secret<String>, now_secs: u64) -> String {
    match claims::remaining_secs(access.expose(), now_secs) {
        Ok(0) => "expired, will refresh on next call".to_string(),
        Ok(secs) => format!("expires in {secs}s"),
        Err(e) => {
            debug!(error = %e, "access token has no readable expiry");
            "no expiry claim".to_string()
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Read the password from GYM_PASSWORD, else the first line of stdin.
fn read_password() -> error::Result<Secret<String>> {
    if let Ok(password) = std::env::var("GYM_PASSWORD")
        && !password.is_empty()
    {
        return Ok(Secret::from(password));
    }

    let mut line = String::new();
    if let Err(e) = std::io::stdin().read_line(&mut line) {
        warn!(error = %e, "failed to read password from stdin");
        return Err(error::Error::MissingPassword);
    }
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        return Err(error::Error::MissingPassword);
    }
    Ok(Secret::from(password))
}

/// Pretty-print JSON bodies, pass anything else through.
fn render_body(body: &[u8]) -> String {
    if body.is_empty() {
        return String::new();
    }
    let mut out = match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(value) => serde_json::to_string_pretty(&value)
            .unwrap_or_else(|_| String::from_utf8_lossy(body).into_owned()),
        Err(_) => String::from_utf8_lossy(body).into_owned(),
    };
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;

    fn jwt_with_exp(exp: u64) -> Secret<String> {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp}}}"#));
        Secret::from(format!("{header}.{payload}.sig"))
    }

    #[test]
    fn navigator_remembers_redirect() {
        let navigator = CliNavigator::default();
        assert!(!navigator.redirected());
        navigator.redirect("/sign-in", SessionLoss::RefreshFailed);
        assert!(navigator.redirected());
    }

    #[test]
    fn redirect_messages_name_the_route() {
        let expired = redirect_message("/sign-in", SessionLoss::RefreshFailed);
        assert!(expired.contains("session expired"));
        assert!(expired.contains("/sign-in"));
        assert!(expired.contains("gym login"));

        let missing = redirect_message("/login", SessionLoss::MissingRefreshToken);
        assert!(missing.contains("not signed in"));

        assert_eq!(
            redirect_message("/sign-in", SessionLoss::Logout),
            "signed out (/sign-in)"
        );
    }

    #[test]
    fn failure_report_keeps_refresh_cause() {
        let server_error = anyhow::Error::new(gym_client::Error::RefreshFailed(
            gym_auth::Error::TokenExchange("token refresh returned 500: upstream down".into()),
        ))
        .context("GET /members/ failed");
        let rejected = anyhow::Error::new(gym_client::Error::RefreshFailed(
            gym_auth::Error::RefreshRejected("refresh endpoint returned 401".into()),
        ))
        .context("GET /members/ failed");

        let a = failure_report(&server_error);
        let b = failure_report(&rejected);
        assert!(a.starts_with("Error: GET /members/ failed"), "got: {a}");
        assert!(a.contains("500: upstream down"), "got: {a}");
        assert!(b.contains("refresh token rejected"), "got: {b}");
        assert_ne!(a, b);
    }

    #[test]
    fn expiry_description() {
        assert_eq!(
            describe_expiry(&jwt_with_exp(1_000_300), 1_000_000),
            "expires in 300s"
        );
        assert_eq!(
            describe_expiry(&jwt_with_exp(999), 1_000_000),
            "expired, will refresh on next call"
        );
        assert_eq!(
            describe_expiry(&Secret::from("opaque-token"), 1_000_000),
            "no expiry claim"
        );
    }

    #[test]
    fn render_body_pretty_prints_json() {
        let out = render_body(br#"{"id":1,"name":"Spin"}"#);
        assert!(out.contains("\n  \"id\": 1"), "got: {out}");
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn render_body_passes_text_through() {
        assert_eq!(render_body(b"plain"), "plain\n");
        assert_eq!(render_body(b""), "");
    }
}
