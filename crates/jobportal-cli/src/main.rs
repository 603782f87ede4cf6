//! jobportal - developer tool for the job-portal session layer.
//!
//! Signs and verifies session cookies with the configured secret, runs the
//! login action against the demo accounts, and logs in to a backend to
//! issue authenticated requests through the refresh gate.

use std::io;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use jobportal_core::api::LogRedirect;
use jobportal_core::auth::{parse_cookie_header, AuthActions, DemoDirectory, RequestCookies, SESSION_COOKIE_NAME};
use jobportal_core::{ApiClient, Config, Credentials, Session, SessionStore};

const USAGE: &str = "\
Usage:
  jobportal sign <session-json>          Print a signed session cookie value
  jobportal verify <cookie-value|header> Check a session cookie and print the session
  jobportal demo-login <email>           Log in against the demo accounts
  jobportal fetch <email> <path>         Log in to the backend and GET <path>
  jobportal resume <cookie> <path>       GET <path> as the user in a session cookie";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let config = Config::load().context("Failed to load configuration")?;
    let args: Vec<String> = std::env::args().skip(1).collect();
    let args: Vec<&str> = args.iter().map(String::as_str).collect();

    match args.as_slice() {
        ["sign", json] => sign(&config, json),
        ["verify", value] => verify(&config, value),
        ["demo-login", email] => demo_login(&config, email),
        ["fetch", email, path] => fetch(&config, email, path).await,
        ["resume", cookie, path] => resume(&config, cookie, path).await,
        _ => {
            eprintln!("{}", USAGE);
            bail!("unrecognized arguments");
        }
    }
}

fn request_store(config: &Config, cookie_header: Option<&str>) -> SessionStore<RequestCookies> {
    SessionStore::from_config(RequestCookies::from_header(cookie_header), config)
}

fn print_set_cookies(store: &SessionStore<RequestCookies>) {
    for header in store.jar().set_cookie_headers() {
        println!("Set-Cookie: {}", header);
    }
}

fn sign(config: &Config, json: &str) -> Result<()> {
    let session: Session = serde_json::from_str(json).context("Session JSON is not valid")?;
    let store = request_store(config, None);
    store.create_session(&session)?;
    print_set_cookies(&store);
    Ok(())
}

/// Read the session from a bare cookie value or a whole Cookie header.
fn session_from_cookie(config: &Config, value: &str) -> Option<Session> {
    let value = parse_cookie_header(value, SESSION_COOKIE_NAME).unwrap_or(value);
    let header = format!("{}={}", SESSION_COOKIE_NAME, value);
    request_store(config, Some(&header)).read_session()
}

fn verify(config: &Config, value: &str) -> Result<()> {
    match session_from_cookie(config, value) {
        Some(session) => {
            println!("{}", serde_json::to_string_pretty(&session)?);
            Ok(())
        }
        None => bail!("session cookie is missing, forged or malformed"),
    }
}

fn demo_login(config: &Config, email: &str) -> Result<()> {
    let password = rpassword::prompt_password("Password: ")?;
    let actions = AuthActions::new(DemoDirectory, request_store(config, None));

    let session = actions.login(&Credentials::new(email, password))?;
    info!(user_id = %session.id, "Demo login succeeded");
    println!("Logged in as {} ({})", session.name, session.role);
    print_set_cookies(actions.store());
    Ok(())
}

async fn fetch(config: &Config, email: &str, path: &str) -> Result<()> {
    let password = rpassword::prompt_password("Password: ")?;
    let client = ApiClient::from_config(config, Arc::new(LogRedirect))?;

    let session = client
        .login(&Credentials::new(email, password))
        .await
        .context("Login failed")?;
    println!("Logged in as {} ({})", session.name, session.role);

    let value: serde_json::Value = client
        .get(path)
        .await
        .with_context(|| format!("Failed to fetch {}", path))?;
    println!("{}", serde_json::to_string_pretty(&value)?);

    if let Err(e) = client.logout(session.auth_key.as_deref()).await {
        eprintln!("Logout failed: {}", e);
    }
    Ok(())
}

async fn resume(config: &Config, cookie: &str, path: &str) -> Result<()> {
    let session = session_from_cookie(config, cookie);
    let client = ApiClient::from_config(config, Arc::new(LogRedirect))?;
    client.hydrate(session.as_ref());

    if !client.state().is_authenticated() {
        bail!("session cookie does not carry a usable login");
    }

    let value: serde_json::Value = client
        .get(path)
        .await
        .with_context(|| format!("Failed to fetch {}", path))?;
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
